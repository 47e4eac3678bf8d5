//! Opcode table and instruction decoding.
//!
//! Every opcode has a fixed width (opcode byte included); immediates are
//! little-endian. Decoding never reads past the buffer.

use crate::error::{EngineError, EngineResult};

/// Register identifier as found in the bytecode.
pub type Reg = u8;

/// Bytecode opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Nop = 0x00,
    Halt = 0x01,
    LoadImm = 0x10,
    Add = 0x20,
    Sub = 0x21,
    Call = 0x30,
    Return = 0x31,
    Push = 0x50,
    Pop = 0x51,
    Exit = 0xFF,
}

impl Opcode {
    pub const ALL: [Self; 10] = [
        Self::Nop,
        Self::Halt,
        Self::LoadImm,
        Self::Add,
        Self::Sub,
        Self::Call,
        Self::Return,
        Self::Push,
        Self::Pop,
        Self::Exit,
    ];

    pub const fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            0x00 => Self::Nop,
            0x01 => Self::Halt,
            0x10 => Self::LoadImm,
            0x20 => Self::Add,
            0x21 => Self::Sub,
            0x30 => Self::Call,
            0x31 => Self::Return,
            0x50 => Self::Push,
            0x51 => Self::Pop,
            0xFF => Self::Exit,
            _ => return None,
        })
    }

    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// Encoded width in bytes, opcode included.
    pub const fn width(self) -> usize {
        match self {
            Self::Nop | Self::Halt => 1,
            Self::Return | Self::Push | Self::Pop | Self::Exit => 2,
            Self::Add | Self::Sub => 4,
            Self::Call => 5,
            Self::LoadImm => 10,
        }
    }

    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::Halt => "HALT",
            Self::LoadImm => "LOAD_IMM",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Call => "CALL",
            Self::Return => "RETURN",
            Self::Push => "PUSH",
            Self::Pop => "POP",
            Self::Exit => "EXIT",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.mnemonic().eq_ignore_ascii_case(s))
    }

    /// Ends execution: nothing after it is reachable.
    pub const fn is_terminator(self) -> bool {
        matches!(self, Self::Halt | Self::Return | Self::Exit)
    }
}

/// A decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Nop,
    Halt,
    LoadImm { dst: Reg, imm: i64 },
    /// `dst = a + b`
    Add { a: Reg, b: Reg, dst: Reg },
    /// `dst = a - b`
    Sub { a: Reg, b: Reg, dst: Reg },
    /// Pops `argc` arguments (last pushed is the last argument).
    Call { import: u16, argc: u8, dst: Reg },
    Return { src: Reg },
    Push { src: Reg },
    Pop { dst: Reg },
    Exit { code: u8 },
}

impl Instruction {
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Nop => Opcode::Nop,
            Self::Halt => Opcode::Halt,
            Self::LoadImm { .. } => Opcode::LoadImm,
            Self::Add { .. } => Opcode::Add,
            Self::Sub { .. } => Opcode::Sub,
            Self::Call { .. } => Opcode::Call,
            Self::Return { .. } => Opcode::Return,
            Self::Push { .. } => Opcode::Push,
            Self::Pop { .. } => Opcode::Pop,
            Self::Exit { .. } => Opcode::Exit,
        }
    }

    pub const fn width(&self) -> usize {
        self.opcode().width()
    }

    /// Highest register id referenced, if any.
    pub fn max_register(&self) -> Option<Reg> {
        match *self {
            Self::LoadImm { dst, .. } | Self::Pop { dst } | Self::Call { dst, .. } => Some(dst),
            Self::Add { a, b, dst } | Self::Sub { a, b, dst } => Some(a.max(b).max(dst)),
            Self::Return { src } | Self::Push { src } => Some(src),
            Self::Nop | Self::Halt | Self::Exit { .. } => None,
        }
    }

    /// Appends the encoded form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.opcode().byte());
        match *self {
            Self::Nop | Self::Halt => {}
            Self::LoadImm { dst, imm } => {
                out.push(dst);
                out.extend_from_slice(&imm.to_le_bytes());
            }
            Self::Add { a, b, dst } | Self::Sub { a, b, dst } => out.extend_from_slice(&[a, b, dst]),
            Self::Call { import, argc, dst } => {
                out.extend_from_slice(&import.to_le_bytes());
                out.extend_from_slice(&[argc, dst]);
            }
            Self::Return { src } | Self::Push { src } => out.push(src),
            Self::Pop { dst } => out.push(dst),
            Self::Exit { code } => out.push(code),
        }
    }
}

/// Decodes the instruction starting at `pc`.
///
/// `UnknownOpcode` for bytes outside the table, `InvalidInput` when fewer
/// bytes than the opcode's width remain.
pub fn decode_at(code: &[u8], pc: usize) -> EngineResult<Instruction> {
    let Some(&byte) = code.get(pc) else {
        return Err(EngineError::invalid("pc hors du buffer"));
    };
    let op = Opcode::from_byte(byte).ok_or(EngineError::UnknownOpcode { opcode: byte, pc })?;
    let Some(rec) = code.get(pc..pc + op.width()) else {
        return Err(EngineError::invalid("instruction tronquée"));
    };
    Ok(match op {
        Opcode::Nop => Instruction::Nop,
        Opcode::Halt => Instruction::Halt,
        Opcode::LoadImm => {
            let mut imm = [0u8; 8];
            imm.copy_from_slice(&rec[2..10]);
            Instruction::LoadImm { dst: rec[1], imm: i64::from_le_bytes(imm) }
        }
        Opcode::Add => Instruction::Add { a: rec[1], b: rec[2], dst: rec[3] },
        Opcode::Sub => Instruction::Sub { a: rec[1], b: rec[2], dst: rec[3] },
        Opcode::Call => Instruction::Call {
            import: u16::from_le_bytes([rec[1], rec[2]]),
            argc: rec[3],
            dst: rec[4],
        },
        Opcode::Return => Instruction::Return { src: rec[1] },
        Opcode::Push => Instruction::Push { src: rec[1] },
        Opcode::Pop => Instruction::Pop { dst: rec[1] },
        Opcode::Exit => Instruction::Exit { code: rec[1] },
    })
}

/// Borrowed, immutable view over an instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstructionBuffer<'a> {
    bytes: &'a [u8],
}

impl<'a> InstructionBuffer<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub const fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub const fn len(&self) -> usize {
        self.bytes.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Yields `(pc, instruction)`; a decode error is yielded once and ends
    /// the iteration.
    pub const fn iter(&self) -> Instructions<'a> {
        Instructions { bytes: self.bytes, pc: 0, done: false }
    }
}

impl<'a> From<&'a [u8]> for InstructionBuffer<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::new(bytes)
    }
}

impl<'a> IntoIterator for InstructionBuffer<'a> {
    type Item = EngineResult<(usize, Instruction)>;
    type IntoIter = Instructions<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`InstructionBuffer::iter`].
#[derive(Debug, Clone)]
pub struct Instructions<'a> {
    bytes: &'a [u8],
    pc: usize,
    done: bool,
}

impl Iterator for Instructions<'_> {
    type Item = EngineResult<(usize, Instruction)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pc >= self.bytes.len() {
            return None;
        }
        match decode_at(self.bytes, self.pc) {
            Ok(ins) => {
                let pc = self.pc;
                self.pc += ins.width();
                Some(Ok((pc, ins)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

//! Abaissement du bytecode vers une forme native deux-adresses.
//!
//! Les backends ne voient que des [`NativeOp`] : `dst op= src`, déplacements
//! explicites, pile native, retour. Le programme n'a pas de branchement : la
//! profondeur de pile se vérifie statiquement et le scan s'arrête au premier
//! terminateur.

use astc_core::{EngineError, EngineResult, Instruction, InstructionBuffer, Reg, STACK_SLOTS};

/// Registre natif : registre virtuel `rN` ou registre scratch de la backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeReg {
    R(Reg),
    Scratch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeOp {
    MovImm { dst: NativeReg, imm: i64 },
    Mov { dst: NativeReg, src: NativeReg },
    /// `dst += src`
    Add { dst: NativeReg, src: NativeReg },
    /// `dst -= src`
    Sub { dst: NativeReg, src: NativeReg },
    Push(NativeReg),
    Pop(NativeReg),
    /// Retourne la valeur du registre (épilogue inclus).
    Ret(NativeReg),
    /// Retourne une constante (épilogue inclus).
    RetImm(i64),
}

/// Tous les identifiants encodables sur un octet.
const REG_IDS: usize = 1 << Reg::BITS;

#[derive(Clone, Copy)]
enum Arith {
    Add,
    Sub,
}

struct Lowering {
    ops: Vec<NativeOp>,
    /// Registres déjà écrits ; les autres valent 0 comme dans l'interpréteur.
    written: [bool; REG_IDS],
    depth: usize,
}

impl Lowering {
    fn touch(&mut self, r: Reg) {
        if !self.written[usize::from(r)] {
            self.written[usize::from(r)] = true;
            self.ops.push(NativeOp::MovImm { dst: NativeReg::R(r), imm: 0 });
        }
    }

    fn define(&mut self, r: Reg) {
        self.written[usize::from(r)] = true;
    }

    fn arith(&mut self, kind: Arith, a: Reg, b: Reg, dst: Reg) {
        self.touch(a);
        self.touch(b);
        let op = |dst, src| match kind {
            Arith::Add => NativeOp::Add { dst, src },
            Arith::Sub => NativeOp::Sub { dst, src },
        };
        let (ra, rb, rd) = (NativeReg::R(a), NativeReg::R(b), NativeReg::R(dst));
        if dst == a {
            self.ops.push(op(rd, rb));
        } else if dst != b {
            self.ops.push(NativeOp::Mov { dst: rd, src: ra });
            self.ops.push(op(rd, rb));
        } else {
            // dst == b != a : `mov dst, a` écraserait b
            self.ops.push(NativeOp::Mov { dst: NativeReg::Scratch, src: ra });
            self.ops.push(op(NativeReg::Scratch, rb));
            self.ops.push(NativeOp::Mov { dst: rd, src: NativeReg::Scratch });
        }
        self.define(dst);
    }
}

/// Abaisse `code` pour une backend à `register_count` registres.
///
/// Rejette en `InvalidInput` : buffer vide, `CALL`, registre hors banc,
/// instruction tronquée, pile native hors `[0, STACK_SLOTS]`.
pub fn lower(code: &[u8], register_count: u8) -> EngineResult<Vec<NativeOp>> {
    if code.is_empty() {
        return Err(EngineError::invalid("buffer vide"));
    }
    let mut l = Lowering { ops: Vec::with_capacity(code.len() / 2 + 1), written: [false; REG_IDS], depth: 0 };

    for item in InstructionBuffer::new(code) {
        let (pc, ins) = item?;
        if let Some(r) = ins.max_register() {
            if r >= register_count {
                return Err(EngineError::invalid(format!(
                    "pc={pc}: registre r{r} hors du banc natif ({register_count} registres)"
                )));
            }
        }
        match ins {
            Instruction::Nop => {}
            Instruction::LoadImm { dst, imm } => {
                l.define(dst);
                l.ops.push(NativeOp::MovImm { dst: NativeReg::R(dst), imm });
            }
            Instruction::Add { a, b, dst } => l.arith(Arith::Add, a, b, dst),
            Instruction::Sub { a, b, dst } => l.arith(Arith::Sub, a, b, dst),
            Instruction::Push { src } => {
                if l.depth == STACK_SLOTS {
                    return Err(EngineError::invalid(format!("pc={pc}: dépassement de pile")));
                }
                l.touch(src);
                l.depth += 1;
                l.ops.push(NativeOp::Push(NativeReg::R(src)));
            }
            Instruction::Pop { dst } => {
                if l.depth == 0 {
                    return Err(EngineError::invalid(format!("pc={pc}: pop sur pile vide")));
                }
                l.depth -= 1;
                l.define(dst);
                l.ops.push(NativeOp::Pop(NativeReg::R(dst)));
            }
            Instruction::Call { .. } => {
                return Err(EngineError::invalid(format!("pc={pc}: CALL non supporté par le JIT")));
            }
            Instruction::Halt => {
                l.ops.push(NativeOp::RetImm(0));
                return Ok(l.ops);
            }
            Instruction::Exit { code } => {
                l.ops.push(NativeOp::RetImm(i64::from(code)));
                return Ok(l.ops);
            }
            Instruction::Return { src } => {
                l.touch(src);
                l.ops.push(NativeOp::Ret(NativeReg::R(src)));
                return Ok(l.ops);
            }
        }
    }

    // fin de buffer sans terminateur
    l.ops.push(NativeOp::RetImm(0));
    Ok(l.ops)
}

//! Textual disassembly used by the CLI tooling.
//!
//! Never fails: unknown or truncated bytes are listed and the listing stops.

use std::fmt::Write;

use super::opcode::{decode_at, Instruction};
use crate::{content_hash, error::EngineError};

/// One line per instruction: `pc | bytes | mnemonic operands`.
pub fn disassemble(code: &[u8]) -> String {
    let mut out = String::new();
    let mut pc = 0;
    while pc < code.len() {
        match decode_at(code, pc) {
            Ok(ins) => {
                let w = ins.width();
                let _ = writeln!(out, "{pc:04} | {:<29} | {}", hex(&code[pc..pc + w]), render(&ins));
                pc += w;
            }
            Err(EngineError::UnknownOpcode { opcode, .. }) => {
                let _ = writeln!(out, "{pc:04} | {:<29} | ?? opcode inconnu 0x{opcode:02X}", hex(&code[pc..=pc]));
                break;
            }
            Err(_) => {
                let _ = writeln!(out, "{pc:04} | {:<29} | ?? instruction tronquée", hex(&code[pc..]));
                break;
            }
        }
    }
    out
}

/// Listing with a header (size, hash).
pub fn disassemble_full(code: &[u8], title: &str) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {title} == ({} octets, hash={:016x})", code.len(), content_hash(code));
    out.push_str(&disassemble(code));
    out
}

/// Assembly-syntax rendering of one instruction (parsable by `asm::assemble`).
pub fn render(ins: &Instruction) -> String {
    let m = ins.opcode().mnemonic();
    match *ins {
        Instruction::Nop | Instruction::Halt => m.to_string(),
        Instruction::LoadImm { dst, imm } => format!("{m} r{dst}, {imm}"),
        Instruction::Add { a, b, dst } | Instruction::Sub { a, b, dst } => format!("{m} r{a}, r{b}, r{dst}"),
        Instruction::Call { import, argc, dst } => format!("{m} {import}, {argc}, r{dst}"),
        Instruction::Return { src } | Instruction::Push { src } => format!("{m} r{src}"),
        Instruction::Pop { dst } => format!("{m} r{dst}"),
        Instruction::Exit { code } => format!("{m} {code}"),
    }
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{b:02X}");
    }
    s
}

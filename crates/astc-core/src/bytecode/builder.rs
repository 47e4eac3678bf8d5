//! Émetteur de bytecode typé (côté producteur).
//!
//! Sert aux tests, benches et à l'assembleur ; le moteur, lui, ne reçoit que
//! des octets déjà produits.

use super::opcode::{Instruction, Reg};

/// Buffer d'écriture de programme (croît automatiquement).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgramBuilder {
    buf: Vec<u8>,
}

impl ProgramBuilder {
    /// Crée un builder vide.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Position courante (pc de la prochaine instruction).
    pub fn pc(&self) -> usize {
        self.buf.len()
    }

    /// Accès en lecture.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consomme et renvoie les octets.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Ajoute une instruction décodée.
    pub fn emit(&mut self, ins: Instruction) -> &mut Self {
        ins.encode_into(&mut self.buf);
        self
    }

    /// Ajoute des octets bruts (opcodes invalides, records tronqués…).
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn nop(&mut self) -> &mut Self {
        self.emit(Instruction::Nop)
    }

    pub fn halt(&mut self) -> &mut Self {
        self.emit(Instruction::Halt)
    }

    pub fn load_imm(&mut self, dst: Reg, imm: i64) -> &mut Self {
        self.emit(Instruction::LoadImm { dst, imm })
    }

    /// `dst = a + b`
    pub fn add(&mut self, a: Reg, b: Reg, dst: Reg) -> &mut Self {
        self.emit(Instruction::Add { a, b, dst })
    }

    /// `dst = a - b`
    pub fn sub(&mut self, a: Reg, b: Reg, dst: Reg) -> &mut Self {
        self.emit(Instruction::Sub { a, b, dst })
    }

    pub fn call(&mut self, import: u16, argc: u8, dst: Reg) -> &mut Self {
        self.emit(Instruction::Call { import, argc, dst })
    }

    pub fn ret(&mut self, src: Reg) -> &mut Self {
        self.emit(Instruction::Return { src })
    }

    pub fn push(&mut self, src: Reg) -> &mut Self {
        self.emit(Instruction::Push { src })
    }

    pub fn pop(&mut self, dst: Reg) -> &mut Self {
        self.emit(Instruction::Pop { dst })
    }

    pub fn exit(&mut self, code: u8) -> &mut Self {
        self.emit(Instruction::Exit { code })
    }
}

//! Bytecode : table d'opcodes, décodage, émetteur, assembleur et désassembleur.

/// Table d'opcodes, `Instruction`, décodage.
pub mod opcode;
/// Émetteur de programmes.
pub mod builder;
pub mod asm;
pub mod disasm;

pub use builder::ProgramBuilder;
pub use opcode::{decode_at, Instruction, InstructionBuffer, Instructions, Opcode, Reg};

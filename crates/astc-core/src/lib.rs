//! astc-core : primitives partagées du moteur
//!
//! Fournit :
//! - le jeu d'instructions (`Opcode`, `Instruction`, `decode_at`, `InstructionBuffer`)
//! - un émetteur typé (`ProgramBuilder`) + assembleur/désassembleur textuels
//! - `content_hash` (FNV-1a 64, clé du cache de code)
//! - `Arch` (cibles natives) et les erreurs `EngineError` / `ErrorKind`
//!
//! Features :
//! - `serde` (par défaut) : derive (dé)sérialisation sur `Arch` et `ErrorKind`

/* ─────────────────────────── Modules publics ─────────────────────────── */

pub mod arch;
pub mod bytecode;
pub mod error;

pub use arch::Arch;
pub use bytecode::{asm, disasm};
pub use bytecode::{decode_at, Instruction, InstructionBuffer, Opcode, ProgramBuilder, Reg};
pub use error::{EngineError, EngineResult, ErrorKind, Fault};

/* ─────────────────────────── Constantes machine ─────────────────────────── */

/// Taille du banc de registres de l'interpréteur.
pub const REGISTER_COUNT: usize = 16;

/// Capacité de la pile d'opérandes (en slots de 64 bits).
pub const STACK_SLOTS: usize = 256;

/* ─────────────────────────── Hash de contenu ─────────────────────────── */

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Hash de contenu FNV-1a 64 bits (non cryptographique, sensible à l'ordre).
///
/// Les collisions sont possibles : le cache compare toujours le contenu complet.
pub fn content_hash(data: &[u8]) -> u64 {
    data.iter().fold(FNV_OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

/* ─────────────────────────── Prélude ─────────────────────────── */

/// Prélude pratique pour importer les types/funcs clés du crate.
pub mod prelude {
    pub use super::{
        content_hash, decode_at, Arch, EngineError, EngineResult, ErrorKind, Fault, Instruction,
        InstructionBuffer, Opcode, ProgramBuilder, Reg, REGISTER_COUNT, STACK_SLOTS,
    };
}

/* ─────────────────────────── Tests ─────────────────────────── */

//! astc-sys : primitives **système** bas-niveau pour astc (cross-platform)
//!
//! Objectifs :
//! - Régions de code exécutables page-alignées (`ExecRegion`) : mmap/VirtualAlloc
//!   en lecture/écriture/exécution, protection, libération unique
//! - Invalidation du cache d'instructions après écriture (AArch64)
//! - Comptabilité des régions vivantes (par thread) pour les tests de fuite
//! - Chargement dynamique de librairies (feature `dl` → `libloading`)
//! - Infos système : taille de page

use core::fmt;

pub mod exec;

#[cfg(feature = "dl")]
pub mod dl;

pub use exec::{live_bytes, live_regions, ExecRegion};

#[cfg(feature = "dl")]
pub use dl::DynLib;

// ───────────────────────────── Erreur / Result ────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SysError {
    Unsupported(&'static str),
    Invalid(&'static str),
    Oom,
    Io(String),
}

impl fmt::Display for SysError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(s) => write!(f, "unsupported:{s}"),
            Self::Invalid(s) => write!(f, "invalid:{s}"),
            Self::Oom => write!(f, "oom"),
            Self::Io(s) => write!(f, "io:{s}"),
        }
    }
}

impl std::error::Error for SysError {}

pub type Result<T> = core::result::Result<T, SysError>;

// ───────────────────────────── Protections ───────────────────────────────

bitflags::bitflags! {
    /// Droits/protections de pages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Prot: u8 { const READ=1; const WRITE=2; const EXEC=4; }
}

impl Prot {
    /// Lecture + écriture + exécution (état initial d'une région de code).
    pub const RWX: Self = Self::READ.union(Self::WRITE).union(Self::EXEC);
    /// Lecture + exécution (région scellée).
    pub const RX: Self = Self::READ.union(Self::EXEC);
}

// ───────────────────────────── Utils communs ──────────────────────────────

/// Taille de page du système (4K si inconnue).
pub fn page_size() -> usize {
    exec::os_page_size().unwrap_or(4096)
}

/// Arrondit `x` au multiple supérieur de `a` (puissance de deux).
pub(crate) const fn round_up(x: usize, a: usize) -> Option<usize> {
    match x.checked_add(a - 1) {
        Some(v) => Some(v & !(a - 1)),
        None => None,
    }
}

// ───────────────────────────── Tests ─────────────────────────────────────

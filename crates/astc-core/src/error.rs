//! Erreurs du moteur : un variant par catégorie, messages stables.
//!
//! Toutes les opérations publiques renvoient `EngineResult<T>` ; aucune ne
//! termine le processus.

use std::borrow::Cow;

use thiserror::Error;

use crate::arch::Arch;

/// Alias résultat commun aux crates astc.
pub type EngineResult<T> = Result<T, EngineError>;

/// Catégorie d'erreur, sans charge utile (pratique pour les tests et les stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorKind {
    /// Entrée vide, mal formée ou hors du sous-ensemble supporté.
    InvalidInput,
    /// Aucune backend pour l'architecture demandée.
    UnsupportedArchitecture,
    /// La sortie native dépasse le buffer pré-dimensionné.
    BufferOverflow,
    /// Le système a refusé la mémoire (exécutable ou non).
    AllocationFailure,
    /// Octet hors de la table d'opcodes.
    UnknownOpcode,
    /// Fonction FFI non enregistrée.
    FfiNotFound,
    /// Arité ou types incompatibles avec la signature déclarée.
    FfiSignatureMismatch,
    /// Bibliothèque ou symbole introuvable.
    LinkFailure,
    /// Faute d'exécution de l'interpréteur.
    ExecutionFault,
}

/// Faute levée par l'interpréteur pendant un run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// Registre hors du banc de registres.
    BadRegister(u8),
    /// Pile d'opérandes pleine.
    StackOverflow,
    /// Pop sur pile vide.
    StackUnderflow,
    /// Budget d'instructions épuisé.
    StepLimit(u64),
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRegister(r) => write!(f, "registre invalide r{r}"),
            Self::StackOverflow => f.write_str("dépassement de pile"),
            Self::StackUnderflow => f.write_str("pile vide"),
            Self::StepLimit(n) => write!(f, "budget de {n} instructions épuisé"),
        }
    }
}

/// Erreur du moteur de compilation/exécution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Entrée invalide.
    #[error("entrée invalide : {0}")]
    InvalidInput(Cow<'static, str>),

    /// Architecture sans backend.
    #[error("architecture non supportée : {0}")]
    UnsupportedArchitecture(Arch),

    /// Buffer de code trop petit.
    #[error("buffer de code saturé : {needed} octets requis, capacité {capacity}")]
    BufferOverflow {
        /// Octets nécessaires au moment de l'échec.
        needed: usize,
        /// Capacité du buffer.
        capacity: usize,
    },

    /// Allocation refusée.
    #[error("échec d'allocation : {0}")]
    AllocationFailure(String),

    /// Opcode inconnu.
    #[error("opcode inconnu 0x{opcode:02X} à pc={pc}")]
    UnknownOpcode {
        /// Octet lu.
        opcode: u8,
        /// Position dans le buffer.
        pc: usize,
    },

    /// Fonction FFI absente du registre.
    #[error("fonction FFI introuvable : `{0}`")]
    FfiNotFound(String),

    /// Appel FFI incompatible avec la signature.
    #[error("signature FFI incompatible pour `{name}` : {reason}")]
    FfiSignatureMismatch {
        /// Nom de la fonction.
        name: String,
        /// Détail.
        reason: String,
    },

    /// Échec de liaison (dlopen/dlsym).
    #[error("échec de liaison : {0}")]
    LinkFailure(String),

    /// Faute de l'interpréteur.
    #[error("faute d'exécution à pc={pc} : {fault}")]
    ExecutionFault {
        /// Position de l'instruction fautive.
        pc: usize,
        /// Nature de la faute.
        fault: Fault,
    },
}

impl EngineError {
    /// Construit une `InvalidInput`.
    pub fn invalid(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Catégorie de l'erreur.
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::UnsupportedArchitecture(_) => ErrorKind::UnsupportedArchitecture,
            Self::BufferOverflow { .. } => ErrorKind::BufferOverflow,
            Self::AllocationFailure(_) => ErrorKind::AllocationFailure,
            Self::UnknownOpcode { .. } => ErrorKind::UnknownOpcode,
            Self::FfiNotFound(_) => ErrorKind::FfiNotFound,
            Self::FfiSignatureMismatch { .. } => ErrorKind::FfiSignatureMismatch,
            Self::LinkFailure(_) => ErrorKind::LinkFailure,
            Self::ExecutionFault { .. } => ErrorKind::ExecutionFault,
        }
    }

    /// Vrai si la requête peut être retentée ou basculée sur l'autre chemin
    /// d'exécution ; le run en cours, lui, est perdu.
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput
                | ErrorKind::BufferOverflow
                | ErrorKind::UnsupportedArchitecture
                | ErrorKind::UnknownOpcode
        )
    }
}

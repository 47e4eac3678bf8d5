//! Architectures cibles connues du moteur.

use std::{fmt, str::FromStr};

use crate::error::EngineError;

/// Architecture d'un bloc de code natif.
///
/// Seules `X86_64` et `Aarch64` ont une backend ; les autres existent pour
/// que les demandes soient rejetées explicitement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Arch {
    /// x86-64 (System V / Win64).
    X86_64,
    /// ARM64 (AAPCS64).
    Aarch64,
    /// x86 32 bits.
    X86,
    /// ARM 32 bits.
    Arm32,
    /// RISC-V 64.
    Riscv64,
}

impl Arch {
    /// Toutes les architectures nommables.
    pub const ALL: [Self; 5] = [Self::X86_64, Self::Aarch64, Self::X86, Self::Arm32, Self::Riscv64];

    /// Architecture de la machine courante, si connue.
    pub const fn host() -> Option<Self> {
        if cfg!(target_arch = "x86_64") {
            Some(Self::X86_64)
        } else if cfg!(target_arch = "aarch64") {
            Some(Self::Aarch64)
        } else if cfg!(target_arch = "x86") {
            Some(Self::X86)
        } else if cfg!(target_arch = "arm") {
            Some(Self::Arm32)
        } else if cfg!(target_arch = "riscv64") {
            Some(Self::Riscv64)
        } else {
            None
        }
    }

    /// Vrai si `self` est l'architecture de la machine courante.
    pub fn is_host(self) -> bool {
        Self::host() == Some(self)
    }

    /// Nom canonique (`x86_64`, `aarch64`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::X86_64 => "x86_64",
            Self::Aarch64 => "aarch64",
            Self::X86 => "x86",
            Self::Arm32 => "arm",
            Self::Riscv64 => "riscv64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Arch {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x86_64" | "x86-64" | "amd64" | "x64" => Ok(Self::X86_64),
            "aarch64" | "arm64" => Ok(Self::Aarch64),
            "x86" | "i686" | "i386" => Ok(Self::X86),
            "arm" | "arm32" | "armv7" => Ok(Self::Arm32),
            "riscv64" | "rv64" => Ok(Self::Riscv64),
            other => Err(EngineError::invalid(format!("architecture inconnue `{other}`"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_aliases() {
        assert_eq!("amd64".parse::<Arch>(), Ok(Arch::X86_64));
        assert_eq!("ARM64".parse::<Arch>(), Ok(Arch::Aarch64));
        assert!("mips".parse::<Arch>().is_err());
    }

    #[test]
    fn names_parse_back() {
        for a in Arch::ALL {
            assert_eq!(a.name().parse::<Arch>(), Ok(a));
        }
    }

    #[test]
    #[cfg(target_arch = "x86_64")]
    fn host_is_x86_64() {
        assert_eq!(Arch::host(), Some(Arch::X86_64));
        assert!(Arch::X86_64.is_host());
    }
}

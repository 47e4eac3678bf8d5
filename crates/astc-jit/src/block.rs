//! Blocs de code exécutables rendus par le JIT.
//!
//! Un `CodeBlock` possède sa région exécutable : ni `Clone` ni `Send`,
//! libéré une seule fois (`release` consomme, sinon `Drop`).

#![allow(unsafe_code)]

use astc_core::{Arch, EngineError, EngineResult};
use astc_sys::{ExecRegion, Prot, SysError};

fn alloc_err(e: SysError) -> EngineError {
    EngineError::AllocationFailure(e.to_string())
}

#[derive(Debug)]
pub struct CodeBlock {
    region: ExecRegion,
    len: usize,
    arch: Arch,
}

impl CodeBlock {
    /// Copie `code` dans une région exécutable neuve ; `seal` retire
    /// ensuite le droit d'écriture.
    pub(crate) fn from_code(code: &[u8], arch: Arch, seal: bool) -> EngineResult<Self> {
        let mut region = ExecRegion::allocate(code.len()).map_err(alloc_err)?;
        region.write(0, code).map_err(alloc_err)?;
        if seal {
            region.protect(Prot::RX).map_err(alloc_err)?;
        }
        Ok(Self { region, len: code.len(), arch })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.region.as_ptr()
    }

    /// Octets de code émis (la région mappée est plus grande).
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn arch(&self) -> Arch {
        self.arch
    }

    pub const fn is_executable(&self) -> bool {
        self.region.is_executable()
    }

    /// Vrai si la région n'est plus inscriptible.
    pub fn is_sealed(&self) -> bool {
        !self.region.prot().contains(Prot::WRITE)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.region.bytes()[..self.len]
    }

    /// Appelle le bloc comme `extern "C" fn() -> i64`.
    ///
    /// Refusé si le bloc vise une autre architecture que l'hôte.
    pub fn invoke(&self) -> EngineResult<i64> {
        if !self.arch.is_host() {
            return Err(EngineError::UnsupportedArchitecture(self.arch));
        }
        if !self.is_executable() {
            return Err(EngineError::invalid("bloc non exécutable"));
        }
        // SAFETY: le contenu vient de `backend::emit_program` pour l'arch hôte :
        // une fonction feuille complète (prologue → retour) qui ne touche que
        // des registres volatils et sa propre frame. La région reste mappée
        // tant que `self` est emprunté.
        let f: extern "C" fn() -> i64 = unsafe { core::mem::transmute(self.region.as_ptr()) };
        Ok(f())
    }

    /// Libère la région exécutable.
    pub fn release(self) -> EngineResult<()> {
        self.region.release().map_err(alloc_err)
    }
}

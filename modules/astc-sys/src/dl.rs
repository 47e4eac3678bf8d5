//! Chargement dynamique de librairies (`libloading`).

#![allow(unsafe_code)]

use core::{ffi::c_void, ptr::NonNull};

use crate::{Result, SysError};

/// Librairie native chargée ; déchargée au drop.
#[derive(Debug)]
pub struct DynLib {
    lib: libloading::Library,
    name: String,
}

impl DynLib {
    /// Charge une librairie par chemin ou nom système.
    ///
    /// # Safety
    /// Les constructeurs de la librairie s'exécutent au chargement.
    pub unsafe fn open(path: &str) -> Result<Self> {
        libloading::Library::new(path)
            .map(|lib| Self { lib, name: path.to_string() })
            .map_err(|e| SysError::Io(e.to_string()))
    }

    /// Le programme courant (symboles déjà liés : libc, exécutable…).
    #[cfg(unix)]
    pub fn this() -> Self {
        let lib = libloading::os::unix::Library::this();
        Self { lib: lib.into(), name: "<process>".to_string() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Symbole typé.
    ///
    /// # Safety
    /// `T` doit correspondre au type réel du symbole.
    pub unsafe fn symbol<T>(&self, name: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        self.lib.get(name).map_err(|e| SysError::Io(e.to_string()))
    }

    /// Adresse brute d'un symbole (non nulle).
    pub fn address(&self, name: &str) -> Result<NonNull<c_void>> {
        // SAFETY: on ne lit que l'adresse, jamais la valeur pointée.
        let sym = unsafe { self.symbol::<*mut c_void>(name.as_bytes())? };
        NonNull::new(*sym).ok_or(SysError::Invalid("symbole nul"))
    }
}

//! Régions de mémoire exécutable.
//!
//! Une `ExecRegion` possède son mapping : elle est libérée exactement une fois
//! (`release` ou `Drop`), et n'est ni `Clone`, ni `Send`.

#![allow(unsafe_code)]

use core::ptr::NonNull;
use std::cell::Cell;

use crate::{round_up, Prot, Result, SysError};

thread_local! {
    static LIVE_REGIONS: Cell<usize> = const { Cell::new(0) };
    static LIVE_BYTES: Cell<usize> = const { Cell::new(0) };
}

/// Nombre de régions vivantes allouées par le thread courant.
pub fn live_regions() -> usize {
    LIVE_REGIONS.with(Cell::get)
}

/// Octets mappés par les régions vivantes du thread courant.
pub fn live_bytes() -> usize {
    LIVE_BYTES.with(Cell::get)
}

fn account(regions: isize, bytes: usize) {
    LIVE_REGIONS.with(|c| c.set(c.get().saturating_add_signed(regions)));
    LIVE_BYTES.with(|c| {
        if regions > 0 {
            c.set(c.get().saturating_add(bytes));
        } else {
            c.set(c.get().saturating_sub(bytes));
        }
    });
}

/// Mapping anonyme page-aligné avec droit d'exécution.
#[derive(Debug)]
pub struct ExecRegion {
    base: NonNull<u8>,
    len: usize,
    prot: Prot,
}

impl ExecRegion {
    /// Réserve au moins `size` octets en lecture/écriture/exécution.
    pub fn allocate(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(SysError::Invalid("taille nulle"));
        }
        let len = round_up(size, crate::page_size()).ok_or(SysError::Invalid("overflow"))?;
        let base = os::map_rwx(len)?;
        account(1, len);
        tracing::trace!(target: "astc::sys", len, addr = ?base, "région exécutable allouée");
        Ok(Self { base, len, prot: Prot::RWX })
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Taille mappée (multiple de la taille de page).
    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub const fn prot(&self) -> Prot {
        self.prot
    }

    /// Vrai tant que la région garde le droit d'exécution.
    pub const fn is_executable(&self) -> bool {
        self.prot.contains(Prot::EXEC)
    }

    /// Vue en lecture de la région.
    pub fn bytes(&self) -> &[u8] {
        // SAFETY: `base..base+len` est mappé (au moins en lecture) tant que `self` vit.
        unsafe { core::slice::from_raw_parts(self.base.as_ptr(), self.len) }
    }

    /// Copie `code` à `offset`, puis invalide le cache d'instructions.
    pub fn write(&mut self, offset: usize, code: &[u8]) -> Result<()> {
        let end = offset.checked_add(code.len()).ok_or(SysError::Invalid("overflow"))?;
        if end > self.len {
            return Err(SysError::Invalid("range"));
        }
        if !self.prot.contains(Prot::WRITE) {
            return Err(SysError::Invalid("région scellée"));
        }
        // SAFETY: plage vérifiée ci-dessus ; `code` ne peut pas chevaucher la
        // région (emprunt exclusif de `self`).
        unsafe {
            let dst = self.base.as_ptr().add(offset);
            os::begin_write();
            core::ptr::copy_nonoverlapping(code.as_ptr(), dst, code.len());
            os::end_write();
            os::flush_icache(dst, code.len());
        }
        Ok(())
    }

    /// Change la protection de toute la région.
    pub fn protect(&mut self, prot: Prot) -> Result<()> {
        // SAFETY: la région est vivante et possédée.
        unsafe { os::protect(self.base, self.len, prot)? };
        self.prot = prot;
        Ok(())
    }

    /// Libère le mapping et rapporte une éventuelle erreur de l'OS.
    pub fn release(self) -> Result<()> {
        let this = core::mem::ManuallyDrop::new(self);
        this.unmap()
    }

    fn unmap(&self) -> Result<()> {
        account(-1, self.len);
        tracing::trace!(target: "astc::sys", len = self.len, addr = ?self.base, "région exécutable libérée");
        // SAFETY: appelé une seule fois (release consomme, Drop ne repasse pas).
        unsafe { os::unmap(self.base, self.len) }
    }
}

impl Drop for ExecRegion {
    fn drop(&mut self) {
        if let Err(e) = self.unmap() {
            tracing::warn!(target: "astc::sys", error = %e, "échec de libération d'une région");
        }
    }
}

// ───────────────────────────── Backend Unix ──────────────────────────────

#[cfg(unix)]
mod os {
    use super::*;

    pub fn page_size() -> Option<usize> {
        // SAFETY: sysconf est sans effet de bord.
        let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(v).ok().filter(|v| v.is_power_of_two())
    }

    fn prot_flags(prot: Prot) -> libc::c_int {
        let mut pf = libc::PROT_NONE;
        if prot.contains(Prot::READ) {
            pf |= libc::PROT_READ;
        }
        if prot.contains(Prot::WRITE) {
            pf |= libc::PROT_WRITE;
        }
        if prot.contains(Prot::EXEC) {
            pf |= libc::PROT_EXEC;
        }
        pf
    }

    #[cfg(target_os = "macos")]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON | libc::MAP_JIT;
    #[cfg(not(target_os = "macos"))]
    const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANON;

    pub fn map_rwx(len: usize) -> Result<NonNull<u8>> {
        // SAFETY: mapping anonyme, aucun pointeur existant n'est touché.
        let p = unsafe {
            libc::mmap(core::ptr::null_mut(), len, prot_flags(Prot::RWX), MAP_FLAGS, -1, 0)
        };
        if p == libc::MAP_FAILED {
            let err = std::io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOMEM) => SysError::Oom,
                _ => SysError::Io(format!("mmap: {err}")),
            });
        }
        NonNull::new(p.cast::<u8>()).ok_or(SysError::Io("mmap: pointeur nul".into()))
    }

    pub unsafe fn unmap(base: NonNull<u8>, len: usize) -> Result<()> {
        if libc::munmap(base.as_ptr().cast(), len) != 0 {
            return Err(SysError::Io(format!("munmap: {}", std::io::Error::last_os_error())));
        }
        Ok(())
    }

    pub unsafe fn protect(base: NonNull<u8>, len: usize, prot: Prot) -> Result<()> {
        if libc::mprotect(base.as_ptr().cast(), len, prot_flags(prot)) != 0 {
            return Err(SysError::Io(format!("mprotect: {}", std::io::Error::last_os_error())));
        }
        Ok(())
    }

    #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
    extern "C" {
        fn pthread_jit_write_protect_np(enabled: libc::c_int);
        fn sys_icache_invalidate(start: *mut libc::c_void, len: libc::size_t);
    }

    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    extern "C" {
        fn __clear_cache(begin: *mut libc::c_char, end: *mut libc::c_char);
    }

    pub unsafe fn begin_write() {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        pthread_jit_write_protect_np(0);
    }

    pub unsafe fn end_write() {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        pthread_jit_write_protect_np(1);
    }

    pub unsafe fn flush_icache(start: *mut u8, len: usize) {
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        sys_icache_invalidate(start.cast(), len);
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        __clear_cache(start.cast(), start.add(len).cast());
        // x86 : caches cohérents
        let _ = (start, len);
    }
}

// ───────────────────────────── Backend Windows ───────────────────────────

#[cfg(windows)]
mod os {
    use super::*;
    use windows_sys::Win32::System::{
        Diagnostics::Debug::FlushInstructionCache,
        Memory::{
            VirtualAlloc, VirtualFree, VirtualProtect, MEM_COMMIT, MEM_RELEASE, MEM_RESERVE,
            PAGE_EXECUTE, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS,
            PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
        Threading::GetCurrentProcess,
    };

    pub fn page_size() -> Option<usize> {
        // SAFETY: GetSystemInfo remplit la structure fournie.
        let info = unsafe {
            let mut info: SYSTEM_INFO = core::mem::zeroed();
            GetSystemInfo(&mut info);
            info
        };
        usize::try_from(info.dwPageSize).ok().filter(|v| v.is_power_of_two())
    }

    fn prot_to_win(p: Prot) -> PAGE_PROTECTION_FLAGS {
        match (p.contains(Prot::READ), p.contains(Prot::WRITE), p.contains(Prot::EXEC)) {
            (false, false, false) => PAGE_NOACCESS,
            (true, false, false) => PAGE_READONLY,
            (_, true, false) => PAGE_READWRITE,
            (true, false, true) => PAGE_EXECUTE_READ,
            (_, true, true) => PAGE_EXECUTE_READWRITE,
            (false, false, true) => PAGE_EXECUTE,
        }
    }

    pub fn map_rwx(len: usize) -> Result<NonNull<u8>> {
        // SAFETY: réservation + commit d'une zone neuve.
        let p = unsafe {
            VirtualAlloc(core::ptr::null(), len, MEM_COMMIT | MEM_RESERVE, PAGE_EXECUTE_READWRITE)
        };
        NonNull::new(p.cast::<u8>()).ok_or(SysError::Oom)
    }

    pub unsafe fn unmap(base: NonNull<u8>, _len: usize) -> Result<()> {
        if VirtualFree(base.as_ptr().cast(), 0, MEM_RELEASE) == 0 {
            return Err(SysError::Io("VirtualFree".into()));
        }
        Ok(())
    }

    pub unsafe fn protect(base: NonNull<u8>, len: usize, prot: Prot) -> Result<()> {
        let mut old: PAGE_PROTECTION_FLAGS = 0;
        if VirtualProtect(base.as_ptr().cast(), len, prot_to_win(prot), &mut old) == 0 {
            return Err(SysError::Io("VirtualProtect".into()));
        }
        Ok(())
    }

    pub unsafe fn begin_write() {}

    pub unsafe fn end_write() {}

    pub unsafe fn flush_icache(start: *mut u8, len: usize) {
        FlushInstructionCache(GetCurrentProcess(), start.cast(), len);
    }
}

#[cfg(not(any(unix, windows)))]
mod os {
    use super::*;

    pub fn page_size() -> Option<usize> {
        None
    }
    pub fn map_rwx(_len: usize) -> Result<NonNull<u8>> {
        Err(SysError::Unsupported("mémoire exécutable"))
    }
    pub unsafe fn unmap(_base: NonNull<u8>, _len: usize) -> Result<()> {
        Ok(())
    }
    pub unsafe fn protect(_base: NonNull<u8>, _len: usize, _prot: Prot) -> Result<()> {
        Err(SysError::Unsupported("protect"))
    }
    pub unsafe fn begin_write() {}
    pub unsafe fn end_write() {}
    pub unsafe fn flush_icache(_start: *mut u8, _len: usize) {}
}

pub(crate) fn os_page_size() -> Option<usize> {
    os::page_size()
}

// ───────────────────────────── Tests ─────────────────────────────────────

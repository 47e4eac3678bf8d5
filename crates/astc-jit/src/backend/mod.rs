//! Backends natives : une par architecture supportée.
//!
//! Une backend émet un prologue fixe (cadre de pile selon la convention de
//! la cible), un gabarit par [`NativeOp`], et l'épilogue à chaque retour.

use astc_core::{Arch, EngineError, EngineResult};

use crate::{codebuf::CodeBuffer, lower::NativeOp};

pub mod aarch64;
pub mod x86_64;

pub use aarch64::Aarch64Backend;
pub use x86_64::X86_64Backend;

pub trait Backend: Sync {
    fn arch(&self) -> Arch;

    fn name(&self) -> &'static str;

    /// Registres virtuels disponibles (`r0..rN-1`), scratch exclu.
    fn register_count(&self) -> u8;

    fn prologue(&self, buf: &mut CodeBuffer) -> EngineResult<()>;

    fn emit(&self, op: NativeOp, buf: &mut CodeBuffer) -> EngineResult<()>;

    fn epilogue(&self, buf: &mut CodeBuffer) -> EngineResult<()>;
}

static X86_64: X86_64Backend = X86_64Backend;
static AARCH64: Aarch64Backend = Aarch64Backend;

/// Backend de `arch`, ou `UnsupportedArchitecture`.
pub fn backend_for(arch: Arch) -> EngineResult<&'static dyn Backend> {
    match arch {
        Arch::X86_64 => Ok(&X86_64),
        Arch::Aarch64 => Ok(&AARCH64),
        Arch::X86 | Arch::Arm32 | Arch::Riscv64 => Err(EngineError::UnsupportedArchitecture(arch)),
    }
}

/// Émet un programme complet dans un buffer de `capacity` octets.
pub fn emit_program(backend: &dyn Backend, ops: &[NativeOp], capacity: usize) -> EngineResult<Vec<u8>> {
    let mut buf = CodeBuffer::with_capacity(capacity);
    backend.prologue(&mut buf)?;
    for &op in ops {
        backend.emit(op, &mut buf)?;
    }
    Ok(buf.into_vec())
}

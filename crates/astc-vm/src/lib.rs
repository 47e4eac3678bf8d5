//! astc-vm : interpréteur de bytecode astc
//!
//! Machine à états `Ready → Running → {Stopped | Error}` avec un banc de
//! [`REGISTER_COUNT`](astc_core::REGISTER_COUNT) registres et une pile de
//! [`STACK_SLOTS`](astc_core::STACK_SLOTS) slots, tous deux de taille fixe :
//! la boucle d'exécution n'alloue jamais.
//!
//! Les appels `CALL` sortent par le trait [`HostCalls`] ; l'Execution Service
//! le branche sur son pont FFI.
//!
//! ```ignore
//! use astc_core::ProgramBuilder;
//! use astc_vm::Vm;
//! let mut b = ProgramBuilder::new();
//! b.load_imm(0, 10).load_imm(1, 20).add(0, 1, 0).ret(0);
//! let code = b.finish();
//! let mut vm = Vm::new();
//! vm.load(&code)?;
//! assert_eq!(vm.run()?, 30);
//! ```

#[cfg(feature = "tracing")]
macro_rules! vm_trace {
    ($($t:tt)*) => { tracing::debug!(target: "astc::vm", $($t)*) };
}
#[cfg(not(feature = "tracing"))]
macro_rules! vm_trace {
    ($($t:tt)*) => {};
}

pub mod host;
pub mod vm;

pub use host::{HostCalls, NoHost};
pub use vm::{Vm, VmState};

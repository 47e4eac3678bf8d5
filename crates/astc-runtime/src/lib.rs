//! astc-runtime : pont FFI et service d'exécution astc
//!
//! - [`ffi`] : registre nom → fonction hôte, signatures typées, appels
//!   marshalés, librairies chargées à chaud
//! - [`engine`] : [`ExecutionService`], qui choisit entre l'interpréteur
//!   (`astc-vm`) et le JIT (`astc-jit`) et tient les statistiques
//!
//! Chaque `ExecutionService` possède son cache, son registre FFI et ses
//! régions exécutables : pas d'état global, pas de verrou. Le service n'est
//! pas `Send`.
//!
//! ```ignore
//! use astc_runtime::{ExecMode, ExecutionService};
//! let mut svc = ExecutionService::with_defaults();
//! let out = svc.execute(&code, ExecMode::Auto)?;
//! println!("{} via {}", out.value, out.path);
//! ```

pub mod engine;
pub mod ffi;

pub use engine::{EngineConfig, EngineStats, ExecMode, ExecPath, Execution, ExecutionService};
pub use ffi::{FfiBridge, FfiFunction, FfiType, HostFn, Signature, Value};

pub mod prelude {
    pub use super::{EngineConfig, ExecMode, ExecutionService, FfiBridge, FfiType, Signature, Value};
    pub use astc_core::prelude::*;
}

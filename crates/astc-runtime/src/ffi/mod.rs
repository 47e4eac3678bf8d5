//! Pont FFI : fonctions hôte appelables par nom depuis le bytecode.
//!
//! Seules deux classes d'appel sont marshalées : tout entier (≤ 6 arguments
//! `bool`/`i32`/`i64`/`ptr`) ou tout `f64` (≤ 4 arguments). Le reste est
//! refusé à l'enregistrement.

mod bridge;
mod dispatch;
mod host_fn;
mod types;

pub use bridge::{FfiBridge, FfiFunction};
pub use host_fn::{FfiArg, FfiRet, HostFn};
pub use types::{FfiType, Shape, Signature, Value, MAX_FLOAT_PARAMS, MAX_INT_PARAMS};

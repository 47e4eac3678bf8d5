//! Signatures dérivées des types Rust pour les pointeurs `extern "C" fn`.

use core::ffi::c_void;

use super::types::{FfiType, Signature};

/// Type Rust passable en argument FFI.
pub trait FfiArg: Copy {
    const TYPE: FfiType;
}

/// Type Rust rendu par une fonction FFI.
pub trait FfiRet {
    const TYPE: FfiType;
}

macro_rules! ffi_scalar {
    ($($t:ty => $ffi:ident),* $(,)?) => {$(
        impl FfiArg for $t {
            const TYPE: FfiType = FfiType::$ffi;
        }
        impl FfiRet for $t {
            const TYPE: FfiType = FfiType::$ffi;
        }
    )*};
}

ffi_scalar! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    f64 => F64,
    *const c_void => Ptr,
    *mut c_void => Ptr,
}

impl FfiRet for () {
    const TYPE: FfiType = FfiType::Void;
}

/// Pointeur de fonction hôte dont la signature se lit dans son type.
pub trait HostFn: Copy {
    fn signature() -> Signature;
    fn address(self) -> *const ();
}

macro_rules! host_fn {
    ($($a:ident),*) => {
        impl<R: FfiRet, $($a: FfiArg),*> HostFn for extern "C" fn($($a),*) -> R {
            fn signature() -> Signature {
                Signature::new(&[$($a::TYPE),*], R::TYPE)
            }

            fn address(self) -> *const () {
                self as *const ()
            }
        }
    };
}

host_fn!();
host_fn!(A);
host_fn!(A, B);
host_fn!(A, B, C);
host_fn!(A, B, C, D);
host_fn!(A, B, C, D, E);
host_fn!(A, B, C, D, E, F);
host_fn!(A, B, C, D, E, F, G);

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    extern "C" fn mix(_: i32, _: bool, _: *const c_void) -> f64 {
        0.0
    }

    extern "C" fn unit() {}

    fn sig<F: HostFn>(_: F) -> Signature {
        F::signature()
    }

    #[test]
    fn signature_from_type() {
        assert_eq!(
            sig(mix as extern "C" fn(i32, bool, *const c_void) -> f64),
            Signature::new(&[FfiType::I32, FfiType::Bool, FfiType::Ptr], FfiType::F64)
        );
        assert_eq!(sig(unit as extern "C" fn()), Signature::new(&[], FfiType::Void));
    }
}

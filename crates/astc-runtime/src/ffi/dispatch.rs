//! Appel effectif d'un pointeur hôte selon sa classe d'appel.
//!
//! Seul endroit du moteur qui transforme une adresse en fonction. Les
//! arguments entiers sont élargis en mots de 64 bits : sur x86-64 et AArch64
//! l'appelé ne lit que la partie basse de son registre.

#![allow(unsafe_code)]

use core::mem::transmute;

use super::types::{FfiType, Shape, Value};

#[derive(Debug, Clone, Copy)]
enum RetClass {
    Int,
    Float,
    Void,
}

enum Raw {
    Int(i64),
    Float(f64),
    Void,
}

macro_rules! call_as {
    ($addr:ident, $class:ident, $t:ty; $($arg:ident),*) => {
        match $class {
            RetClass::Int => Raw::Int(transmute::<*const (), extern "C" fn($(call_as!(@ty $arg $t)),*) -> i64>($addr)($($arg),*)),
            RetClass::Float => Raw::Float(transmute::<*const (), extern "C" fn($(call_as!(@ty $arg $t)),*) -> f64>($addr)($($arg),*)),
            RetClass::Void => {
                transmute::<*const (), extern "C" fn($(call_as!(@ty $arg $t)),*)>($addr)($($arg),*);
                Raw::Void
            }
        }
    };
    (@ty $arg:ident $t:ty) => { $t };
}

/// Appelle `addr` avec `words` (classe entière) ou `floats` (classe f64).
///
/// # Safety
/// `addr` doit pointer sur une fonction `extern "C"` dont la signature réelle
/// correspond à `shape` et `ret`, et `words`/`floats` doivent avoir l'arité
/// de `shape`.
pub(crate) unsafe fn invoke(addr: *const (), shape: Shape, ret: FfiType, words: &[i64], floats: &[f64]) -> Option<Value> {
    let class = match ret {
        FfiType::Void => RetClass::Void,
        FfiType::F64 => RetClass::Float,
        FfiType::Bool | FfiType::I32 | FfiType::I64 | FfiType::Ptr => RetClass::Int,
    };
    // SAFETY: contrat de l'appelant.
    let raw = unsafe {
        match (shape, words, floats) {
            (Shape::Int(0), [], _) => call_as!(addr, class, i64;),
            (Shape::Int(1), &[a], _) => call_as!(addr, class, i64; a),
            (Shape::Int(2), &[a, b], _) => call_as!(addr, class, i64; a, b),
            (Shape::Int(3), &[a, b, c], _) => call_as!(addr, class, i64; a, b, c),
            (Shape::Int(4), &[a, b, c, d], _) => call_as!(addr, class, i64; a, b, c, d),
            (Shape::Int(5), &[a, b, c, d, e], _) => call_as!(addr, class, i64; a, b, c, d, e),
            (Shape::Int(6), &[a, b, c, d, e, f], _) => call_as!(addr, class, i64; a, b, c, d, e, f),
            (Shape::Float(1), _, &[a]) => call_as!(addr, class, f64; a),
            (Shape::Float(2), _, &[a, b]) => call_as!(addr, class, f64; a, b),
            (Shape::Float(3), _, &[a, b, c]) => call_as!(addr, class, f64; a, b, c),
            (Shape::Float(4), _, &[a, b, c, d]) => call_as!(addr, class, f64; a, b, c, d),
            _ => return None,
        }
    };
    Some(match (raw, ret) {
        (Raw::Int(w), FfiType::Bool) => Value::Bool(w as u8 != 0),
        (Raw::Int(w), FfiType::I32) => Value::I32(w as i32),
        (Raw::Int(w), FfiType::Ptr) => Value::Ptr(w as usize),
        (Raw::Int(w), _) => Value::I64(w),
        (Raw::Float(x), _) => Value::F64(x),
        (Raw::Void, _) => Value::Void,
    })
}

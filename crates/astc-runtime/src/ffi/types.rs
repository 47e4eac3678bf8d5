//! Types FFI : type déclaré, valeur uniforme, signature.

use core::fmt;

use astc_core::{EngineError, EngineResult};
use smallvec::SmallVec;

/// Registres entiers disponibles pour les arguments (System V : rdi..r9).
pub const MAX_INT_PARAMS: usize = 6;
/// Arguments flottants acceptés (xmm0..xmm3 / d0..d3).
pub const MAX_FLOAT_PARAMS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FfiType {
    Void,
    Bool,
    I32,
    I64,
    F64,
    Ptr,
}

impl FfiType {
    /// Passé dans un registre entier.
    pub const fn is_integer_class(self) -> bool {
        matches!(self, Self::Bool | Self::I32 | Self::I64 | Self::Ptr)
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::Bool => "bool",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F64 => "f64",
            Self::Ptr => "ptr",
        }
    }
}

impl fmt::Display for FfiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Valeur échangée avec les fonctions hôte.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Value {
    Void,
    Bool(bool),
    I32(i32),
    I64(i64),
    F64(f64),
    Ptr(usize),
}

impl Value {
    pub const fn ty(&self) -> FfiType {
        match self {
            Self::Void => FfiType::Void,
            Self::Bool(_) => FfiType::Bool,
            Self::I32(_) => FfiType::I32,
            Self::I64(_) => FfiType::I64,
            Self::F64(_) => FfiType::F64,
            Self::Ptr(_) => FfiType::Ptr,
        }
    }

    /// Mot entier passé en registre (`None` pour `Void` et `F64`).
    pub(crate) fn int_word(self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(b)),
            Self::I32(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            Self::Ptr(p) => Some(p as i64),
            Self::Void | Self::F64(_) => None,
        }
    }

    /// Conversion depuis un mot de la VM vers le type déclaré.
    ///
    /// `F64` est converti numériquement ; `I32` hors bornes est refusé.
    pub fn from_word(ty: FfiType, w: i64) -> Result<Self, String> {
        Ok(match ty {
            FfiType::Void => return Err("paramètre void".into()),
            FfiType::Bool => Self::Bool(w != 0),
            FfiType::I32 => Self::I32(i32::try_from(w).map_err(|_| format!("{w} hors de i32"))?),
            FfiType::I64 => Self::I64(w),
            FfiType::F64 => Self::F64(w as f64),
            FfiType::Ptr => Self::Ptr(w as usize),
        })
    }

    /// Mot rendu à la VM (`Void` → 0, `F64` tronqué vers zéro).
    pub fn to_word(self) -> i64 {
        match self {
            Self::Void => 0,
            Self::F64(x) => x as i64,
            other => other.int_word().unwrap_or_default(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::I32(v) => write!(f, "{v}i32"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F64(x) => write!(f, "{x:?}"),
            Self::Ptr(p) => write!(f, "{p:#x}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::F64(v)
    }
}

/// Classe d'appel : tout entier (registres généraux) ou tout `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Int(usize),
    Float(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature {
    pub params: SmallVec<[FfiType; MAX_INT_PARAMS]>,
    pub ret: FfiType,
}

impl Signature {
    pub fn new(params: &[FfiType], ret: FfiType) -> Self {
        Self { params: params.into(), ret }
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Classe d'appel, ou `InvalidInput` si la signature n'est pas
    /// marshalable (paramètre void, mélange entier/flottant, trop d'arguments).
    pub fn shape(&self) -> EngineResult<Shape> {
        if self.params.contains(&FfiType::Void) {
            return Err(EngineError::invalid(format!("paramètre void dans {self}")));
        }
        let floats = self.params.iter().filter(|t| **t == FfiType::F64).count();
        let n = self.params.len();
        match (floats, n) {
            (0, n) if n <= MAX_INT_PARAMS => Ok(Shape::Int(n)),
            (0, _) => Err(EngineError::invalid(format!("{self} : plus de {MAX_INT_PARAMS} arguments entiers"))),
            (f, n) if f == n && n <= MAX_FLOAT_PARAMS => Ok(Shape::Float(n)),
            (f, n) if f == n => Err(EngineError::invalid(format!("{self} : plus de {MAX_FLOAT_PARAMS} arguments f64"))),
            _ => Err(EngineError::invalid(format!("{self} : arguments entiers et f64 mélangés"))),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", self.ret)
    }
}

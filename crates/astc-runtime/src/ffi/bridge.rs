//! Registre FFI : nom → {adresse hôte, signature}.

#![allow(unsafe_code)]

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use astc_core::{EngineError, EngineResult};
use astc_sys::DynLib;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::{
    dispatch,
    host_fn::HostFn,
    types::{Shape, Signature, Value, MAX_INT_PARAMS},
};

/// Une fonction hôte enregistrée.
#[derive(Debug)]
pub struct FfiFunction {
    name: String,
    addr: *const (),
    signature: Signature,
    shape: Shape,
    /// Librairie d'origine (`None` : enregistrée directement).
    origin: Option<String>,
    calls: u64,
    total_time: Duration,
}

impl FfiFunction {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }
    pub const fn address(&self) -> *const () {
        self.addr
    }
    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }
    pub const fn calls(&self) -> u64 {
        self.calls
    }
    pub const fn total_time(&self) -> Duration {
        self.total_time
    }
}

/// Pont FFI. Les adresses résolues restent valides tant que le pont vit :
/// il garde ses librairies chargées.
#[derive(Debug, Default)]
pub struct FfiBridge {
    functions: HashMap<String, FfiFunction>,
    libraries: Vec<DynLib>,
}

fn mismatch(name: &str, reason: impl Into<String>) -> EngineError {
    EngineError::FfiSignatureMismatch { name: name.to_string(), reason: reason.into() }
}

impl FfiBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&FfiFunction> {
        self.functions.get(name)
    }

    /// Noms enregistrés, triés.
    pub fn names(&self) -> Vec<&str> {
        let mut v: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    pub fn functions(&self) -> impl Iterator<Item = &FfiFunction> {
        self.functions.values()
    }

    pub fn libraries(&self) -> impl Iterator<Item = &str> {
        self.libraries.iter().map(DynLib::name)
    }

    /// Nombre total d'appels réussis.
    pub fn total_calls(&self) -> u64 {
        self.functions.values().map(|f| f.calls).sum()
    }

    /// Enregistre un pointeur `extern "C" fn` typé.
    ///
    /// ```ignore
    /// extern "C" fn inc(x: i64) -> i64 { x + 1 }
    /// bridge.register("inc", inc as extern "C" fn(i64) -> i64)?;
    /// ```
    pub fn register<F: HostFn>(&mut self, name: impl Into<String>, f: F) -> EngineResult<()> {
        // SAFETY: la signature est lue dans le type même du pointeur.
        unsafe { self.insert(name.into(), f.address(), F::signature(), None) }
    }

    /// Enregistre une adresse brute avec une signature déclarée.
    ///
    /// # Safety
    /// `addr` doit être une fonction `extern "C"` de signature `signature`,
    /// valide tant que le pont est utilisé.
    pub unsafe fn register_raw(&mut self, name: impl Into<String>, addr: *const (), signature: Signature) -> EngineResult<()> {
        if addr.is_null() {
            return Err(EngineError::invalid("adresse nulle"));
        }
        // SAFETY: contrat de l'appelant.
        unsafe { self.insert(name.into(), addr, signature, None) }
    }

    unsafe fn insert(&mut self, name: String, addr: *const (), signature: Signature, origin: Option<String>) -> EngineResult<()> {
        if self.functions.contains_key(&name) {
            return Err(EngineError::invalid(format!("`{name}` déjà enregistrée")));
        }
        let shape = signature.shape()?;
        debug!(target: "astc::ffi", %name, %signature, origin = origin.as_deref().unwrap_or("-"), "enregistrement");
        self.functions.insert(
            name.clone(),
            FfiFunction { name, addr, signature, shape, origin, calls: 0, total_time: Duration::ZERO },
        );
        Ok(())
    }

    /// Charge une librairie hôte ; ses symboles deviennent résolvables.
    ///
    /// # Safety
    /// Les constructeurs de la librairie s'exécutent au chargement.
    pub unsafe fn load_library(&mut self, path: &str) -> EngineResult<()> {
        if self.libraries.iter().any(|l| l.name() == path) {
            trace!(target: "astc::ffi", path, "librairie déjà chargée");
            return Ok(());
        }
        // SAFETY: contrat de l'appelant.
        let lib = unsafe { DynLib::open(path) }.map_err(|e| {
            warn!(target: "astc::ffi", path, error = %e, "chargement impossible");
            EngineError::LinkFailure(format!("{path}: {e}"))
        })?;
        debug!(target: "astc::ffi", path, "librairie chargée");
        self.libraries.push(lib);
        Ok(())
    }

    /// Décharge `path` après avoir retiré toutes les fonctions résolues
    /// dedans ; rend le nombre de fonctions retirées.
    pub fn unload_library(&mut self, path: &str) -> EngineResult<usize> {
        let idx = self
            .libraries
            .iter()
            .position(|l| l.name() == path)
            .ok_or_else(|| EngineError::LinkFailure(format!("{path}: librairie non chargée")))?;
        let before = self.functions.len();
        self.functions.retain(|_, f| f.origin.as_deref() != Some(path));
        let removed = before - self.functions.len();
        drop(self.libraries.remove(idx));
        debug!(target: "astc::ffi", path, removed, "librairie déchargée");
        Ok(removed)
    }

    /// Appel ponctuel de `symbol` dans `path`, sans enregistrement. Une
    /// librairie qui n'était pas chargée est déchargée après l'appel.
    ///
    /// # Safety
    /// Voir [`FfiBridge::load_library`] et [`FfiBridge::resolve`].
    pub unsafe fn call_system_function(
        &self,
        path: &str,
        symbol: &str,
        signature: &Signature,
        args: &[Value],
    ) -> EngineResult<Value> {
        let shape = signature.shape()?;
        let opened;
        let lib = match self.libraries.iter().find(|l| l.name() == path) {
            Some(lib) => lib,
            None => {
                // SAFETY: contrat de l'appelant.
                opened = unsafe { DynLib::open(path) }.map_err(|e| EngineError::LinkFailure(format!("{path}: {e}")))?;
                &opened
            }
        };
        let addr = lib.address(symbol).map_err(|e| EngineError::LinkFailure(format!("`{symbol}`: {e}")))?;
        // SAFETY: contrat de l'appelant ; `lib` reste chargée jusqu'au retour.
        unsafe { invoke_checked(symbol, addr.as_ptr().cast_const().cast(), signature, shape, args) }
    }

    /// Enregistre `symbol`, cherché dans les librairies chargées (la plus
    /// récente d'abord), sous le nom `name`.
    ///
    /// # Safety
    /// Le symbole doit être une fonction `extern "C"` de signature `signature`.
    pub unsafe fn resolve(&mut self, name: impl Into<String>, symbol: &str, signature: Signature) -> EngineResult<()> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(EngineError::invalid(format!("`{name}` déjà enregistrée")));
        }
        let found = self.libraries.iter().rev().find_map(|lib| lib.address(symbol).ok().map(|a| (a, lib.name().to_string())));
        let Some((addr, origin)) = found else {
            return Err(EngineError::LinkFailure(format!("symbole `{symbol}` introuvable ({} librairies)", self.libraries.len())));
        };
        // SAFETY: contrat de l'appelant ; la librairie reste chargée.
        unsafe { self.insert(name, addr.as_ptr().cast_const().cast(), signature, Some(origin)) }
    }

    /// Enregistre `symbol` résolu dans le processus courant.
    ///
    /// # Safety
    /// Voir [`FfiBridge::resolve`].
    #[cfg(unix)]
    pub unsafe fn resolve_in_process(&mut self, name: impl Into<String>, symbol: &str, signature: Signature) -> EngineResult<()> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(EngineError::invalid(format!("`{name}` déjà enregistrée")));
        }
        let me = DynLib::this();
        let addr = me.address(symbol).map_err(|e| EngineError::LinkFailure(format!("`{symbol}`: {e}")))?;
        // SAFETY: contrat de l'appelant ; les symboles du processus ne sont pas déchargés.
        unsafe { self.insert(name, addr.as_ptr().cast_const().cast(), signature, Some(me.name().to_string())) }
    }

    /// Appelle `name` ; arité et types doivent correspondre exactement.
    pub fn call(&mut self, name: &str, args: &[Value]) -> EngineResult<Value> {
        let f = self.functions.get_mut(name).ok_or_else(|| EngineError::FfiNotFound(name.to_string()))?;
        let started = Instant::now();
        // SAFETY: adresse et signature fixées à l'enregistrement.
        let out = unsafe { invoke_checked(name, f.addr, &f.signature, f.shape, args)? };
        let elapsed = started.elapsed();
        f.calls += 1;
        f.total_time += elapsed;
        trace!(target: "astc::ffi", name, ret = %out, nanos = elapsed.as_nanos() as u64, "appel");
        Ok(out)
    }
}

/// Vérifie `args` contre `signature` puis appelle `addr`.
///
/// # Safety
/// `addr` doit être une fonction `extern "C"` de signature `signature`.
unsafe fn invoke_checked(name: &str, addr: *const (), signature: &Signature, shape: Shape, args: &[Value]) -> EngineResult<Value> {
    let params = &signature.params;
    if args.len() != params.len() {
        return Err(mismatch(name, format!("arité : attendu {}, reçu {}", params.len(), args.len())));
    }
    if let Some((i, (a, p))) = args.iter().zip(params.iter()).enumerate().find(|(_, (a, p))| a.ty() != **p) {
        return Err(mismatch(name, format!("argument {i} : attendu {p}, reçu {}", a.ty())));
    }

    let mut words: SmallVec<[i64; MAX_INT_PARAMS]> = SmallVec::new();
    let mut floats: SmallVec<[f64; 4]> = SmallVec::new();
    for a in args {
        match *a {
            Value::F64(x) => floats.push(x),
            other => words.extend(other.int_word()),
        }
    }

    // SAFETY: types vérifiés ci-dessus, classe validée par `Signature::shape`.
    unsafe { dispatch::invoke(addr, shape, signature.ret, &words, &floats) }
        .ok_or_else(|| mismatch(name, format!("classe d'appel {shape:?} non prise en charge")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::FfiType;
    use astc_core::ErrorKind;
    use pretty_assertions::assert_eq;

    extern "C" fn inc(x: i64) -> i64 {
        x + 1
    }

    extern "C" fn hypot(a: f64, b: f64) -> f64 {
        a.hypot(b)
    }

    extern "C" fn pick(flag: bool, a: i32, b: i32) -> i32 {
        if flag {
            a
        } else {
            b
        }
    }

    extern "C" fn is_even(x: i64) -> bool {
        x % 2 == 0
    }

    extern "C" fn sum6(a: i64, b: i64, c: i64, d: i64, e: i64, f: i64) -> i64 {
        a + b + c + d + e + f
    }

    extern "C" fn noop() {}

    extern "C" fn seven(_: i64, _: i64, _: i64, _: i64, _: i64, _: i64, _: i64) -> i64 {
        7
    }

    fn bridge() -> FfiBridge {
        let mut b = FfiBridge::new();
        b.register("fn", inc as extern "C" fn(i64) -> i64).unwrap();
        b
    }

    #[test]
    fn double_registration_fails() {
        let mut b = bridge();
        let err = b.register("fn", inc as extern "C" fn(i64) -> i64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(b.len(), 1);
    }

    #[test]
    fn unknown_name() {
        let mut b = bridge();
        assert_eq!(b.call("nope", &[]), Err(EngineError::FfiNotFound("nope".into())));
    }

    #[test]
    fn arity_and_type_mismatches_never_call() {
        let mut b = bridge();
        for args in [&[][..], &[Value::I64(1), Value::I64(2)][..], &[Value::I32(1)][..]] {
            assert_eq!(b.call("fn", args).unwrap_err().kind(), ErrorKind::FfiSignatureMismatch);
        }
        assert_eq!(b.get("fn").map(FfiFunction::calls), Some(0));
    }

    #[test]
    fn integer_class_calls() {
        let mut b = bridge();
        b.register("pick", pick as extern "C" fn(bool, i32, i32) -> i32).unwrap();
        b.register("even", is_even as extern "C" fn(i64) -> bool).unwrap();
        b.register("sum6", sum6 as extern "C" fn(i64, i64, i64, i64, i64, i64) -> i64).unwrap();
        b.register("noop", noop as extern "C" fn()).unwrap();
        assert_eq!(b.call("fn", &[Value::I64(41)]), Ok(Value::I64(42)));
        assert_eq!(b.call("pick", &[Value::Bool(false), Value::I32(-3), Value::I32(9)]), Ok(Value::I32(9)));
        assert_eq!(b.call("even", &[Value::I64(10)]), Ok(Value::Bool(true)));
        let six: Vec<Value> = (1..=6).map(Value::I64).collect();
        assert_eq!(b.call("sum6", &six), Ok(Value::I64(21)));
        assert_eq!(b.call("noop", &[]), Ok(Value::Void));
        assert_eq!(b.total_calls(), 5);
    }

    #[test]
    fn float_class_calls() {
        let mut b = FfiBridge::new();
        b.register("hypot", hypot as extern "C" fn(f64, f64) -> f64).unwrap();
        assert_eq!(b.call("hypot", &[Value::F64(3.0), Value::F64(4.0)]), Ok(Value::F64(5.0)));
    }

    #[test]
    fn unmarshalable_signatures_are_rejected_at_registration() {
        let mut b = FfiBridge::new();
        let err = b.register("seven", seven as extern "C" fn(i64, i64, i64, i64, i64, i64, i64) -> i64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let raw = unsafe { b.register_raw("mixed", inc as *const (), Signature::new(&[FfiType::I64, FfiType::F64], FfiType::I64)) };
        assert_eq!(raw.unwrap_err().kind(), ErrorKind::InvalidInput);
        assert!(b.is_empty());
    }

    #[test]
    fn raw_registration() {
        let mut b = FfiBridge::new();
        unsafe {
            b.register_raw("inc", inc as *const (), Signature::new(&[FfiType::I64], FfiType::I64)).unwrap();
            assert!(b.register_raw("null", core::ptr::null(), Signature::new(&[], FfiType::Void)).is_err());
        }
        assert_eq!(b.call("inc", &[Value::I64(-1)]), Ok(Value::I64(0)));
        assert_eq!(b.names(), vec!["inc"]);
    }

    #[test]
    fn missing_library_is_a_link_failure() {
        let mut b = FfiBridge::new();
        let err = unsafe { b.load_library("/nonexistent/libastc_missing.so") }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkFailure);
        let err = unsafe { b.resolve("x", "x", Signature::new(&[], FfiType::Void)) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkFailure);
    }

    #[test]
    #[cfg(unix)]
    fn process_symbols_resolve() {
        let mut b = FfiBridge::new();
        unsafe {
            b.resolve_in_process("abs", "labs", Signature::new(&[FfiType::I64], FfiType::I64)).unwrap();
            let err = b.resolve_in_process("nope", "astc_symbole_absent", Signature::new(&[], FfiType::Void)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::LinkFailure);
        }
        assert_eq!(b.call("abs", &[Value::I64(-12)]), Ok(Value::I64(12)));
        assert_eq!(b.get("abs").and_then(FfiFunction::origin), Some("<process>"));
        assert_eq!(b.unload_library("<process>").unwrap_err().kind(), ErrorKind::LinkFailure);
    }

    #[cfg(target_os = "linux")]
    const LIBC: &str = "libc.so.6";

    #[test]
    #[cfg(target_os = "linux")]
    fn unloading_a_library_unregisters_its_functions() {
        let mut b = bridge();
        let sig = Signature::new(&[FfiType::I64], FfiType::I64);
        unsafe {
            b.load_library(LIBC).unwrap();
            b.load_library(LIBC).unwrap();
            b.resolve("abs", "labs", sig.clone()).unwrap();
        }
        assert_eq!(b.libraries().collect::<Vec<_>>(), vec![LIBC]);
        assert_eq!(b.call("abs", &[Value::I64(-3)]), Ok(Value::I64(3)));
        assert_eq!(b.get("abs").and_then(FfiFunction::origin), Some(LIBC));

        assert_eq!(b.unload_library(LIBC), Ok(1));
        assert_eq!(b.call("abs", &[Value::I64(-3)]), Err(EngineError::FfiNotFound("abs".into())));
        assert_eq!(b.libraries().count(), 0);
        assert_eq!(b.names(), vec!["fn"]);
        assert_eq!(b.unload_library(LIBC).unwrap_err().kind(), ErrorKind::LinkFailure);
        let err = unsafe { b.resolve("abs", "labs", sig) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkFailure);
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn one_shot_system_calls() {
        let b = bridge();
        let sig = Signature::new(&[FfiType::I64], FfiType::I64);
        let out = unsafe { b.call_system_function(LIBC, "labs", &sig, &[Value::I64(-8)]) };
        assert_eq!(out, Ok(Value::I64(8)));
        assert_eq!(b.libraries().count(), 0);
        assert_eq!(b.len(), 1);

        let err = unsafe { b.call_system_function(LIBC, "labs", &sig, &[Value::I32(-8)]) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FfiSignatureMismatch);
        let err = unsafe { b.call_system_function(LIBC, "astc_symbole_absent", &sig, &[Value::I64(1)]) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkFailure);
        let err = unsafe { b.call_system_function("/nonexistent/libastc_missing.so", "labs", &sig, &[Value::I64(1)]) }.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LinkFailure);
    }
}

//! Appels hôte depuis le bytecode, via la table d'imports du service.

use astc_core::{EngineError, ErrorKind, ProgramBuilder};
use astc_runtime::{ExecMode, ExecPath, ExecutionService, FfiType, Signature, Value};
use pretty_assertions::assert_eq;

extern "C" fn minus(a: i64, b: i64) -> i64 {
    a - b
}

extern "C" fn weigh(a: i64, b: i64, c: i64) -> i64 {
    a * 100 + b * 10 + c
}

extern "C" fn is_neg(x: i64) -> bool {
    x < 0
}

extern "C" fn answer() -> i32 {
    42
}

fn service() -> ExecutionService {
    let mut svc = ExecutionService::with_defaults();
    let ffi = svc.ffi_mut();
    ffi.register("minus", minus as extern "C" fn(i64, i64) -> i64).unwrap();
    ffi.register("weigh", weigh as extern "C" fn(i64, i64, i64) -> i64).unwrap();
    ffi.register("is_neg", is_neg as extern "C" fn(i64) -> bool).unwrap();
    ffi.register("answer", answer as extern "C" fn() -> i32).unwrap();
    svc.set_imports(["minus", "weigh", "is_neg", "answer"]);
    svc
}

#[test]
fn arguments_keep_push_order() {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, 1).load_imm(1, 2).load_imm(2, 3);
    b.push(0).push(1).push(2).call(1, 3, 3).ret(3);
    assert_eq!(service().interpret(b.as_slice()), Ok(123));

    let mut b = ProgramBuilder::new();
    b.load_imm(0, 50).load_imm(1, 8).push(0).push(1).call(0, 2, 2).ret(2);
    assert_eq!(service().interpret(b.as_slice()), Ok(42));
}

#[test]
fn calls_pop_their_arguments() {
    // la pile doit être vide après l'appel : le POP suivant fait faute
    let mut b = ProgramBuilder::new();
    b.load_imm(0, -5).push(0).call(2, 1, 1).pop(2).ret(1);
    let err = service().interpret(b.as_slice()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFault);
}

#[test]
fn return_values_are_widened() {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, -5).push(0).call(2, 1, 1).call(3, 0, 2).add(1, 2, 3).ret(3);
    let mut svc = service();
    let out = svc.execute(b.as_slice(), ExecMode::Auto).unwrap();
    assert_eq!(out.value, 43);
    assert_eq!(out.path, ExecPath::Interpreter);
    assert_eq!(svc.stats().ffi_calls, 2);
}

#[test]
fn arity_mismatch_is_reported() {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, 1).push(0).call(0, 1, 1).ret(1);
    let err = service().interpret(b.as_slice()).unwrap_err();
    assert!(matches!(err, EngineError::FfiSignatureMismatch { ref name, .. } if name == "minus"), "{err}");
}

#[test]
fn unknown_import_slot() {
    let mut b = ProgramBuilder::new();
    b.call(9, 0, 0).ret(0);
    assert_eq!(service().interpret(b.as_slice()), Err(EngineError::FfiNotFound("import #9".into())));
}

#[test]
fn direct_bridge_calls_are_counted() {
    let mut svc = service();
    let ffi = svc.ffi_mut();
    assert_eq!(ffi.call("minus", &[Value::I64(10), Value::I64(3)]), Ok(Value::I64(7)));
    assert_eq!(ffi.call("answer", &[]), Ok(Value::I32(42)));
    assert_eq!(ffi.get("minus").map(|f| f.calls()), Some(1));
    assert_eq!(ffi.total_calls(), 2);
    assert_eq!(
        ffi.get("is_neg").map(|f| f.signature().clone()),
        Some(Signature::new(&[FfiType::I64], FfiType::Bool))
    );
}

//! Scénarios de bout en bout.

use astc_core::{Arch, EngineError, ErrorKind, ProgramBuilder};
use astc_jit::{JitCompiler, SUPPORTED_ARCHES};
use astc_runtime::{ExecMode, ExecPath, Execution, ExecutionService};
use astc_tests::{scenario_a, SCENARIO_B};
use astc_vm::{Vm, VmState};
use pretty_assertions::assert_eq;

#[test]
fn scenario_a_interpreted() {
    let code = scenario_a();
    let mut vm = Vm::new();
    vm.load(&code).unwrap();
    assert_eq!(vm.run(), Ok(30));
    assert_eq!(vm.state(), VmState::Stopped);
}

#[test]
fn scenario_a_on_both_backends() {
    let code = scenario_a();
    let mut jit = JitCompiler::default();
    let x86 = jit.compile(&code, Arch::X86_64).unwrap();
    let a64 = jit.compile(&code, Arch::Aarch64).unwrap();
    assert_eq!(x86.len(), 22);
    assert_eq!(a64.len(), 36);
    for block in [&x86, &a64] {
        if block.arch().is_host() {
            assert_eq!(block.invoke(), Ok(30));
        } else {
            assert_eq!(block.invoke(), Err(EngineError::UnsupportedArchitecture(block.arch())));
        }
    }

    // recompilation : hit, aucun nouvel abaissement
    let again = jit.compile(&code, Arch::X86_64).unwrap();
    assert_eq!(again.bytes(), x86.bytes());
    let s = jit.stats();
    assert_eq!((s.compilations, s.cache_hits), (2, 1));
}

#[test]
fn scenario_a_through_the_service() {
    let mut svc = ExecutionService::with_defaults();
    let code = scenario_a();
    let interp = svc.execute(&code, ExecMode::Interpret).unwrap();
    assert_eq!(interp, Execution { value: 30, path: ExecPath::Interpreter });
    let auto = svc.execute(&code, ExecMode::Auto).unwrap();
    assert_eq!(auto.value, 30);
    let host_supported = Arch::host().is_some_and(|a| SUPPORTED_ARCHES.contains(&a));
    assert_eq!(auto.path == ExecPath::Jit, host_supported);
}

#[test]
fn scenario_b_stops_on_the_bad_opcode() {
    let mut vm = Vm::new();
    vm.load(&SCENARIO_B).unwrap();
    assert_eq!(vm.run(), Err(EngineError::UnknownOpcode { opcode: 0xEE, pc: 0 }));
    assert_eq!(vm.state(), VmState::Error);
    assert_eq!(vm.pc(), 0);

    // une VM fautive doit être remise à zéro avant un nouveau programme
    let code = scenario_a();
    assert_eq!(vm.load(&code).unwrap_err().kind(), ErrorKind::InvalidInput);
    vm.reset();
    vm.load(&code).unwrap();
    assert_eq!(vm.run(), Ok(30));
}

#[test]
fn scenario_b_after_valid_prefix() {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, 1).raw(&SCENARIO_B);
    let mut vm = Vm::new();
    vm.load(b.as_slice()).unwrap();
    assert_eq!(vm.run(), Err(EngineError::UnknownOpcode { opcode: 0xEE, pc: 10 }));
    assert_eq!(vm.pc(), 10);
    assert_eq!(vm.register(0), Some(1));

    let mut jit = JitCompiler::default();
    assert_eq!(
        jit.compile(b.as_slice(), Arch::X86_64).unwrap_err(),
        EngineError::UnknownOpcode { opcode: 0xEE, pc: 10 }
    );
    assert!(jit.cache().is_empty());
}

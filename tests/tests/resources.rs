//! Chaque région exécutable allouée est libérée une fois.

use astc_core::{Arch, ErrorKind};
use astc_jit::{JitCompiler, JitConfig};
use astc_runtime::{ExecMode, ExecutionService};
use astc_sys::{live_bytes, live_regions, ExecRegion, Prot};
use astc_tests::scenario_a;
use pretty_assertions::assert_eq;

#[test]
fn compile_release_cycles_return_to_baseline() {
    let base = (live_regions(), live_bytes());
    let mut jit = JitCompiler::default();
    for i in 0..32 {
        let arch = if i % 2 == 0 { Arch::X86_64 } else { Arch::Aarch64 };
        let block = jit.compile(&scenario_a(), arch).unwrap();
        assert_eq!(live_regions(), base.0 + 1);
        block.release().unwrap();
    }
    assert_eq!((live_regions(), live_bytes()), base);
}

#[test]
fn dropped_blocks_are_released() {
    let base = live_regions();
    let mut jit = JitCompiler::new(JitConfig { seal_code: true, ..JitConfig::default() });
    let blocks: Vec<_> = (0..8).map(|_| jit.compile(&scenario_a(), Arch::X86_64).unwrap()).collect();
    assert_eq!(live_regions(), base + 8);
    assert!(blocks.iter().all(|b| b.is_sealed()));
    drop(blocks);
    assert_eq!(live_regions(), base);
}

#[test]
fn failed_compilations_allocate_nothing() {
    let base = live_regions();
    let mut jit = JitCompiler::default();
    assert!(jit.compile_with_capacity(&scenario_a(), Arch::X86_64, 4).is_err());
    assert!(jit.compile(&[0xEE], Arch::X86_64).is_err());
    assert_eq!(jit.compile(&scenario_a(), Arch::Riscv64).unwrap_err().kind(), ErrorKind::UnsupportedArchitecture);
    assert_eq!(live_regions(), base);
}

#[test]
fn service_runs_leave_no_region_behind() {
    let base = live_regions();
    let mut svc = ExecutionService::with_defaults();
    for _ in 0..16 {
        assert_eq!(svc.execute(&scenario_a(), ExecMode::Auto).unwrap().value, 30);
    }
    assert_eq!(live_regions(), base);
}

#[test]
fn sealed_region_refuses_writes() {
    let mut r = ExecRegion::allocate(16).unwrap();
    r.write(0, &[0xC3]).unwrap();
    r.protect(Prot::RX).unwrap();
    assert!(r.write(0, &[0x90]).is_err());
    assert_eq!(r.bytes()[0], 0xC3);
    r.release().unwrap();
}

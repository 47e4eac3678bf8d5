//! Interpréteur et JIT hôte doivent rendre la même valeur.

use astc_core::Arch;
use astc_jit::{JitCompiler, JitConfig, SUPPORTED_ARCHES};
use astc_runtime::{ExecMode, ExecPath, ExecutionService};
use astc_tests::program;
use astc_vm::Vm;
use proptest::prelude::*;

fn host() -> Option<Arch> {
    Arch::host().filter(|a| SUPPORTED_ARCHES.contains(a))
}

fn interpret(code: &[u8]) -> i64 {
    let mut vm = Vm::new();
    vm.load(code).unwrap();
    vm.run().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn host_jit_matches_interpreter(code in program(6, 64)) {
        let Some(arch) = host() else { return Ok(()) };
        let mut jit = JitCompiler::new(JitConfig { initial_code_capacity: 64, ..JitConfig::default() });
        let block = jit.compile(&code, arch).unwrap();
        prop_assert_eq!(block.invoke().unwrap(), interpret(&code));
        block.release().unwrap();
    }

    #[test]
    fn auto_mode_agrees_with_interpret_mode(code in program(6, 32)) {
        let mut svc = ExecutionService::with_defaults();
        let auto = svc.execute(&code, ExecMode::Auto).unwrap();
        let interp = svc.execute(&code, ExecMode::Interpret).unwrap();
        prop_assert_eq!(auto.value, interp.value);
        if host().is_some() {
            prop_assert_eq!(auto.path, ExecPath::Jit);
        }
    }

    #[test]
    fn both_backends_accept_every_valid_program(code in program(6, 48)) {
        let mut jit = JitCompiler::default();
        for arch in SUPPORTED_ARCHES {
            let block = jit.compile(&code, arch).unwrap();
            prop_assert!(!block.is_empty());
        }
        prop_assert_eq!(jit.stats().compilations, 2);
    }
}

//! Cache de code sous collisions de hash forcées.

use astc_core::{Arch, ProgramBuilder};
use astc_jit::{CodeCache, JitCompiler, JitConfig};
use pretty_assertions::assert_eq;

fn same_bucket(_: &[u8]) -> u64 {
    0xDEAD_BEEF
}

fn exit_with(code: u8) -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    b.exit(code);
    b.finish()
}

#[test]
fn colliding_contents_never_share_code() {
    let mut jit = JitCompiler::with_cache(JitConfig::default(), CodeCache::with_hasher(64, same_bucket));
    let programs: Vec<Vec<u8>> = (0..16).map(exit_with).collect();
    let first: Vec<Vec<u8>> = programs.iter().map(|p| jit.compile(p, Arch::X86_64).unwrap().bytes().to_vec()).collect();
    let second: Vec<Vec<u8>> = programs.iter().map(|p| jit.compile(p, Arch::X86_64).unwrap().bytes().to_vec()).collect();
    assert_eq!(first, second);
    for (i, a) in first.iter().enumerate() {
        for b in &first[i + 1..] {
            assert_ne!(a, b);
        }
    }
    let s = jit.stats();
    assert_eq!((s.compilations, s.cache_hits), (16, 16));
    assert_eq!(jit.cache_stats().collisions, 15);
}

#[test]
fn eviction_under_collisions_keeps_lookups_exact() {
    let mut jit = JitCompiler::with_cache(JitConfig::default(), CodeCache::with_hasher(4, same_bucket));
    for round in 0..3 {
        for c in 0..8 {
            let code = exit_with(c);
            let block = jit.compile(&code, Arch::Aarch64).unwrap();
            // movz x0, #c
            let movz = 0xD280_0000_u32 | (u32::from(c) << 5);
            assert_eq!(&block.bytes()[8..12], &movz.to_le_bytes(), "round {round}");
        }
    }
    assert_eq!(jit.cache().len(), 4);
    assert!(jit.cache_stats().evictions >= 4);
}

#[test]
fn architectures_do_not_share_entries() {
    let mut jit = JitCompiler::default();
    let code = exit_with(9);
    let x = jit.compile(&code, Arch::X86_64).unwrap();
    let a = jit.compile(&code, Arch::Aarch64).unwrap();
    assert_ne!(x.bytes(), a.bytes());
    assert_eq!(jit.stats().cache_hits, 0);
    assert_eq!(jit.cache().len(), 2);
}

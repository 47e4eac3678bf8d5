//! astc-benches : charges synthétiques partagées par les benches.

use astc_core::ProgramBuilder;
use std::time::Duration;

pub fn env_usize(k: &str, d: usize) -> usize {
    std::env::var(k).ok().and_then(|s| s.parse().ok()).unwrap_or(d)
}

pub fn env_u64(k: &str, d: u64) -> u64 {
    std::env::var(k).ok().and_then(|s| s.parse().ok()).unwrap_or(d)
}

/// `CRIT_SAMPLES`, `CRIT_WARMUP_MS`, `CRIT_MEASURE_MS`.
pub fn timing(samples: usize) -> (usize, Duration, Duration) {
    (
        env_usize("CRIT_SAMPLES", samples),
        Duration::from_millis(env_u64("CRIT_WARMUP_MS", 300)),
        Duration::from_millis(env_u64("CRIT_MEASURE_MS", 1200)),
    )
}

/// Arithmétique en ligne droite : `n` blocs LOAD/ADD/SUB/PUSH/POP sur r0..r5.
pub fn straight_line(n: usize) -> Vec<u8> {
    let mut b = ProgramBuilder::new();
    b.load_imm(0, 0);
    for i in 0..n {
        let r = (i % 5) as u8 + 1;
        b.load_imm(r, i as i64).add(0, r, 0).push(0).sub(0, r, 0).pop(r).add(r, 0, 0);
    }
    b.ret(0);
    b.finish()
}

/// Programmes distincts de même taille (pour remplir le cache).
pub fn distinct(count: usize, n: usize) -> Vec<Vec<u8>> {
    (0..count)
        .map(|seed| {
            let mut b = ProgramBuilder::new();
            b.load_imm(0, seed as i64);
            for i in 0..n {
                b.load_imm(1, i as i64).add(0, 1, 0);
            }
            b.ret(0);
            b.finish()
        })
        .collect()
}

pub const SIZES: [usize; 4] = [8, 64, 512, 4096];

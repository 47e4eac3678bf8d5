//! Compilateur JIT : bytecode → bloc natif, via le cache de code.
//!
//! Ordre : validation de l'arch, sonde du cache, abaissement (une fois),
//! émission avec agrandissement du buffer, copie en région exécutable,
//! insertion en cache. Un échec n'insère rien.

use std::time::{Duration, Instant};

use astc_core::{Arch, EngineError, EngineResult};
use tracing::{debug, info_span, trace, warn};

use crate::{
    backend::{backend_for, emit_program, Backend},
    block::CodeBlock,
    cache::{CacheStats, CodeCache},
    lower::{lower, NativeOp},
};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct JitConfig {
    /// Entrées max du cache (0 : pas de cache).
    pub cache_capacity: usize,
    /// Taille initiale du buffer d'émission, doublée à chaque dépassement.
    pub initial_code_capacity: usize,
    pub max_code_capacity: usize,
    /// Retire le droit d'écriture des blocs après copie (W^X).
    pub seal_code: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            initial_code_capacity: 8 * 1024,
            max_code_capacity: 1 << 20,
            seal_code: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct JitStats {
    /// Programmes abaissés et émis (hors hits).
    pub compilations: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub buffer_growths: u64,
    pub bytes_emitted: u64,
    pub total_compile_time: Duration,
}

#[derive(Debug, Default)]
pub struct JitCompiler {
    config: JitConfig,
    cache: CodeCache,
    stats: JitStats,
}

impl JitCompiler {
    pub fn new(config: JitConfig) -> Self {
        let cache = CodeCache::with_capacity(config.cache_capacity);
        Self::with_cache(config, cache)
    }

    /// Compilateur sur un cache fourni (hasher injecté, capacité propre).
    pub fn with_cache(config: JitConfig, cache: CodeCache) -> Self {
        Self { config, cache, stats: JitStats::default() }
    }

    pub const fn config(&self) -> &JitConfig {
        &self.config
    }

    pub const fn stats(&self) -> JitStats {
        self.stats
    }

    pub const fn cache(&self) -> &CodeCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CodeCache {
        &mut self.cache
    }

    pub const fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Compile `code` pour `arch`, en agrandissant le buffer d'émission
    /// jusqu'à `max_code_capacity`.
    pub fn compile(&mut self, code: &[u8], arch: Arch) -> EngineResult<CodeBlock> {
        self.compile_inner(code, arch, None)
    }

    /// Compile dans un buffer fixe de `capacity` octets : `BufferOverflow`
    /// si le code natif n'y tient pas.
    pub fn compile_with_capacity(&mut self, code: &[u8], arch: Arch, capacity: usize) -> EngineResult<CodeBlock> {
        self.compile_inner(code, arch, Some(capacity))
    }

    fn compile_inner(&mut self, code: &[u8], arch: Arch, fixed: Option<usize>) -> EngineResult<CodeBlock> {
        let _span = info_span!(target: "astc::jit", "compile", %arch, len = code.len()).entered();
        if code.is_empty() {
            return Err(EngineError::invalid("buffer vide"));
        }
        let backend = backend_for(arch)?;
        let seal = self.config.seal_code;

        // un hit doit aussi respecter la capacité imposée
        if let Some(capacity) = fixed {
            if let Some(needed) = self.cache.peek(arch, code).map(<[u8]>::len).filter(|&n| n > capacity) {
                return Err(EngineError::BufferOverflow { needed, capacity });
            }
        }

        if let Some(native) = self.cache.lookup(arch, code) {
            self.stats.cache_hits += 1;
            trace!(target: "astc::jit", size = native.len(), "cache hit");
            return CodeBlock::from_code(native, arch, seal);
        }
        self.stats.cache_misses += 1;

        let started = Instant::now();
        let ops = lower(code, backend.register_count())?;
        let native = match fixed {
            Some(capacity) => emit_program(backend, &ops, capacity)?,
            None => self.emit_growing(backend, &ops)?,
        };
        let block = CodeBlock::from_code(&native, arch, seal)?;
        let elapsed = started.elapsed();

        self.cache.insert(arch, code, &native);
        self.stats.compilations += 1;
        self.stats.bytes_emitted += native.len() as u64;
        self.stats.total_compile_time += elapsed;
        debug!(
            target: "astc::jit",
            backend = backend.name(),
            ops = ops.len(),
            native = native.len(),
            micros = elapsed.as_micros() as u64,
            "compilé"
        );
        Ok(block)
    }

    fn emit_growing(&mut self, backend: &dyn Backend, ops: &[NativeOp]) -> EngineResult<Vec<u8>> {
        let max = self.config.max_code_capacity;
        let mut capacity = self.config.initial_code_capacity.clamp(1, max.max(1));
        loop {
            match emit_program(backend, ops, capacity) {
                Err(EngineError::BufferOverflow { needed, .. }) if capacity < max => {
                    let next = capacity.saturating_mul(2).max(needed).min(max);
                    trace!(target: "astc::jit", from = capacity, to = next, "agrandissement du buffer");
                    self.stats.buffer_growths += 1;
                    capacity = next;
                }
                Err(e @ EngineError::BufferOverflow { .. }) => {
                    warn!(target: "astc::jit", max, "code natif au-delà de max_code_capacity");
                    return Err(e);
                }
                other => return other,
            }
        }
    }
}

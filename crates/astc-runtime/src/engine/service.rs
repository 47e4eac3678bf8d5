//! Service d'exécution : interpréteur, JIT, ou JIT avec repli.

use core::fmt;

use astc_core::{Arch, EngineError, EngineResult};
use astc_jit::{CacheStats, CodeBlock, JitCompiler, JitStats};
use astc_vm::{HostCalls, Vm};
use smallvec::SmallVec;
use tracing::{debug, info, info_span};

use super::config::{EngineConfig, ExecMode};
use crate::ffi::{FfiBridge, Value, MAX_INT_PARAMS};

/// Chemin effectivement emprunté.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExecPath {
    Interpreter,
    Jit,
}

impl fmt::Display for ExecPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Interpreter => "interpréteur",
            Self::Jit => "jit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub value: i64,
    pub path: ExecPath,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EngineStats {
    pub interpreted_runs: u64,
    pub jit_runs: u64,
    /// Exécutions `Auto` reprises par l'interpréteur.
    pub fallbacks: u64,
    pub failures: u64,
    pub ffi_calls: u64,
    pub jit: JitStats,
    pub cache: CacheStats,
}

/// Table d'imports : `CALL #i` → fonction FFI `imports[i]`.
struct ImportHost<'a> {
    ffi: &'a mut FfiBridge,
    imports: &'a [String],
}

impl HostCalls for ImportHost<'_> {
    fn call_host(&mut self, import: u16, args: &[i64]) -> EngineResult<i64> {
        let name = self
            .imports
            .get(usize::from(import))
            .ok_or_else(|| EngineError::FfiNotFound(format!("import #{import}")))?;
        let params = &self.ffi.get(name).ok_or_else(|| EngineError::FfiNotFound(name.clone()))?.signature().params;
        if params.len() != args.len() {
            return Err(EngineError::FfiSignatureMismatch {
                name: name.clone(),
                reason: format!("arité : attendu {}, reçu {}", params.len(), args.len()),
            });
        }
        let values = params
            .iter()
            .zip(args)
            .map(|(&ty, &w)| Value::from_word(ty, w))
            .collect::<Result<SmallVec<[Value; MAX_INT_PARAMS]>, _>>()
            .map_err(|reason| EngineError::FfiSignatureMismatch { name: name.clone(), reason })?;
        Ok(self.ffi.call(name, &values)?.to_word())
    }
}

/// Contexte d'exécution : possède son compilateur, son cache, son pont FFI
/// et la mémoire exécutable de ses blocs.
#[derive(Debug)]
pub struct ExecutionService {
    config: EngineConfig,
    jit: JitCompiler,
    ffi: FfiBridge,
    imports: Vec<String>,
    stats: EngineStats,
}

impl Default for ExecutionService {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl ExecutionService {
    pub fn new(config: EngineConfig) -> Self {
        let jit = JitCompiler::new(config.jit.clone());
        Self { config, jit, ffi: FfiBridge::new(), imports: Vec::new(), stats: EngineStats::default() }
    }

    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn ffi(&self) -> &FfiBridge {
        &self.ffi
    }

    pub fn ffi_mut(&mut self) -> &mut FfiBridge {
        &mut self.ffi
    }

    pub const fn jit(&self) -> &JitCompiler {
        &self.jit
    }

    pub fn jit_mut(&mut self) -> &mut JitCompiler {
        &mut self.jit
    }

    /// Fixe la table d'imports de `CALL`.
    pub fn set_imports<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = names.into_iter().map(Into::into).collect();
    }

    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ffi_calls: self.ffi.total_calls(),
            jit: self.jit.stats(),
            cache: self.jit.cache_stats(),
            ..self.stats
        }
    }

    /// Interprète `code` ; les `CALL` passent par le pont FFI.
    pub fn interpret(&mut self, code: &[u8]) -> EngineResult<i64> {
        let mut vm = Vm::new();
        vm.set_step_limit(self.config.step_limit);
        let res = vm.load(code).and_then(|()| {
            let mut host = ImportHost { ffi: &mut self.ffi, imports: &self.imports };
            vm.run_with(&mut host)
        });
        match res {
            Ok(v) => {
                self.stats.interpreted_runs += 1;
                Ok(v)
            }
            Err(e) => {
                self.stats.failures += 1;
                Err(e)
            }
        }
    }

    /// Compile `code` pour `arch` (via le cache).
    pub fn compile(&mut self, code: &[u8], arch: Arch) -> EngineResult<CodeBlock> {
        self.jit.compile(code, arch)
    }

    fn run_jit(&mut self, code: &[u8]) -> EngineResult<i64> {
        let arch = self
            .config
            .target_arch()
            .ok_or_else(|| EngineError::invalid("architecture hôte non reconnue"))?;
        let block = self.jit.compile(code, arch)?;
        let value = block.invoke();
        block.release()?;
        value
    }

    /// Exécute `code` selon `mode`.
    pub fn execute(&mut self, code: &[u8], mode: ExecMode) -> EngineResult<Execution> {
        let _span = info_span!(target: "astc::engine", "execute", %mode, len = code.len()).entered();
        match mode {
            ExecMode::Interpret => self.interpret(code).map(|value| Execution { value, path: ExecPath::Interpreter }),
            ExecMode::Jit => match self.run_jit(code) {
                Ok(value) => {
                    self.stats.jit_runs += 1;
                    Ok(Execution { value, path: ExecPath::Jit })
                }
                Err(e) => {
                    self.stats.failures += 1;
                    Err(e)
                }
            },
            ExecMode::Auto => match self.run_jit(code) {
                Ok(value) => {
                    self.stats.jit_runs += 1;
                    Ok(Execution { value, path: ExecPath::Jit })
                }
                Err(e) if e.is_recoverable() && self.config.fallback_to_interpreter => {
                    info!(target: "astc::engine", error = %e, "repli sur l'interpréteur");
                    self.stats.fallbacks += 1;
                    self.interpret(code).map(|value| Execution { value, path: ExecPath::Interpreter })
                }
                Err(e) => {
                    debug!(target: "astc::engine", error = %e, "échec JIT sans repli");
                    self.stats.failures += 1;
                    Err(e)
                }
            },
        }
    }

    /// Exécute selon le mode configuré.
    pub fn run(&mut self, code: &[u8]) -> EngineResult<Execution> {
        self.execute(code, self.config.mode)
    }
}

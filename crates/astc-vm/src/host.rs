//! Sortie vers l'hôte pour l'opcode `CALL`.

use astc_core::{EngineError, EngineResult};

/// Résolution des imports appelés par `CALL`.
///
/// `args` est la tranche de pile consommée, premier argument en tête.
/// L'implémentation ne doit pas ré-entrer dans le moteur.
pub trait HostCalls {
    fn call_host(&mut self, import: u16, args: &[i64]) -> EngineResult<i64>;
}

/// Aucun import : tout `CALL` échoue en `FfiNotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHost;

impl HostCalls for NoHost {
    fn call_host(&mut self, import: u16, _args: &[i64]) -> EngineResult<i64> {
        Err(EngineError::FfiNotFound(format!("import #{import}")))
    }
}

impl<F> HostCalls for F
where
    F: FnMut(u16, &[i64]) -> EngineResult<i64>,
{
    fn call_host(&mut self, import: u16, args: &[i64]) -> EngineResult<i64> {
        self(import, args)
    }
}

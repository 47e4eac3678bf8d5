//! Configuration du service : défauts < JSON < variables `ASTC_*`.

use core::{fmt, str::FromStr};

use astc_core::{Arch, EngineError, EngineResult};
use astc_jit::JitConfig;

/// Chemin d'exécution demandé.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ExecMode {
    Interpret,
    Jit,
    /// JIT pour l'hôte, interpréteur si le JIT refuse le programme.
    #[default]
    Auto,
}

impl ExecMode {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Interpret => "interpret",
            Self::Jit => "jit",
            Self::Auto => "auto",
        }
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExecMode {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpret" | "interp" | "vm" => Ok(Self::Interpret),
            "jit" | "native" => Ok(Self::Jit),
            "auto" => Ok(Self::Auto),
            other => Err(EngineError::invalid(format!("mode inconnu `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    pub mode: ExecMode,
    /// Cible du JIT ; `None` : architecture hôte.
    pub arch: Option<Arch>,
    /// En `Auto`, repli sur l'interpréteur après une erreur récupérable du JIT.
    pub fallback_to_interpreter: bool,
    /// Budget d'instructions de l'interpréteur (`None` : illimité).
    pub step_limit: Option<u64>,
    pub jit: JitConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecMode::Auto,
            arch: None,
            fallback_to_interpreter: true,
            step_limit: None,
            jit: JitConfig::default(),
        }
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> EngineResult<T> {
    raw.trim().parse().map_err(|_| EngineError::invalid(format!("{key}={raw} : valeur invalide")))
}

fn parse_bool(key: &str, raw: &str) -> EngineResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(EngineError::invalid(format!("{key}={raw} : booléen attendu"))),
    }
}

impl EngineConfig {
    #[cfg(feature = "serde")]
    pub fn from_json(s: &str) -> EngineResult<Self> {
        serde_json::from_str(s).map_err(|e| EngineError::invalid(format!("config JSON : {e}")))
    }

    #[cfg(feature = "serde")]
    pub fn to_json_pretty(&self) -> EngineResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EngineError::invalid(e.to_string()))
    }

    /// Défauts surchargés par l'environnement du processus.
    pub fn from_env() -> EngineResult<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    /// Applique `ASTC_MODE`, `ASTC_ARCH`, `ASTC_CACHE_CAPACITY`,
    /// `ASTC_CODE_CAPACITY`, `ASTC_SEAL_CODE` et `ASTC_FALLBACK`.
    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) -> EngineResult<()> {
        if let Some(v) = get("ASTC_MODE") {
            self.mode = v.parse()?;
        }
        if let Some(v) = get("ASTC_ARCH") {
            self.arch = match v.trim() {
                "" | "host" => None,
                a => Some(a.parse()?),
            };
        }
        if let Some(v) = get("ASTC_CACHE_CAPACITY") {
            self.jit.cache_capacity = parse_env("ASTC_CACHE_CAPACITY", &v)?;
        }
        if let Some(v) = get("ASTC_CODE_CAPACITY") {
            self.jit.initial_code_capacity = parse_env("ASTC_CODE_CAPACITY", &v)?;
        }
        if let Some(v) = get("ASTC_SEAL_CODE") {
            self.jit.seal_code = parse_bool("ASTC_SEAL_CODE", &v)?;
        }
        if let Some(v) = get("ASTC_FALLBACK") {
            self.fallback_to_interpreter = parse_bool("ASTC_FALLBACK", &v)?;
        }
        Ok(())
    }

    /// Architecture effective du JIT.
    pub fn target_arch(&self) -> Option<Arch> {
        self.arch.or_else(Arch::host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn modes_parse() {
        assert_eq!("JIT".parse::<ExecMode>(), Ok(ExecMode::Jit));
        assert_eq!("interp".parse::<ExecMode>(), Ok(ExecMode::Interpret));
        assert!("turbo".parse::<ExecMode>().is_err());
        assert_eq!(ExecMode::default().to_string(), "auto");
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut cfg = EngineConfig::default();
        cfg.apply_env(env(&[
            ("ASTC_MODE", "interpret"),
            ("ASTC_ARCH", "arm64"),
            ("ASTC_CACHE_CAPACITY", "16"),
            ("ASTC_CODE_CAPACITY", "256"),
            ("ASTC_SEAL_CODE", "yes"),
            ("ASTC_FALLBACK", "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.mode, ExecMode::Interpret);
        assert_eq!(cfg.arch, Some(Arch::Aarch64));
        assert_eq!(cfg.jit.cache_capacity, 16);
        assert_eq!(cfg.jit.initial_code_capacity, 256);
        assert!(cfg.jit.seal_code);
        assert!(!cfg.fallback_to_interpreter);
    }

    #[test]
    fn bad_environment_values_are_invalid_input() {
        let mut cfg = EngineConfig::default();
        let err = cfg.apply_env(env(&[("ASTC_CACHE_CAPACITY", "beaucoup")])).unwrap_err();
        assert_eq!(err.kind(), astc_core::ErrorKind::InvalidInput);
        assert!(cfg.apply_env(env(&[("ASTC_SEAL_CODE", "peut-être")])).is_err());
        cfg.apply_env(env(&[("ASTC_ARCH", "host")])).unwrap();
        assert_eq!(cfg.arch, None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_layer() {
        let cfg = EngineConfig::from_json(r#"{ "mode": "jit", "arch": "x86_64", "jit": { "seal_code": true } }"#).unwrap();
        assert_eq!(cfg.mode, ExecMode::Jit);
        assert_eq!(cfg.arch, Some(Arch::X86_64));
        assert!(cfg.jit.seal_code);
        assert!(cfg.fallback_to_interpreter);
        assert_eq!(cfg.jit.cache_capacity, 1024);
        let back = EngineConfig::from_json(&cfg.to_json_pretty().unwrap()).unwrap();
        assert_eq!(back, cfg);
        assert!(EngineConfig::from_json("{ \"mode\": 3 }").is_err());
    }
}

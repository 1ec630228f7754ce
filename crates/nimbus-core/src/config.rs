//! Runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

use nimbus_script::{DEFAULT_MAX_CALL_DEPTH, Limits};

use crate::error::{Error, Result};

/// Default workspace directory, relative to the working directory.
pub const DEFAULT_WORKSPACE: &str = "./functions";

/// Default source file extension.
pub const DEFAULT_EXTENSION: &str = "ns";

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root of the function workspace. Must exist.
    pub workspace_path: PathBuf,

    /// Memoize module exports by logical name.
    /// Disable for hot-reload setups that want every resolve to re-run the module.
    pub module_cache_enabled: bool,

    /// Extension of function source files, without the dot.
    pub source_extension: String,

    /// Evaluation step budget per execution (`None` = unlimited).
    pub max_steps: Option<u64>,

    /// Maximum nested call depth.
    pub max_call_depth: usize,

    /// How long a resolve waits for another thread instantiating the same module.
    pub resolve_wait: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_path: PathBuf::from(DEFAULT_WORKSPACE),
            module_cache_enabled: true,
            source_extension: DEFAULT_EXTENSION.to_string(),
            max_steps: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            resolve_wait: Duration::from_secs(30),
        }
    }
}

impl RuntimeConfig {
    /// Configuration for the given workspace with default settings.
    pub fn new(workspace_path: impl Into<PathBuf>) -> Self {
        Self {
            workspace_path: workspace_path.into(),
            ..Self::default()
        }
    }

    /// Read configuration from the process environment.
    ///
    /// - `WORKSPACE_PATH`: workspace root (default `./functions`)
    /// - `DISABLE_MODULE_CACHE`: `true` disables module memoization
    /// - `NIMBUS_MAX_STEPS`: step budget per execution
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("WORKSPACE_PATH").filter(|p| !p.trim().is_empty()) {
            config.workspace_path = PathBuf::from(path);
        }

        if let Some(flag) = lookup("DISABLE_MODULE_CACHE") {
            config.module_cache_enabled = !flag.trim().eq_ignore_ascii_case("true");
        }

        if let Some(steps) = lookup("NIMBUS_MAX_STEPS") {
            let steps = steps.trim();
            if !steps.is_empty() {
                let parsed = steps.parse::<u64>().map_err(|_| {
                    Error::Config(format!("NIMBUS_MAX_STEPS must be a positive integer, got `{steps}`"))
                })?;
                config.max_steps = Some(parsed);
            }
        }

        Ok(config)
    }

    /// Interpreter limits for one execution.
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_call_depth: self.max_call_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.workspace_path, PathBuf::from("./functions"));
        assert!(config.module_cache_enabled);
        assert_eq!(config.source_extension, "ns");
        assert_eq!(config.max_steps, None);
        assert_eq!(config.max_call_depth, 128);
    }

    #[test]
    fn test_env_overrides() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("WORKSPACE_PATH", "/srv/functions"),
            ("DISABLE_MODULE_CACHE", "TRUE"),
            ("NIMBUS_MAX_STEPS", "5000"),
        ]))
        .unwrap();
        assert_eq!(config.workspace_path, PathBuf::from("/srv/functions"));
        assert!(!config.module_cache_enabled);
        assert_eq!(config.limits().max_steps, Some(5000));
    }

    #[test]
    fn test_cache_stays_on_for_other_values() {
        let config = RuntimeConfig::from_lookup(lookup(&[("DISABLE_MODULE_CACHE", "1")])).unwrap();
        assert!(config.module_cache_enabled);
    }

    #[test]
    fn test_invalid_step_budget() {
        let err = RuntimeConfig::from_lookup(lookup(&[("NIMBUS_MAX_STEPS", "lots")])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}

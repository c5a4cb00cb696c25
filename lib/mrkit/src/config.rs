use crate::constants::{
    DEFAULT_INITIAL_CAPACITY, ENV_ABORT_ON_FATAL, ENV_INITIAL_CAPACITY, ENV_NUM_MAPPERS,
    ENV_NUM_REDUCERS,
};
use crate::error::{EngineError, Result};
use crate::utils::is_truthy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What the engine does once a run hits an unrecoverable failure
/// (allocation, worker creation, worker panic, bad partition index).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FatalPolicy {
    /// Stop scheduling work and return the error from `run`.
    #[default]
    ReturnError,
    /// Log the error and terminate the process with a non-zero status.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub num_mappers: usize,
    /// Also the number of partitions: reduce worker `i` owns partition `i`.
    pub num_reducers: usize,
    pub initial_partition_capacity: usize,
    pub fatal_policy: FatalPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            num_mappers: cpus,
            num_reducers: cpus,
            initial_partition_capacity: DEFAULT_INITIAL_CAPACITY,
            fatal_policy: FatalPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(num_mappers: usize, num_reducers: usize) -> Self {
        Self { num_mappers, num_reducers, ..Self::default() }
    }

    /// Defaults overlaid with `MRKIT_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies overrides from `lookup`, keyed by the variable names in
    /// [`crate::constants`]. Unparseable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<usize>().ok());
        if let Some(n) = parse(ENV_NUM_MAPPERS) {
            self.num_mappers = n;
        }
        if let Some(n) = parse(ENV_NUM_REDUCERS) {
            self.num_reducers = n;
        }
        if let Some(n) = parse(ENV_INITIAL_CAPACITY) {
            self.initial_partition_capacity = n;
        }
        if let Some(v) = lookup(ENV_ABORT_ON_FATAL) {
            self.fatal_policy = if is_truthy(&v) { FatalPolicy::Abort } else { FatalPolicy::ReturnError };
        }
        self
    }

    /// Loads a JSON config file; missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&contents)?;
        Ok(config)
    }

    pub fn num_partitions(&self) -> usize {
        self.num_reducers
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_mappers == 0 {
            return Err(EngineError::InvalidConfig("num_mappers must be at least 1".into()));
        }
        if self.num_reducers == 0 {
            return Err(EngineError::InvalidConfig("num_reducers must be at least 1".into()));
        }
        if self.initial_partition_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "initial_partition_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_partition_capacity, DEFAULT_INITIAL_CAPACITY);
        assert_eq!(config.fatal_policy, FatalPolicy::ReturnError);
        assert_eq!(config.num_partitions(), config.num_reducers);
    }

    #[test]
    fn zero_workers_are_rejected() {
        assert!(matches!(EngineConfig::new(0, 1).validate(), Err(EngineError::InvalidConfig(_))));
        assert!(matches!(EngineConfig::new(1, 0).validate(), Err(EngineError::InvalidConfig(_))));
        let config = EngineConfig { initial_partition_capacity: 0, ..EngineConfig::new(1, 1) };
        assert!(config.validate().is_err());
    }

    #[test]
    fn overrides_replace_parsed_values_only() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_NUM_MAPPERS, "3"),
            (ENV_NUM_REDUCERS, "not-a-number"),
            (ENV_ABORT_ON_FATAL, "yes"),
        ]);
        let config = EngineConfig::new(8, 5)
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()));
        assert_eq!(config.num_mappers, 3);
        assert_eq!(config.num_reducers, 5);
        assert_eq!(config.fatal_policy, FatalPolicy::Abort);
    }

    #[test]
    fn load_fills_missing_fields_from_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"num_mappers": 2, "num_reducers": 4, "fatal_policy": "abort"}}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.num_mappers, 2);
        assert_eq!(config.num_reducers, 4);
        assert_eq!(config.fatal_policy, FatalPolicy::Abort);
        assert_eq!(config.initial_partition_capacity, DEFAULT_INITIAL_CAPACITY);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo { .. }));
    }
}

//! Engine configuration.
//!
//! Loaded from a JSON file with every field optional, then overridden from
//! the environment:
//!
//! - `HOSTRUN_DEADLINE_SECS` - orchestration deadline in seconds
//! - `HOSTRUN_SCRIPT_BUDGET_SECS` - script budget in seconds (`0` disables)

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::combine::CombineOptions;
use crate::dispatch::COMPLETION_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use crate::execute::{ConflictRules, RunnerConfig};

pub const DEADLINE_ENV: &str = "HOSTRUN_DEADLINE_SECS";
pub const SCRIPT_BUDGET_ENV: &str = "HOSTRUN_SCRIPT_BUDGET_SECS";

/// Default orchestration deadline.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(45);

/// Default number of history entries kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// How long a caller waits for the host before getting `TimedOut`.
    #[serde(with = "secs")]
    pub deadline: Duration,
    pub completion_capacity: usize,
    pub history_capacity: usize,
    pub transaction_name: String,
    /// Budget enforced at script checkpoints.
    #[serde(with = "opt_secs")]
    pub script_budget: Option<Duration>,
    pub combine: CombineOptions,
    pub conflict: ConflictRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            completion_capacity: COMPLETION_CHANNEL_CAPACITY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            transaction_name: RunnerConfig::default().transaction_name,
            script_budget: None,
            combine: CombineOptions::default(),
            conflict: ConflictRules::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, which maps variable names to values.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(DEADLINE_ENV) {
            self.deadline = parse_secs(DEADLINE_ENV, &value)?;
        }
        if let Some(value) = lookup(SCRIPT_BUDGET_ENV) {
            let budget = parse_secs(SCRIPT_BUDGET_ENV, &value)?;
            self.script_budget = (!budget.is_zero()).then_some(budget);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.deadline.is_zero() {
            return Err(Error::Config("deadline must be greater than zero".to_string()));
        }
        if self.completion_capacity == 0 {
            return Err(Error::Config(
                "completionCapacity must be greater than zero".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(Error::Config(
                "historyCapacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the host-side runner.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            transaction_name: self.transaction_name.clone(),
            script_budget: self.script_budget,
            conflict: self.conflict.clone(),
        }
    }
}

fn parse_secs(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            Error::Config(format!(
                "{} must be a non-negative number of seconds, got '{}'",
                name, value
            ))
        })
}

/// Durations as fractional seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

//! Environment-based configuration overrides.

use std::time::Duration;

use super::TimeoutConfig;

/// Environment configuration prefix.
pub const DEFAULT_PREFIX: &str = "VMM_HARNESS";

/// Reads `PREFIX_NAME` environment variables.
///
/// Recognised names: `EXPECT_TIMEOUT`, `SCENARIO_TIMEOUT` and `GRACE`
/// (seconds, fractional allowed).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Create a new environment config reader.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn var_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_uppercase()
        } else {
            format!("{}_{}", self.prefix, name.to_uppercase())
        }
    }

    /// Get a string value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        std::env::var(self.var_name(name)).ok()
    }

    /// Get a parsed value.
    #[must_use]
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|v| v.trim().parse().ok())
    }

    /// Get a boolean value (`1`, `true`, `yes`, `on`).
    #[must_use]
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
    }

    /// Get a duration given in seconds.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        self.parse::<f64>(name)
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64)
    }

    /// Overlay any timeout variables onto `timeouts`.
    #[must_use]
    pub fn apply(&self, mut timeouts: TimeoutConfig) -> TimeoutConfig {
        if let Some(t) = self.duration_secs("expect_timeout") {
            timeouts.expect = t;
        }
        if let Some(t) = self.duration_secs("scenario_timeout") {
            timeouts.scenario = t;
        }
        if let Some(t) = self.duration_secs("grace") {
            timeouts.grace = t;
        }
        timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_name_with_prefix() {
        let env = EnvConfig::default();
        assert_eq!(env.var_name("expect_timeout"), "VMM_HARNESS_EXPECT_TIMEOUT");
        assert_eq!(EnvConfig::new("").var_name("grace"), "GRACE");
    }

    #[test]
    fn missing_variables_leave_defaults() {
        let env = EnvConfig::new("VMM_EXPECT_TEST_UNSET_PREFIX");
        let timeouts = env.apply(TimeoutConfig::default());
        assert_eq!(timeouts, TimeoutConfig::default());
        assert_eq!(env.bool("anything"), None);
    }
}

//! Sampler configuration.
//!
//! Caps are read once at construction and passed in explicitly; nothing in
//! the sampler reads the process environment at call time.

use std::env;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplerConfig {
    /// Maximum samples kept per issue after stratification.
    pub per_issue_limit: usize,
    /// Pool fetch size is `per_issue_limit * fetch_multiplier`, floored at
    /// `MIN_FETCH_LIMIT`, so dedup has enough raw material to work with.
    pub fetch_multiplier: usize,
    /// Global budget across all issues in one corpus.
    pub global_limit: usize,
}

const MIN_FETCH_LIMIT: usize = 50;

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            per_issue_limit: 10,
            fetch_multiplier: 3,
            global_limit: 100,
        }
    }
}

impl SamplerConfig {
    /// Build from `FAULTLINE_SAMPLER_*` environment variables, falling back
    /// to defaults for anything unset or unparseable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            per_issue_limit: env_usize("FAULTLINE_SAMPLER_PER_ISSUE_LIMIT")
                .unwrap_or(defaults.per_issue_limit),
            fetch_multiplier: env_usize("FAULTLINE_SAMPLER_FETCH_MULTIPLIER")
                .unwrap_or(defaults.fetch_multiplier),
            global_limit: env_usize("FAULTLINE_SAMPLER_GLOBAL_LIMIT")
                .unwrap_or(defaults.global_limit),
        }
    }

    /// Rows fetched per issue, newest first.
    pub fn fetch_limit(&self) -> u64 {
        (self.per_issue_limit * self.fetch_multiplier).max(MIN_FETCH_LIMIT) as u64
    }
}

fn env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_limit_has_a_floor() {
        let config = SamplerConfig {
            per_issue_limit: 5,
            fetch_multiplier: 2,
            global_limit: 100,
        };
        assert_eq!(config.fetch_limit(), 50);

        let config = SamplerConfig {
            per_issue_limit: 40,
            fetch_multiplier: 3,
            global_limit: 100,
        };
        assert_eq!(config.fetch_limit(), 120);
    }

    #[test]
    fn test_defaults() {
        let config = SamplerConfig::default();
        assert_eq!(config.per_issue_limit, 10);
        assert_eq!(config.fetch_multiplier, 3);
        assert_eq!(config.global_limit, 100);
    }
}

//! Policy and deployment configuration, loaded from a TOML file named by
//! the `POWERD_CONFIG` environment variable or the `--config` CLI flag
//! (§6's "environment variables consumed").

use crate::error::{ControlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Registered agent name, e.g. `"monitor"` or `"frequency_balancer"`.
    pub agent: String,
    /// Tick period in seconds.
    pub period: f64,
    #[serde(default)]
    pub profile_name: String,
    /// Agent-specific policy vector sent down from the root.
    #[serde(default)]
    pub params: Vec<f64>,
    #[serde(default)]
    pub trace_path: Option<String>,
    #[serde(default)]
    pub report_path: Option<String>,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ControlError::Invalid(format!("config parse error: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Invalid(format!("failed to read config {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let config = Config::from_toml_str(
            r#"
            agent = "monitor"
            period = 0.005
            "#,
        )
        .unwrap();
        assert_eq!(config.agent, "monitor");
        assert!((config.period - 0.005).abs() < 1e-12);
        assert!(config.params.is_empty());
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml_str("not valid = = toml").is_err());
    }

    proptest::proptest! {
        #[test]
        fn config_round_trips_through_toml(
            agent in "[a-z_]{1,16}",
            period in 0.0f64..120.0,
            params in proptest::collection::vec(-1.0e6f64..1.0e6, 0..8),
        ) {
            let config = Config {
                agent,
                period,
                profile_name: String::new(),
                params,
                trace_path: None,
                report_path: None,
            };
            let text = toml::to_string(&config).unwrap();
            let parsed = Config::from_toml_str(&text).unwrap();
            proptest::prop_assert_eq!(&parsed.agent, &config.agent);
            proptest::prop_assert!((parsed.period - config.period).abs() < 1e-9);
            proptest::prop_assert_eq!(parsed.params.len(), config.params.len());
            for (a, b) in parsed.params.iter().zip(config.params.iter()) {
                proptest::prop_assert!((a - b).abs() < 1e-6);
            }
        }
    }
}

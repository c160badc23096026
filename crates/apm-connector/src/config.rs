// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;

use crate::errors::ConfigError;

pub const DEFAULT_APDEX_T: f64 = 0.5;

/// Configuration of the APM connector
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Apdex threshold T, in seconds
    pub apdex_t: f64,
    /// Whether to emit one instance count data point per resource and batch
    pub emit_instance_count: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apdex_t: DEFAULT_APDEX_T,
            emit_instance_count: true,
        }
    }
}

impl Config {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let apdex_t = match env::var("APM_APDEX_T") {
            Ok(val) => {
                let parsed = val
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| ConfigError::InvalidValue {
                        name: "APM_APDEX_T",
                        value: val.clone(),
                    })?;
                // An explicit zero means "not configured".
                if parsed == 0.0 {
                    DEFAULT_APDEX_T
                } else {
                    parsed
                }
            }
            Err(_) => DEFAULT_APDEX_T,
        };
        let emit_instance_count = match env::var("APM_EMIT_INSTANCE_COUNT") {
            Ok(val) => match val.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "APM_EMIT_INSTANCE_COUNT",
                        value: val,
                    })
                }
            },
            Err(_) => true,
        };

        let config = Self {
            apdex_t,
            emit_instance_count,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.apdex_t.is_finite() || self.apdex_t <= 0.0 {
            return Err(ConfigError::InvalidApdexThreshold(self.apdex_t));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        env::remove_var("APM_APDEX_T");
        env::remove_var("APM_EMIT_INSTANCE_COUNT");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_thresholds() {
        for apdex_t in [0.0, -0.5, f64::NAN, f64::INFINITY] {
            let config = Config {
                apdex_t,
                ..Default::default()
            };
            assert!(
                config.validate().is_err(),
                "Threshold {apdex_t} should be rejected"
            );
        }
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    #[serial]
    fn test_from_env_reads_values() {
        clear_env();
        env::set_var("APM_APDEX_T", "1.25");
        env::set_var("APM_EMIT_INSTANCE_COUNT", "FALSE");
        let config = Config::from_env().unwrap();
        assert_eq!(config.apdex_t, 1.25);
        assert!(!config.emit_instance_count);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_zero_threshold_uses_default() {
        clear_env();
        env::set_var("APM_APDEX_T", "0");
        assert_eq!(Config::from_env().unwrap().apdex_t, DEFAULT_APDEX_T);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_invalid_values() {
        clear_env();
        env::set_var("APM_APDEX_T", "fast");
        assert_eq!(
            Config::from_env().unwrap_err().to_string(),
            "Invalid value 'fast' for APM_APDEX_T"
        );

        env::set_var("APM_APDEX_T", "-2");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::InvalidApdexThreshold(_))
        ));

        clear_env();
        env::set_var("APM_EMIT_INSTANCE_COUNT", "sometimes");
        assert!(Config::from_env().is_err());
        clear_env();
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while loading the connector configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid Apdex threshold {0}: must be a finite number greater than 0")]
    InvalidApdexThreshold(f64),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConfigError::InvalidApdexThreshold(-1.0);
        assert_eq!(
            error.to_string(),
            "Invalid Apdex threshold -1: must be a finite number greater than 0"
        );

        let error = ConfigError::InvalidValue {
            name: "APM_APDEX_T",
            value: "fast".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid value 'fast' for APM_APDEX_T");
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::errors::ExportError;

pub const DEFAULT_ENDPOINT: &str = "https://staging-infra-api.newrelic.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration of the infrastructure events exporter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExporterConfig {
    pub license_key: String,
    /// Base URL; the bulk events path is appended to it
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            license_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl ExporterConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ExportError> {
        let license_key = env::var("NRIA_LICENSE_KEY").unwrap_or_default();
        let endpoint = env::var("NRIA_ENDPOINT")
            .ok()
            .map(|val| val.trim().trim_end_matches('/').to_string())
            .filter(|val| !val.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let timeout = match env::var("NRIA_EXPORT_TIMEOUT_SECS") {
            Ok(val) => val
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ExportError::InvalidValue {
                    name: "NRIA_EXPORT_TIMEOUT_SECS",
                    value: val.clone(),
                })?,
            Err(_) => DEFAULT_TIMEOUT,
        };

        let config = Self {
            license_key,
            endpoint,
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.license_key.trim().is_empty() {
            return Err(ExportError::MissingLicenseKey);
        }
        Ok(())
    }
}

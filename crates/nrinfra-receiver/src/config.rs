// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;

use crate::errors::ReceiverError;

pub const DEFAULT_AGENT_PATH: &str = "newrelic-infra";
pub const DEFAULT_AGENT_CONFIG_PATH: &str = "/etc/newrelic-infra.yml";

/// Configuration of the infrastructure agent receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Agent executable, resolved through `PATH` when not absolute
    pub agent_path: String,
    /// Passed to the agent as `--config`; empty to skip the check
    pub agent_config_path: PathBuf,
    pub enabled: bool,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            agent_path: DEFAULT_AGENT_PATH.to_string(),
            agent_config_path: PathBuf::from(DEFAULT_AGENT_CONFIG_PATH),
            enabled: false,
        }
    }
}

impl ReceiverConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ReceiverError> {
        let agent_path = env::var("NRIA_AGENT_PATH")
            .ok()
            .filter(|val| !val.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_PATH.to_string());
        let agent_config_path = env::var("NRIA_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_AGENT_CONFIG_PATH));
        let enabled = match env::var("NRIA_ENABLED") {
            Ok(val) => match val.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" | "" => false,
                _ => {
                    return Err(ReceiverError::InvalidValue {
                        name: "NRIA_ENABLED",
                        value: val,
                    })
                }
            },
            Err(_) => false,
        };

        Ok(Self {
            agent_path,
            agent_config_path,
            enabled,
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ReceiverError> {
        if !self.agent_config_path.as_os_str().is_empty() && !self.agent_config_path.exists() {
            return Err(ReceiverError::ConfigNotAccessible(
                self.agent_config_path.clone(),
            ));
        }
        Ok(())
    }
}

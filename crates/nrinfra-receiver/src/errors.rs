// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

/// Errors raised by the infrastructure agent receiver
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    #[error("Unable to access infrastructure agent config: {}", .0.display())]
    ConfigNotAccessible(PathBuf),

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to start infrastructure agent '{path}': {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Infrastructure agent stdout is not piped")]
    MissingStdout,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid agent output: {0}")]
    Parse(#[from] serde_json::Error),
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised while configuring the exporter or shipping samples
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("License key is mandatory")]
    MissingLicenseKey,

    #[error("Invalid value '{value}' for {name}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to serialize samples: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{status}: Failed to push samples: {body}")]
    Status { status: u16, body: String },
}

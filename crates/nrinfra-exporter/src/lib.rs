// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Exporter turning infrastructure gauges back into agent samples and
//! posting them to the bulk events endpoint.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod errors;
pub mod event_sender;
pub mod exporter;
pub mod sample_converter;

pub use config::ExporterConfig;
pub use exporter::InfraExporter;

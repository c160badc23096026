// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Receiver for the infrastructure agent's line-delimited JSON samples.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod agent_batch;
pub mod config;
pub mod errors;
pub mod metric_converter;
pub mod receiver;

pub use config::ReceiverConfig;
pub use receiver::InfraReceiver;

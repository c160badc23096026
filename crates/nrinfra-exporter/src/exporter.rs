// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use apm_pdata::consumer::{ConsumerError, MetricsConsumer};
use apm_pdata::metrics::MetricsBatch;
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::config::ExporterConfig;
use crate::errors::ExportError;
use crate::event_sender::EventSender;
use crate::sample_converter::convert_metrics;

/// Final pipeline stage shipping infrastructure gauges as agent samples.
pub struct InfraExporter {
    sender: EventSender,
}

impl InfraExporter {
    pub fn new(config: &ExporterConfig) -> Result<Self, ExportError> {
        config.validate()?;
        Ok(Self {
            sender: EventSender::new(config)?,
        })
    }

    pub fn start(&self) {
        info!("Starting the infra exporter, sending to {}", self.sender.url());
    }

    pub fn shutdown(&self) {
        info!("Stopping the infra exporter");
    }

    pub async fn export(&self, metrics: &MetricsBatch) -> Result<(), ExportError> {
        let samples = convert_metrics(metrics);
        if samples.is_empty() {
            debug!("No infrastructure samples in {} metrics", metrics.metric_count());
            return Ok(());
        }
        self.sender.send(&samples).await
    }
}

#[async_trait]
impl MetricsConsumer for InfraExporter {
    async fn consume_metrics(&self, metrics: MetricsBatch) -> Result<(), ConsumerError> {
        info!("Received {} metrics", metrics.metric_count());
        self.export(&metrics).await.map_err(|e| {
            error!("Failed to export infrastructure samples: {e}");
            ConsumerError::Delivery(e.to_string())
        })
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use crate::logs::LogsBatch;
use crate::metrics::MetricsBatch;

/// Errors a downstream stage can report when handed a batch.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("Failed to deliver batch: {0}")]
    Delivery(String),

    #[error("Consumer stopped")]
    Stopped,
}

/// The next stage of the pipeline, receiving finished metric batches.
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    async fn consume_metrics(&self, metrics: MetricsBatch) -> Result<(), ConsumerError>;
}

/// The next stage of the pipeline, receiving finished log batches.
#[async_trait]
pub trait LogsConsumer: Send + Sync {
    async fn consume_logs(&self, logs: LogsBatch) -> Result<(), ConsumerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = ConsumerError::Delivery("connection refused".to_string());
        assert_eq!(
            error.to_string(),
            "Failed to deliver batch: connection refused"
        );
        assert_eq!(ConsumerError::Stopped.to_string(), "Consumer stopped");
    }
}

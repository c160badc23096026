// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use async_trait::async_trait;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::Mutex as TokioMutex,
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use apm_connector::{ApmConnector, Config};
use apm_pdata::{
    consumer::{ConsumerError, LogsConsumer, MetricsConsumer},
    LogsBatch, MetricsBatch, TracesBatch,
};
use nrinfra_exporter::{ExporterConfig, InfraExporter};
use nrinfra_receiver::{InfraReceiver, ReceiverConfig};

/// Writes every batch as one JSON document per line.
struct JsonLinesConsumer<W> {
    writer: TokioMutex<W>,
}

impl<W> JsonLinesConsumer<W> {
    fn new(writer: W) -> Self {
        Self {
            writer: TokioMutex::new(writer),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W> JsonLinesConsumer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_line<T: serde::Serialize>(&self, batch: &T) -> Result<(), ConsumerError> {
        let mut line =
            serde_json::to_vec(batch).map_err(|e| ConsumerError::Delivery(e.to_string()))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer
            .write_all(&line)
            .await
            .map_err(|e| ConsumerError::Delivery(e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ConsumerError::Delivery(e.to_string()))
    }
}

#[async_trait]
impl<W> MetricsConsumer for JsonLinesConsumer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn consume_metrics(&self, metrics: MetricsBatch) -> Result<(), ConsumerError> {
        self.write_line(&metrics).await
    }
}

#[async_trait]
impl<W> LogsConsumer for JsonLinesConsumer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn consume_logs(&self, logs: LogsBatch) -> Result<(), ConsumerError> {
        self.write_line(&logs).await
    }
}

struct InfraPipeline {
    receiver: InfraReceiver,
    exporter: Arc<InfraExporter>,
    task: JoinHandle<()>,
}

impl InfraPipeline {
    async fn shutdown(self) {
        self.receiver.shutdown();
        if let Err(e) = self.task.await {
            error!("Infrastructure receiver task failed: {e}");
        }
        self.exporter.shutdown();
    }
}

#[tokio::main]
pub async fn main() {
    let log_level = env::var("APM_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_writer(std::io::stderr)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating APM connector config: {e}");
            std::process::exit(1);
        }
    };

    let infra = start_infra_pipeline();

    let stdout_consumer = Arc::new(JsonLinesConsumer::new(tokio::io::stdout()));
    let mut connector = ApmConnector::new(config, Some(stdout_consumer.clone()));
    if transaction_logs_enabled() {
        debug!("Writing transaction logs alongside metrics");
        connector = connector.with_logs_consumer(stdout_consumer);
    }
    connector.start();

    let lines = run_traces(BufReader::new(tokio::io::stdin()), &connector).await;
    info!("Reached end of input after {lines} lines");

    connector.shutdown();
    if let Some(infra) = infra {
        infra.shutdown().await;
    }
}

fn transaction_logs_enabled() -> bool {
    env::var("APM_EMIT_TRANSACTION_LOGS")
        .map(|val| matches!(val.trim().to_lowercase().as_str(), "true" | "1"))
        .unwrap_or(false)
}

/// Starts the agent receiver feeding the infra exporter when `NRIA_ENABLED`
/// is set. Any configuration or launch failure disables the pipeline.
fn start_infra_pipeline() -> Option<InfraPipeline> {
    let receiver_config = match ReceiverConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Error creating infrastructure receiver config: {e}");
            return None;
        }
    };
    if !receiver_config.enabled {
        debug!("Infrastructure agent receiver disabled");
        return None;
    }
    if let Err(e) = receiver_config.validate() {
        error!("Invalid infrastructure receiver config: {e}");
        return None;
    }

    let exporter = match ExporterConfig::from_env().and_then(|c| InfraExporter::new(&c)) {
        Ok(exporter) => Arc::new(exporter),
        Err(e) => {
            error!("Error creating infrastructure exporter: {e}");
            return None;
        }
    };
    exporter.start();

    let receiver = InfraReceiver::new(receiver_config, exporter.clone());
    match receiver.start() {
        Ok(task) => Some(InfraPipeline {
            receiver,
            exporter,
            task,
        }),
        Err(e) => {
            error!("Error starting infrastructure agent receiver: {e}");
            None
        }
    }
}

/// Feeds every line of `reader` to the connector as one trace batch.
/// Malformed lines are skipped. Returns the number of lines read.
async fn run_traces<R>(reader: R, connector: &ApmConnector) -> usize
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut count = 0;
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read trace input: {e}");
                break;
            }
        };
        count += 1;
        if line.trim().is_empty() {
            continue;
        }
        let traces: TracesBatch = match serde_json::from_str(&line) {
            Ok(traces) => traces,
            Err(e) => {
                warn!("Skipping malformed trace batch on line {count}: {e}");
                continue;
            }
        };
        // Delivery failures are already logged by the connector.
        let _ = connector.consume_traces(&traces).await;
    }
    count
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Runs the infrastructure agent as a child process and turns every line it
//! prints into a batch of gauge metrics for the next consumer.

use std::process::Stdio;
use std::sync::Arc;

use apm_pdata::consumer::MetricsConsumer;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::ReceiverConfig;
use crate::errors::ReceiverError;
use crate::metric_converter::convert_line;

/// Counters of one run of [`run_lines`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LineSummary {
    pub lines: usize,
    pub forwarded: usize,
}

pub struct InfraReceiver {
    config: ReceiverConfig,
    next: Arc<dyn MetricsConsumer>,
    cancel_token: CancellationToken,
}

impl InfraReceiver {
    pub fn new(config: ReceiverConfig, next: Arc<dyn MetricsConsumer>) -> Self {
        Self {
            config,
            next,
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Launches the agent and spawns the task reading its output. The task
    /// ends when the agent closes its stdout or the receiver is shut down.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<JoinHandle<()>, ReceiverError> {
        let mut child = self.spawn_agent()?;
        let stdout = child.stdout.take().ok_or(ReceiverError::MissingStdout)?;
        info!(
            "Started infrastructure agent '{}' with pid {:?}",
            self.config.agent_path,
            child.id()
        );

        let next = Arc::clone(&self.next);
        let cancel_token = self.cancel_token.clone();
        Ok(tokio::spawn(async move {
            match run_lines(BufReader::new(stdout), next.as_ref(), &cancel_token).await {
                Ok(summary) => debug!(
                    "Infrastructure agent output closed after {} lines, {} batches forwarded",
                    summary.lines, summary.forwarded
                ),
                Err(e) => error!("Failed to read infrastructure agent output: {e}"),
            }
            stop_agent(child, cancel_token.is_cancelled()).await;
        }))
    }

    pub fn shutdown(&self) {
        info!("Stopping the infrastructure agent receiver");
        self.cancel_token.cancel();
    }

    fn spawn_agent(&self) -> Result<Child, ReceiverError> {
        let mut command = Command::new(&self.config.agent_path);
        if !self.config.agent_config_path.as_os_str().is_empty() {
            command.arg("--config").arg(&self.config.agent_config_path);
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ReceiverError::Spawn {
                path: self.config.agent_path.clone(),
                source,
            })
    }
}

async fn stop_agent(mut child: Child, cancelled: bool) {
    if cancelled {
        if let Err(e) = child.kill().await {
            error!("Failed to stop infrastructure agent: {e}");
        }
        return;
    }
    match child.wait().await {
        Ok(status) if status.success() => debug!("Infrastructure agent exited"),
        Ok(status) => error!("Infrastructure agent exited with {status}"),
        Err(e) => error!("Failed to wait for infrastructure agent: {e}"),
    }
}

/// Converts every line of `reader` and forwards the non-empty batches to
/// `next` until EOF or cancellation. Delivery failures are logged and do not
/// stop the loop.
pub async fn run_lines<R>(
    reader: R,
    next: &dyn MetricsConsumer,
    cancel_token: &CancellationToken,
) -> Result<LineSummary, ReceiverError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = LineSummary::default();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel_token.cancelled() => {
                debug!("Infrastructure agent receiver cancelled");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        summary.lines += 1;
        if line.trim().is_empty() {
            continue;
        }

        let metrics = convert_line(line.as_bytes());
        if metrics.is_empty() {
            continue;
        }
        match next.consume_metrics(metrics).await {
            Ok(()) => summary.forwarded += 1,
            Err(e) => error!("Failed to forward infrastructure metrics: {e}"),
        }
    }

    Ok(summary)
}

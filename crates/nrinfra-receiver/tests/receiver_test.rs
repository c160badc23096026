// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use apm_pdata::consumer::{ConsumerError, MetricsConsumer};
use apm_pdata::metrics::MetricsBatch;
use apm_pdata::AttributeValue;
use async_trait::async_trait;
use nrinfra_receiver::metric_converter::{convert_line, ENTITY_ID, INFRA_METRIC_NAME};
use nrinfra_receiver::{InfraReceiver, ReceiverConfig};
use serial_test::serial;

fn host_batch_line() -> String {
    let path = concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/tests/testdata/agent_host_metrics_batch.json"
    );
    std::fs::read_to_string(path)
        .unwrap()
        .replace('\n', "")
}

#[test]
fn test_convert_real_batch() {
    let metrics = convert_line(host_batch_line().as_bytes());

    // 8 system, 3 network and 2 storage numeric fields
    assert_eq!(metrics.metric_count(), 13);
    assert_eq!(metrics.resource_metrics.len(), 1);
    assert_eq!(
        metrics.resource_metrics[0].resource.attributes.get(ENTITY_ID),
        Some(&AttributeValue::Int(7311195287430911000))
    );

    let rx = metrics
        .find_metrics("network.receiveBytesPerSecond")
        .next()
        .unwrap();
    let dp = &rx.gauge().unwrap().data_points[0];
    assert_eq!(dp.attributes.get_string("interfaceName").as_deref(), Some("eth0"));
    assert_eq!(
        dp.attributes.get_string(INFRA_METRIC_NAME).as_deref(),
        Some("receiveBytesPerSecond")
    );
    assert_eq!(metrics.find_metrics("storage.isReadOnly").count(), 0);
    assert_eq!(metrics.find_metrics("process.cpuPercent").count(), 0);
}

#[derive(Default)]
struct Recorder {
    batches: Mutex<Vec<MetricsBatch>>,
}

#[async_trait]
impl MetricsConsumer for Recorder {
    async fn consume_metrics(&self, metrics: MetricsBatch) -> Result<(), ConsumerError> {
        self.batches.lock().unwrap().push(metrics);
        Ok(())
    }
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_receiver_reads_agent_stdout() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let batch_path = dir.path().join("batch.json");
    std::fs::write(&batch_path, host_batch_line()).unwrap();
    let agent = dir.path().join("fake-agent");
    std::fs::write(
        &agent,
        format!(
            "#!/bin/sh\necho 'agent starting'\ncat '{}'\necho\n",
            batch_path.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&agent, std::fs::Permissions::from_mode(0o755)).unwrap();

    let recorder = Arc::new(Recorder::default());
    let receiver = InfraReceiver::new(
        ReceiverConfig {
            agent_path: agent.display().to_string(),
            agent_config_path: Default::default(),
            enabled: true,
        },
        recorder.clone(),
    );

    let task = receiver.start().unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(10), task)
        .await
        .unwrap()
        .unwrap();

    let batches = recorder.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].metric_count(), 13);
}

#[cfg(unix)]
#[tokio::test]
#[serial]
async fn test_shutdown_stops_a_silent_agent() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let agent = dir.path().join("silent-agent");
    std::fs::write(&agent, "#!/bin/sh\nexec sleep 30\n").unwrap();
    std::fs::set_permissions(&agent, std::fs::Permissions::from_mode(0o755)).unwrap();

    let receiver = InfraReceiver::new(
        ReceiverConfig {
            agent_path: agent.display().to_string(),
            agent_config_path: Default::default(),
            enabled: true,
        },
        Arc::new(Recorder::default()),
    );

    let task = receiver.start().unwrap();
    receiver.shutdown();
    tokio::time::timeout(std::time::Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}

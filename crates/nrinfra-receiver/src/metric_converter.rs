// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use apm_pdata::metrics::{
    Gauge, Metric, MetricData, MetricsBatch, NumberDataPoint, NumberValue, ResourceMetrics,
    ScopeMetrics,
};
use apm_pdata::trace::Resource;
use apm_pdata::AttributeMap;
use tracing::{debug, warn};

use crate::agent_batch::{extract_entities, Entity, RawEntity};
use crate::errors::ReceiverError;

/// Resource attribute carrying the entity id of an agent sample.
pub const ENTITY_ID: &str = "EntityId";
/// Data point attribute holding the event type the value was read from.
pub const INFRA_EVENT_TYPE: &str = "newrelic.infraEventType";
/// Data point attribute holding the field name the value was read from.
pub const INFRA_METRIC_NAME: &str = "newrelic.infraMetricName";

const SAMPLE_SUFFIX: &str = "Sample";
const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Converts one line of agent output. A line that is not a JSON array of
/// entities yields an empty batch.
pub fn convert_line(line: &[u8]) -> MetricsBatch {
    match parse_line(line) {
        Ok(raw) => convert_raw_entities(&raw),
        Err(e) => {
            warn!("Skipping agent output line: {e}");
            MetricsBatch::default()
        }
    }
}

pub fn parse_line(line: &[u8]) -> Result<Vec<RawEntity>, ReceiverError> {
    Ok(serde_json::from_slice(line)?)
}

pub fn convert_raw_entities(raw: &[RawEntity]) -> MetricsBatch {
    let entities = extract_entities(raw);
    debug!(
        "Kept {} of {} agent entities with valid events",
        entities.len(),
        raw.len()
    );
    convert_entities(&entities)
}

/// One resource per entity, one gauge per numeric field of each event.
pub fn convert_entities(entities: &[Entity]) -> MetricsBatch {
    let resource_metrics = entities
        .iter()
        .map(|entity| {
            let mut resource = AttributeMap::with_capacity(1);
            resource.insert(ENTITY_ID, entity.entity_id);

            let metrics = entity
                .events
                .iter()
                .flat_map(|event| {
                    let time_unix_nano = u64::try_from(event.timestamp)
                        .unwrap_or_default()
                        .saturating_mul(NANOS_PER_SECOND);
                    event.metrics.iter().map(move |(field, value)| {
                        let mut attributes = AttributeMap::with_capacity(event.attributes.len() + 2);
                        for (k, v) in &event.attributes {
                            attributes.put_str(k.as_str(), v.as_str());
                        }
                        attributes.put_str(INFRA_EVENT_TYPE, event.event_type.as_str());
                        attributes.put_str(INFRA_METRIC_NAME, field.as_str());
                        Metric {
                            name: create_metric_name(&event.event_type, field),
                            unit: String::new(),
                            data: MetricData::Gauge(Gauge {
                                data_points: vec![NumberDataPoint {
                                    attributes,
                                    start_time_unix_nano: time_unix_nano,
                                    time_unix_nano,
                                    value: NumberValue::Double(*value),
                                }],
                            }),
                        }
                    })
                })
                .collect();

            ResourceMetrics {
                resource: Resource::new(resource),
                scope_metrics: vec![ScopeMetrics {
                    scope: Default::default(),
                    metrics,
                }],
            }
        })
        .collect();

    MetricsBatch { resource_metrics }
}

/// `SystemSample` + `cpuPercent` gives `system.cpuPercent`.
pub fn create_metric_name(event_type: &str, field: &str) -> String {
    let prefix = event_type
        .strip_suffix(SAMPLE_SUFFIX)
        .unwrap_or(event_type)
        .to_lowercase();
    format!("{prefix}.{field}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use apm_pdata::AttributeValue;
    use tracing_test::traced_test;

    const ONE_EVENT: &str = r#"[{"EntityID": 123, "IsAgent": true, "Events": [{
        "eventType": "SystemSample", "timestamp": 1673362310, "entityKey": "key",
        "metric1": 1, "metric2": 2.5, "attribute": "value"
    }]}]"#;

    #[test]
    fn test_create_metric_name() {
        assert_eq!(create_metric_name("SystemSample", "cpuPercent"), "system.cpuPercent");
        assert_eq!(create_metric_name("NetworkSample", "rxBytes"), "network.rxBytes");
        assert_eq!(create_metric_name("ProcessInfo", "pid"), "processinfo.pid");
        assert_eq!(create_metric_name("Sample", "x"), ".x");
    }

    #[test]
    fn test_convert_one_event() {
        let batch = convert_line(ONE_EVENT.as_bytes());
        assert_eq!(batch.metric_count(), 2);
        assert_eq!(batch.resource_metrics.len(), 1);

        let resource = &batch.resource_metrics[0].resource.attributes;
        assert_eq!(resource.len(), 1);
        assert_eq!(resource.get(ENTITY_ID), Some(&AttributeValue::Int(123)));

        let metrics = &batch.resource_metrics[0].scope_metrics[0].metrics;
        assert_eq!(metrics[0].name, "system.metric1");
        assert_eq!(metrics[1].name, "system.metric2");

        let dp = &metrics[1].gauge().unwrap().data_points[0];
        assert_eq!(dp.value, NumberValue::Double(2.5));
        assert_eq!(dp.time_unix_nano, 1_673_362_310_000_000_000);
        assert_eq!(dp.attributes.len(), 3);
        assert_eq!(dp.attributes.get_string("attribute").as_deref(), Some("value"));
        assert_eq!(
            dp.attributes.get_string(INFRA_EVENT_TYPE).as_deref(),
            Some("SystemSample")
        );
        assert_eq!(
            dp.attributes.get_string(INFRA_METRIC_NAME).as_deref(),
            Some("metric2")
        );
    }

    #[test]
    #[traced_test]
    fn test_malformed_line_gives_empty_batch() {
        assert!(convert_line(b"starting agent...").is_empty());
        assert!(logs_contain("Skipping agent output line"));
        assert!(convert_line(br#"{"EntityID": 1}"#).is_empty());
    }

    #[test]
    fn test_event_without_numeric_fields_keeps_empty_resource() {
        let batch = convert_line(
            br#"[{"EntityID": 7, "Events": [{"eventType": "HostSample", "entityKey": "k", "timestamp": 1, "name": "x"}]}]"#,
        );
        assert_eq!(batch.resource_metrics.len(), 1);
        assert_eq!(batch.metric_count(), 0);
    }

    #[test]
    fn test_parse_line_reports_json_errors() {
        assert!(matches!(parse_line(b"[{"), Err(ReceiverError::Parse(_))));
    }
}

// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reassembles gauge data points into the per-entity samples the agent
//! originally reported.

use std::collections::BTreeMap;

use apm_pdata::metrics::{MetricsBatch, NumberDataPoint};
use apm_pdata::{AttributeMap, AttributeValue};
use serde_json::{Map, Value};

pub const ENTITY_ID: &str = "EntityId";
pub const INFRA_EVENT_TYPE: &str = "newrelic.infraEventType";
pub const INFRA_METRIC_NAME: &str = "newrelic.infraMetricName";

const EVENT_TYPE: &str = "eventType";
const TIMESTAMP: &str = "timestamp";
const NANOS_PER_SECOND: u64 = 1_000_000_000;

pub type Sample = Map<String, Value>;

/// Samples of one entity, keyed by their identifying attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntitySamples {
    pub entity_id: i64,
    pub samples: BTreeMap<String, Sample>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AllSamples {
    pub entity_samples: BTreeMap<i64, EntitySamples>,
}

impl AllSamples {
    pub fn is_empty(&self) -> bool {
        self.entity_samples.values().all(|e| e.samples.is_empty())
    }

    pub fn sample_count(&self) -> usize {
        self.entity_samples.values().map(|e| e.samples.len()).sum()
    }

    pub fn get_or_create(&mut self, entity_id: i64) -> &mut EntitySamples {
        self.entity_samples
            .entry(entity_id)
            .or_insert_with(|| EntitySamples {
                entity_id,
                samples: BTreeMap::new(),
            })
    }
}

impl EntitySamples {
    /// Folds one data point into the sample it belongs to. Points without
    /// the event type and metric name attributes are ignored.
    pub fn add_data_point(&mut self, resource: &AttributeMap, dp: &NumberDataPoint) {
        let Some(AttributeValue::Str(event_type)) = dp.attributes.get(INFRA_EVENT_TYPE) else {
            return;
        };
        let Some(metric_name) = dp.attributes.get_string(INFRA_METRIC_NAME) else {
            return;
        };

        let mut attributes = dp.attributes.clone();
        attributes.extend_from(resource);

        let key = identifying_key(event_type, dp.time_unix_nano, &attributes);
        let sample = self.samples.entry(key).or_default();
        sample.insert(
            TIMESTAMP.to_string(),
            Value::from(dp.time_unix_nano / NANOS_PER_SECOND),
        );
        sample.insert(EVENT_TYPE.to_string(), Value::from(event_type.as_str()));
        sample.insert(metric_name.into_owned(), Value::from(dp.value.as_f64()));

        for (key, value) in &attributes {
            if is_reserved(key) {
                continue;
            }
            sample.insert(key.clone(), to_json(value));
        }
    }
}

/// Groups the gauge data points of every resource carrying an integer
/// `EntityId` into samples.
pub fn convert_metrics(metrics: &MetricsBatch) -> AllSamples {
    let mut all = AllSamples::default();
    for rm in &metrics.resource_metrics {
        let resource = &rm.resource.attributes;
        let Some(entity_id) = resource.get(ENTITY_ID).and_then(AttributeValue::as_int) else {
            continue;
        };
        for metric in rm.scope_metrics.iter().flat_map(|sm| sm.metrics.iter()) {
            let Some(gauge) = metric.gauge() else {
                continue;
            };
            let entity = all.get_or_create(entity_id);
            for dp in &gauge.data_points {
                entity.add_data_point(resource, dp);
            }
        }
    }
    all
}

fn is_reserved(key: &str) -> bool {
    key == INFRA_EVENT_TYPE || key == INFRA_METRIC_NAME
}

/// `eventType|timestamp|k1|v1|...` over the sorted non-reserved keys. Double
/// values and empty strings do not take part.
fn identifying_key(event_type: &str, time_unix_nano: u64, attributes: &AttributeMap) -> String {
    let mut keys: Vec<&String> = attributes
        .iter()
        .map(|(k, _)| k)
        .filter(|k| !is_reserved(k))
        .collect();
    keys.sort_unstable();

    let mut parts = vec![event_type.to_string(), time_unix_nano.to_string()];
    for key in keys {
        let value = match attributes.get(key) {
            Some(AttributeValue::Str(s)) if !s.is_empty() => s.clone(),
            Some(AttributeValue::Int(i)) => i.to_string(),
            Some(AttributeValue::Bool(b)) => b.to_string(),
            _ => continue,
        };
        parts.push(key.clone());
        parts.push(value);
    }
    parts.join("|")
}

fn to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Str(s) => Value::from(s.as_str()),
        AttributeValue::Int(i) => Value::from(*i),
        AttributeValue::Double(d) => Value::from(*d),
        AttributeValue::Bool(b) => Value::from(*b),
    }
}

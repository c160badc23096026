// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire shape of one line of infrastructure agent output, and its
//! extraction into typed events.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const EVENT_TYPE: &str = "eventType";
pub const ENTITY_KEY: &str = "entityKey";
pub const TIMESTAMP: &str = "timestamp";

/// One entity as printed by the agent, events still untyped.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEntity {
    #[serde(rename = "EntityID", default)]
    pub entity_id: i64,
    #[serde(rename = "IsAgent", default)]
    pub is_agent: bool,
    #[serde(rename = "Events", default)]
    pub events: Vec<Map<String, Value>>,
}

/// A sample with its identifying fields pulled out. Numeric fields land in
/// `metrics`, string fields in `attributes`.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub event_type: String,
    pub entity_key: String,
    /// Unix seconds
    pub timestamp: i64,
    pub attributes: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub entity_id: i64,
    pub is_agent: bool,
    pub events: Vec<Event>,
}

impl Event {
    /// Returns `None` unless `eventType`, `entityKey` and `timestamp` are all
    /// present with the expected JSON type.
    pub fn from_raw(raw: &Map<String, Value>) -> Option<Self> {
        let event_type = raw.get(EVENT_TYPE)?.as_str()?;
        let entity_key = raw.get(ENTITY_KEY)?.as_str()?;
        let timestamp = raw.get(TIMESTAMP)?.as_f64()?;

        let mut attributes = BTreeMap::new();
        let mut metrics = BTreeMap::new();
        for (key, value) in raw {
            if matches!(key.as_str(), EVENT_TYPE | ENTITY_KEY | TIMESTAMP) {
                continue;
            }
            match value {
                Value::Number(n) => {
                    if let Some(v) = n.as_f64() {
                        metrics.insert(key.clone(), v);
                    }
                }
                Value::String(s) => {
                    attributes.insert(key.clone(), s.clone());
                }
                _ => {}
            }
        }

        Some(Self {
            event_type: event_type.to_string(),
            entity_key: entity_key.to_string(),
            #[allow(clippy::cast_possible_truncation)]
            timestamp: timestamp as i64,
            attributes,
            metrics,
        })
    }
}

/// Keeps the valid events of every entity; entities left without any are
/// dropped.
pub fn extract_entities(raw_entities: &[RawEntity]) -> Vec<Entity> {
    raw_entities
        .iter()
        .filter_map(|raw| {
            let events: Vec<Event> = raw.events.iter().filter_map(Event::from_raw).collect();
            (!events.is_empty()).then(|| Entity {
                entity_id: raw.entity_id,
                is_agent: raw.is_agent,
                events,
            })
        })
        .collect()
}

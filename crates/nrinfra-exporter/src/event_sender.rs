// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ExporterConfig;
use crate::errors::ExportError;
use crate::sample_converter::{AllSamples, Sample};

pub const BULK_EVENTS_PATH: &str = "/infra/v2/metrics/events/bulk";
pub const LICENSE_KEY_HEADER: &str = "X-License-Key";

/// Body item of the bulk events endpoint, one per entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPost {
    #[serde(rename = "ExternalKeys", skip_serializing_if = "Vec::is_empty")]
    pub external_keys: Vec<String>,
    #[serde(rename = "EntityID", skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<i64>,
    #[serde(rename = "IsAgent")]
    pub is_agent: bool,
    #[serde(rename = "Events")]
    pub events: Vec<Sample>,
    #[serde(rename = "ReportingAgentID", skip_serializing_if = "Option::is_none")]
    pub reporting_agent_id: Option<i64>,
}

impl MetricPost {
    /// One post per entity that has at least one sample.
    pub fn from_samples(samples: &AllSamples) -> Vec<Self> {
        samples
            .entity_samples
            .values()
            .filter(|entity| !entity.samples.is_empty())
            .map(|entity| Self {
                external_keys: Vec::new(),
                entity_id: Some(entity.entity_id),
                is_agent: false,
                events: entity.samples.values().cloned().collect(),
                reporting_agent_id: None,
            })
            .collect()
    }
}

pub struct EventSender {
    client: reqwest::Client,
    url: String,
    license_key: String,
}

impl EventSender {
    pub fn new(config: &ExporterConfig) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            url: format!("{}{BULK_EVENTS_PATH}", config.endpoint.trim_end_matches('/')),
            license_key: config.license_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts every entity's samples in a single request. Nothing is sent when
    /// there is no sample.
    pub async fn send(&self, samples: &AllSamples) -> Result<(), ExportError> {
        let posts = MetricPost::from_samples(samples);
        if posts.is_empty() {
            debug!("No infrastructure samples to send");
            return Ok(());
        }
        let body = serde_json::to_vec(&posts)?;

        let time = std::time::Instant::now();
        let resp = self
            .client
            .post(&self.url)
            .header(LICENSE_KEY_HEADER, &self.license_key)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let elapsed = time.elapsed();

        let status = resp.status();
        if status.is_success() {
            debug!(
                "Sent {} samples for {} entities in {} ms",
                samples.sample_count(),
                posts.len(),
                elapsed.as_millis()
            );
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        warn!("{status}: Failed to push infrastructure samples: {body:?}");
        Err(ExportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_converter::EntitySamples;
    use serde_json::json;

    #[test]
    fn test_metric_post_omits_empty_optionals() {
        let post = MetricPost {
            external_keys: vec![],
            entity_id: None,
            is_agent: true,
            events: vec![],
            reporting_agent_id: None,
        };
        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            json!({"IsAgent": true, "Events": []})
        );

        let post = MetricPost {
            external_keys: vec!["host-1".to_string()],
            entity_id: Some(9),
            reporting_agent_id: Some(1),
            ..post
        };
        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            json!({
                "ExternalKeys": ["host-1"],
                "EntityID": 9,
                "IsAgent": true,
                "Events": [],
                "ReportingAgentID": 1
            })
        );
    }

    #[test]
    fn test_posts_skip_entities_without_samples() {
        let mut samples = AllSamples::default();
        samples.get_or_create(1);
        let entity: &mut EntitySamples = samples.get_or_create(2);
        let mut sample = Sample::new();
        sample.insert("eventType".to_string(), json!("SystemSample"));
        entity.samples.insert("key".to_string(), sample);

        let posts = MetricPost::from_samples(&samples);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].entity_id, Some(2));
        assert_eq!(posts[0].events.len(), 1);
    }

    #[test]
    fn test_url_joins_endpoint_and_path() {
        let sender = EventSender::new(&ExporterConfig {
            license_key: "key".to_string(),
            endpoint: "http://localhost:1234/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            sender.url(),
            "http://localhost:1234/infra/v2/metrics/events/bulk"
        );
    }
}

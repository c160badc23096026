// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use apm_pdata::AttributeMap;

/// Resource attributes that survive into the emitted metrics.
pub const ALLOWED_RESOURCE_ATTRIBUTES: [&str; 12] = [
    "os.description",
    "telemetry.auto.version",
    "telemetry.sdk.language",
    "host.name",
    "os.type",
    "telemetry.sdk.name",
    "process.runtime.description",
    "process.runtime.version",
    "telemetry.sdk.version",
    "host.arch",
    "service.name",
    "service.instance.id",
];

pub const HOST_NAME: &str = "host.name";
pub const HOST: &str = "host";
pub const SERVICE_INSTANCE_ID: &str = "service.instance.id";

/// Projects resource attributes onto the allow-list.
///
/// When `host.name` is present its value is also copied to `host`, and used as
/// `service.instance.id` if the input carries none.
#[derive(Clone, Debug, Default)]
pub struct AttributeFilter;

impl AttributeFilter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn filter(&self, from: &AttributeMap) -> AttributeMap {
        let mut filtered = AttributeMap::with_capacity(ALLOWED_RESOURCE_ATTRIBUTES.len() + 1);
        for key in ALLOWED_RESOURCE_ATTRIBUTES {
            if let Some(value) = from.get(key) {
                filtered.insert(key, value.clone());
            }
        }

        if let Some(host_name) = from.get_string(HOST_NAME) {
            let host_name = host_name.into_owned();
            if !filtered.contains_key(SERVICE_INSTANCE_ID) {
                filtered.put_str(SERVICE_INSTANCE_ID, host_name.clone());
            }
            filtered.put_str(HOST, host_name);
        }
        filtered
    }
}

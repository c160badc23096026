// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed attribute maps attached to resources, scopes, spans and data points.

use std::borrow::Cow;
use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A scalar attribute value.
///
/// Deserializes untagged from JSON: strings become [`AttributeValue::Str`],
/// integers [`AttributeValue::Int`], any other number
/// [`AttributeValue::Double`] and booleans [`AttributeValue::Bool`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Str(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl AttributeValue {
    /// Best-effort textual form of the value. Never fails, whatever the type.
    pub fn as_string(&self) -> Cow<'_, str> {
        match self {
            Self::Str(s) => Cow::Borrowed(s),
            Self::Int(i) => Cow::Owned(i.to_string()),
            Self::Double(d) => Cow::Owned(d.to_string()),
            Self::Bool(b) => Cow::Owned(b.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Any JSON value found under an attribute key.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAttributeValue {
    Scalar(AttributeValue),
    Other(serde_json::Value),
}

impl RawAttributeValue {
    /// Scalars are kept as is, arrays and objects as their JSON text. Null
    /// carries nothing and is dropped.
    fn into_value(self) -> Option<AttributeValue> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::Other(serde_json::Value::Null) => None,
            Self::Other(other) => Some(AttributeValue::Str(other.to_string())),
        }
    }
}

/// String-keyed map of [`AttributeValue`]s. Insertion order carries no
/// meaning: two maps holding the same pairs compare equal.
///
/// Deserialization never fails on a single value. Arrays and objects are
/// kept as their JSON text, null values are dropped and a null map reads as
/// an empty one.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AttributeMap {
    values: HashMap<String, AttributeValue>,
}

impl<'de> Deserialize<'de> for AttributeMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<HashMap<String, RawAttributeValue>>::deserialize(deserializer)?;
        Ok(raw
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| value.into_value().map(|value| (key, value)))
            .collect())
    }
}

impl AttributeMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: HashMap::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the best-effort string form of the value under `key`.
    pub fn get_string(&self, key: &str) -> Option<Cow<'_, str>> {
        self.values.get(key).map(AttributeValue::as_string)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn put_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values
            .insert(key.into(), AttributeValue::Str(value.into()));
    }

    pub fn remove(&mut self, key: &str) -> Option<AttributeValue> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.values.iter()
    }

    /// Copies every pair of `other` into `self`, overwriting existing keys.
    pub fn extend_from(&mut self, other: &AttributeMap) {
        for (key, value) in other.iter() {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for AttributeMap
where
    K: Into<String>,
    V: Into<AttributeValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = (&'a String, &'a AttributeValue);
    type IntoIter = hashbrown::hash_map::Iter<'a, String, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;

/// A user statistic attached at the tree root.
///
/// Modeled as a tagged union over the four shapes the renderer knows how
/// to emit. Serializes untagged, so a stat renders as the bare JSON value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl StatValue {
    /// Name of the stored variant, used in type-mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            StatValue::Bool(_) => "bool",
            StatValue::Int(_) => "int",
            StatValue::Float(_) => "float",
            StatValue::Str(_) => "string",
        }
    }
}

impl From<bool> for StatValue {
    fn from(value: bool) -> Self {
        StatValue::Bool(value)
    }
}

impl From<i64> for StatValue {
    fn from(value: i64) -> Self {
        StatValue::Int(value)
    }
}

impl From<f64> for StatValue {
    fn from(value: f64) -> Self {
        StatValue::Float(value)
    }
}

impl From<String> for StatValue {
    fn from(value: String) -> Self {
        StatValue::Str(value)
    }
}

impl From<&str> for StatValue {
    fn from(value: &str) -> Self {
        StatValue::Str(value.to_owned())
    }
}

impl From<&StatValue> for serde_json::Value {
    fn from(value: &StatValue) -> Self {
        match value {
            StatValue::Bool(b) => serde_json::Value::from(*b),
            StatValue::Int(i) => serde_json::Value::from(*i),
            StatValue::Float(f) => serde_json::Value::from(*f),
            StatValue::Str(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

/// Types that can be read back out of a [`StatValue`], driving the typed
/// `get_stat` accessor on the tree.
pub trait StatType: Sized {
    const KIND: &'static str;

    fn from_value(value: &StatValue) -> Option<Self>;
}

impl StatType for bool {
    const KIND: &'static str = "bool";

    fn from_value(value: &StatValue) -> Option<Self> {
        match value {
            StatValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl StatType for i64 {
    const KIND: &'static str = "int";

    fn from_value(value: &StatValue) -> Option<Self> {
        match value {
            StatValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl StatType for f64 {
    const KIND: &'static str = "float";

    fn from_value(value: &StatValue) -> Option<Self> {
        match value {
            StatValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl StatType for String {
    const KIND: &'static str = "string";

    fn from_value(value: &StatValue) -> Option<Self> {
        match value {
            StatValue::Str(s) => Some(s.clone()),
            _ => None,
        }
    }
}

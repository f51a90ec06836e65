// MIT License - Copyright (c) 2026 Peter Wright
// Message types and event parameters

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Dc09Error, Result};

/// DC09 payload type carried in the block's ID field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// SIA DC03 payload (`"SIA-DCS"`), two-letter event codes.
    #[serde(rename = "SIA-DCS")]
    SiaDcs,
    /// Contact ID payload (`"ADM-CID"`), three-digit event codes.
    #[serde(rename = "ADM-CID")]
    AdmCid,
}

impl MessageType {
    /// The DC09 ID token for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SiaDcs => "SIA-DCS",
            Self::AdmCid => "ADM-CID",
        }
    }

    /// Resolve a caller tag. Accepts the short forms `SIA` and `CID`.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "SIA" | "SIA-DCS" => Some(Self::SiaDcs),
            "CID" | "ADM-CID" => Some(Self::AdmCid),
            _ => None,
        }
    }

    /// Infer the type from an event code's length: 3 characters is Contact ID,
    /// 2 characters is SIA.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.chars().count() {
            3 => Some(Self::AdmCid),
            2 => Some(Self::SiaDcs),
            _ => None,
        }
    }

    /// Determine the type of a templated message. An explicit `type` field
    /// wins; otherwise the `code` length decides.
    pub fn infer(params: &EventParams) -> Option<Self> {
        match params.get_text("type") {
            Some(tag) => Self::from_tag(&tag),
            None => params.get_text("code").and_then(|c| Self::from_code(&c)),
        }
    }
}

impl FromStr for MessageType {
    type Err = Dc09Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_tag(s).ok_or_else(|| Dc09Error::UnknownMessageType(s.to_string()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open key/value mapping describing one event (code, zone, area, ...).
///
/// Values are JSON values so templates can come straight from TOML or JSON
/// configuration. Numbers and strings are interchangeable for lookups through
/// [`get_text`](Self::get_text).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventParams(Map<String, Value>);

impl EventParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Value rendered as text. Strings are returned as-is, numbers and booleans
    /// in their display form; other values yield `None`.
    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Value as an unsigned integer, accepting numeric strings.
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for EventParams {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for EventParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

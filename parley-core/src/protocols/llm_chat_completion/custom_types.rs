//! Structured values carried by completion messages.

use std::collections::BTreeMap;
use std::fmt;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value as Json};

use crate::error::ValidationError;

/// Reason a completion request failed.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    prost::Enumeration,
)]
#[repr(i32)]
pub enum ErrorCode {
    UnsupportedProtocol = 0,
    OpenaiError = 1,
    OtherException = 2,
}

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Developer,
    System,
    User,
    Assistant,
    Tool,
    Function,
}

impl ChatRole {
    pub const ALL: &'static [ChatRole] = &[
        Self::Developer,
        Self::System,
        Self::User,
        Self::Assistant,
        Self::Tool,
        Self::Function,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Developer => "developer",
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
            Self::Function => "function",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.as_str() == name)
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One role-tagged turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub content: String,
    pub role: ChatRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatTurn {
    /// Create a new unnamed turn.
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            role,
            name: None,
        }
    }

    /// Set the participant name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Scalar keyword-argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Primitive {
    /// JSON rendering; bytes become base64 strings.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Bool(b) => Json::Bool(*b),
            Self::Int(i) => Json::Number((*i).into()),
            Self::Float(f) => Number::from_f64(*f).map_or(Json::Null, Json::Number),
            Self::Str(s) => Json::String(s.clone()),
            Self::Bytes(b) => Json::String(base64::engine::general_purpose::STANDARD.encode(b)),
        }
    }

    fn from_json(key: &str, value: &Json) -> Result<Self, ValidationError> {
        match value {
            Json::Bool(b) => Ok(Self::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Self::Int(i)),
                None => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| invalid(key, "number out of range")),
            },
            Json::String(s) => Ok(Self::Str(s.clone())),
            Json::Null => Err(invalid(key, "null is not a keyword argument value")),
            Json::Array(_) | Json::Object(_) => Err(invalid(key, "expected a primitive value")),
        }
    }
}

/// Keyword-argument value: a primitive, a flat sequence, or a nested mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum KwargValue {
    Primitive(Primitive),
    Sequence(Vec<Primitive>),
    Mapping(Kwargs),
}

impl KwargValue {
    pub fn to_json(&self) -> Json {
        match self {
            Self::Primitive(p) => p.to_json(),
            Self::Sequence(items) => Json::Array(items.iter().map(Primitive::to_json).collect()),
            Self::Mapping(kwargs) => kwargs.to_json(),
        }
    }
}

impl From<Primitive> for KwargValue {
    fn from(value: Primitive) -> Self {
        Self::Primitive(value)
    }
}

impl From<Kwargs> for KwargValue {
    fn from(value: Kwargs) -> Self {
        Self::Mapping(value)
    }
}

/// Free-form keyword arguments forwarded to the completion backend.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Kwargs(BTreeMap<String, KwargValue>);

impl Kwargs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an argument, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<KwargValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<KwargValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&KwargValue> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &KwargValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// JSON object rendering.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<Map<String, Json>>(),
        )
    }

    /// Build from a JSON object.
    ///
    /// Arrays must hold primitives only; objects nest.
    pub fn from_json(object: &Map<String, Json>) -> Result<Self, ValidationError> {
        let mut kwargs = Self::new();
        for (key, value) in object {
            let value = match value {
                Json::Array(items) => KwargValue::Sequence(
                    items
                        .iter()
                        .map(|item| Primitive::from_json(key, item))
                        .collect::<Result<_, _>>()?,
                ),
                Json::Object(nested) => KwargValue::Mapping(Self::from_json(nested)?),
                other => KwargValue::Primitive(Primitive::from_json(key, other)?),
            };
            kwargs.insert(key.clone(), value);
        }
        Ok(kwargs)
    }
}

impl FromIterator<(String, KwargValue)> for Kwargs {
    fn from_iter<I: IntoIterator<Item = (String, KwargValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

fn invalid(key: &str, reason: &str) -> ValidationError {
    ValidationError::InvalidValue {
        field: format!("kwargs.{}", key),
        reason: reason.to_string(),
    }
}

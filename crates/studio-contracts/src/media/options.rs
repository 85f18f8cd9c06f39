use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A boolean tool option that may arrive as a native bool or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum BoolOption {
    Flag(bool),
    Text(String),
}

impl BoolOption {
    /// `"true"` (any case) and `"1"` are truthy; every other string is falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Flag(value) => *value,
            Self::Text(raw) => raw.eq_ignore_ascii_case("true") || raw == "1",
        }
    }
}

impl From<bool> for BoolOption {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

pub fn resolve_bool(value: Option<&BoolOption>, default: bool) -> bool {
    value.map(BoolOption::as_bool).unwrap_or(default)
}

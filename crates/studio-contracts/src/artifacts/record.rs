use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::media::MediaKind;

/// Sidecar stored next to every artifact file as `{id}.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRecord {
    pub id: String,
    pub created_at: String,
    pub prompt: String,
    pub mime_type: String,
    pub size: u64,
    pub filepath: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
}

impl ArtifactRecord {
    pub fn resource_uri(&self, kind: MediaKind) -> String {
        kind.resource_uri(&self.id)
    }

    /// The record as a JSON object, with its locator added.
    pub fn to_payload(&self, kind: MediaKind) -> Map<String, Value> {
        let mut payload = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        payload.insert(
            "resourceUri".to_string(),
            Value::String(self.resource_uri(kind)),
        );
        payload
    }
}

pub(crate) fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

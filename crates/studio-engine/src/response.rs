use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use studio_contracts::artifacts::ArtifactRecord;
use studio_contracts::media::MediaKind;
use studio_contracts::MediaError;

use crate::engine::{ImageOutcome, RetrievedArtifact, VideoOutcome};

/// Base64 media attached ahead of the JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineMedia {
    pub mime_type: String,
    pub data: String,
}

impl InlineMedia {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

/// Transport-neutral tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub is_error: bool,
    pub inline: Option<InlineMedia>,
    pub payload: Value,
}

impl ToolResponse {
    pub fn image_generated(outcome: &ImageOutcome, include_full_data: bool) -> Self {
        let record = &outcome.record;
        let mut payload = Map::new();
        payload.insert("success".to_string(), Value::Bool(true));
        payload.insert("message".to_string(), json!("Image generated successfully"));
        insert_identity(&mut payload, MediaKind::Image, &record.id);
        payload.insert("filepath".to_string(), json!(record.filepath));
        payload.insert(
            "metadata".to_string(),
            Value::Object(record.to_payload(MediaKind::Image)),
        );
        Self {
            is_error: false,
            inline: include_full_data.then(|| InlineMedia::from_bytes(&record.mime_type, &outcome.bytes)),
            payload: Value::Object(payload),
        }
    }

    pub fn video_generated(outcome: &VideoOutcome, include_full_data: bool) -> Self {
        let mut payload = Map::new();
        payload.insert("success".to_string(), Value::Bool(true));
        payload.insert("message".to_string(), json!("Video generated successfully"));
        insert_identity(&mut payload, MediaKind::Video, &outcome.id);
        payload.insert(
            "filepath".to_string(),
            outcome
                .record
                .as_ref()
                .map(|record| json!(record.filepath))
                .unwrap_or(Value::Null),
        );
        payload.insert("videoUrl".to_string(), json!(outcome.video_url));
        let metadata = match &outcome.record {
            Some(record) => record.to_payload(MediaKind::Video),
            None => {
                let mut metadata = Map::new();
                metadata.insert("id".to_string(), json!(outcome.id));
                metadata.insert("prompt".to_string(), json!(outcome.prompt));
                metadata.insert("mimeType".to_string(), json!(outcome.mime_type));
                metadata.insert("videoUrl".to_string(), json!(outcome.video_url));
                metadata.insert(
                    "resourceUri".to_string(),
                    json!(MediaKind::Video.resource_uri(&outcome.id)),
                );
                metadata
            }
        };
        payload.insert("metadata".to_string(), Value::Object(metadata));

        let inline = match (&outcome.bytes, include_full_data) {
            (Some(bytes), true) => Some(InlineMedia::from_bytes(&outcome.mime_type, bytes)),
            _ => None,
        };
        Self {
            is_error: false,
            inline,
            payload: Value::Object(payload),
        }
    }

    pub fn artifact_retrieved(artifact: &RetrievedArtifact) -> Self {
        let kind = artifact.kind;
        let record = &artifact.record;
        let mut payload = Map::new();
        payload.insert("success".to_string(), Value::Bool(true));
        payload.insert(
            "message".to_string(),
            json!(format!("{} retrieved successfully", kind.title())),
        );
        payload.extend(record.to_payload(kind));
        insert_identity(&mut payload, kind, &record.id);
        Self {
            is_error: false,
            inline: artifact
                .data
                .as_deref()
                .map(|bytes| InlineMedia::from_bytes(&record.mime_type, bytes)),
            payload: Value::Object(payload),
        }
    }

    pub fn artifacts_listed(kind: MediaKind, records: &[ArtifactRecord]) -> Self {
        let rows: Vec<Value> = records
            .iter()
            .map(|record| Value::Object(record.to_payload(kind)))
            .collect();
        let mut payload = Map::new();
        payload.insert("success".to_string(), Value::Bool(true));
        payload.insert("count".to_string(), json!(rows.len()));
        payload.insert(kind.dir_name().to_string(), Value::Array(rows));
        Self {
            is_error: false,
            inline: None,
            payload: Value::Object(payload),
        }
    }

    pub fn failure(err: &MediaError) -> Self {
        Self {
            is_error: true,
            inline: None,
            payload: json!({
                "success": false,
                "message": err.to_string(),
            }),
        }
    }

    pub fn payload_text(&self) -> String {
        serde_json::to_string_pretty(&self.payload).unwrap_or_else(|_| self.payload.to_string())
    }
}

fn insert_identity(payload: &mut Map<String, Value>, kind: MediaKind, id: &str) {
    let id_key = match kind {
        MediaKind::Image => "imageId",
        MediaKind::Video => "videoId",
    };
    payload.insert("id".to_string(), json!(id));
    payload.insert(id_key.to_string(), json!(id));
    payload.insert("resourceUri".to_string(), json!(kind.resource_uri(id)));
}

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Steps of a generation job that land in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    ImageGenerated,
    VideoSubmitted,
    VideoPoll,
    VideoCompleted,
    ArtifactCreated,
    GenerationFailed,
}

impl JobEvent {
    pub fn name(self) -> &'static str {
        match self {
            Self::ImageGenerated => "image_generated",
            Self::VideoSubmitted => "video_submitted",
            Self::VideoPoll => "video_poll",
            Self::VideoCompleted => "video_completed",
            Self::ArtifactCreated => "artifact_created",
            Self::GenerationFailed => "generation_failed",
        }
    }
}

/// Job log for one server session, one JSON object per line.
///
/// Every line starts with `type`, `session_id` and `ts`. Those names are
/// reserved: a field using one is dropped. The file is opened on the first
/// write and shared by clones.
#[derive(Debug, Clone)]
pub struct EventWriter {
    path: Arc<PathBuf>,
    session_id: Arc<str>,
    file: Arc<Mutex<Option<File>>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl AsRef<str>) -> Self {
        Self {
            path: Arc::new(path.into()),
            session_id: Arc::from(session_id.as_ref()),
            file: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Appends `event` with `fields` and returns the written line. A
    /// non-object `fields` value is stored under `detail`.
    pub fn emit(&self, event: JobEvent, fields: Value) -> anyhow::Result<Value> {
        let line = self.compose(event, fields);
        let mut encoded = serde_json::to_vec(&line)?;
        encoded.push(b'\n');

        let mut slot = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        if slot.is_none() {
            *slot = Some(self.open()?);
        }
        if let Some(file) = slot.as_mut() {
            file.write_all(&encoded)
                .with_context(|| format!("failed to append to {}", self.path.display()))?;
        }
        Ok(line)
    }

    /// Best-effort [`EventWriter::emit`] for job code paths.
    pub fn record(&self, event: JobEvent, fields: Value) {
        if let Err(err) = self.emit(event, fields) {
            tracing::warn!(
                path = %self.path.display(),
                event = event.name(),
                error = %format!("{err:#}"),
                "failed to append job event"
            );
        }
    }

    fn compose(&self, event: JobEvent, fields: Value) -> Value {
        let mut line = Map::new();
        line.insert("type".to_string(), Value::String(event.name().to_string()));
        line.insert("session_id".to_string(), Value::String(self.session_id.to_string()));
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        match fields {
            Value::Object(fields) => {
                for (key, value) in fields {
                    if !line.contains_key(&key) {
                        line.insert(key, value);
                    }
                }
            }
            Value::Null => {}
            other => {
                line.insert("detail".to_string(), other);
            }
        }
        Value::Object(line)
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&*self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::{EventWriter, JobEvent};

    fn read_lines(path: &std::path::Path) -> anyhow::Result<Vec<Value>> {
        let raw = fs::read_to_string(path)?;
        raw.lines()
            .map(|line| serde_json::from_str::<Value>(line).map_err(anyhow::Error::from))
            .collect()
    }

    #[test]
    fn job_steps_append_in_order() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "session-1");

        let created = writer.emit(JobEvent::ArtifactCreated, json!({"id": "abc"}))?;
        writer.clone().emit(JobEvent::VideoPoll, json!({"check": 1}))?;

        let lines = read_lines(&path)?;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], created);
        assert_eq!(lines[0]["type"], json!("artifact_created"));
        assert_eq!(lines[0]["session_id"], json!("session-1"));
        assert_eq!(lines[0]["id"], json!("abc"));
        assert_eq!(lines[1]["type"], json!("video_poll"));
        DateTime::parse_from_rfc3339(lines[1]["ts"].as_str().unwrap_or(""))?;
        Ok(())
    }

    #[test]
    fn reserved_names_stay_with_the_log() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "session-1");
        let line = writer.emit(
            JobEvent::ImageGenerated,
            json!({"session_id": "other", "type": "spoofed", "size": 3}),
        )?;
        assert_eq!(line["session_id"], json!("session-1"));
        assert_eq!(line["type"], json!("image_generated"));
        assert_eq!(line["size"], json!(3));

        let line = writer.emit(JobEvent::GenerationFailed, json!("quota exceeded"))?;
        assert_eq!(line["detail"], json!("quota exceeded"));
        Ok(())
    }

    #[test]
    fn event_names_match_serialized_form() -> anyhow::Result<()> {
        for event in [
            JobEvent::ImageGenerated,
            JobEvent::VideoSubmitted,
            JobEvent::VideoPoll,
            JobEvent::VideoCompleted,
            JobEvent::ArtifactCreated,
            JobEvent::GenerationFailed,
        ] {
            assert_eq!(serde_json::to_value(event)?, json!(event.name()));
        }
        Ok(())
    }

    #[test]
    fn record_swallows_write_failures() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("blocker");
        fs::write(&blocker, b"file")?;
        let writer = EventWriter::new(blocker.join("events.jsonl"), "session-1");
        writer.record(JobEvent::GenerationFailed, json!({}));
        assert!(writer.emit(JobEvent::GenerationFailed, json!({})).is_err());
        Ok(())
    }
}

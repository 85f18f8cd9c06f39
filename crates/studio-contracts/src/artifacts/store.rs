use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::artifacts::record::{now_utc_iso, ArtifactRecord};
use crate::errors::MediaError;
use crate::media::MediaKind;

/// Media ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewArtifact<'a> {
    pub kind: MediaKind,
    pub bytes: &'a [u8],
    pub mime_type: &'a str,
    pub prompt: &'a str,
    pub video_url: Option<&'a str>,
}

/// Owns the `{root}/images` and `{root}/videos` trees.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Creates the per-kind directories and resolves the root to an absolute path.
    pub fn init(root: impl Into<PathBuf>) -> Result<Self, MediaError> {
        let root = root.into();
        for kind in MediaKind::ALL {
            let dir = root.join(kind.dir_name());
            fs::create_dir_all(&dir).map_err(|err| MediaError::storage_write(&dir, err))?;
        }
        let root = fs::canonicalize(&root).map_err(|err| MediaError::storage_write(&root, err))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    pub fn sidecar_path(&self, kind: MediaKind, id: &str) -> PathBuf {
        self.kind_dir(kind).join(format!("{id}.json"))
    }

    /// Writes the artifact file and its sidecar under a fresh id.
    ///
    /// Both files land through a temp-file rename, artifact first. A failed
    /// sidecar write removes the artifact again and reports the failure.
    pub fn materialize(&self, artifact: NewArtifact<'_>) -> Result<ArtifactRecord, MediaError> {
        self.store_as(Uuid::new_v4().to_string(), artifact)
    }

    fn store_as(&self, id: String, artifact: NewArtifact<'_>) -> Result<ArtifactRecord, MediaError> {
        let dir = self.kind_dir(artifact.kind);
        let ext = extension_for(artifact.kind, artifact.mime_type);
        let filepath = dir.join(format!("{id}.{ext}"));
        let sidecar_path = dir.join(format!("{id}.json"));

        write_atomic(&dir, &filepath, artifact.bytes)?;

        let record = ArtifactRecord {
            id,
            created_at: now_utc_iso(),
            prompt: artifact.prompt.to_string(),
            mime_type: artifact.mime_type.to_string(),
            size: artifact.bytes.len() as u64,
            filepath: filepath.clone(),
            video_url: artifact.video_url.map(str::to_string),
        };
        if let Err(err) = write_sidecar(&dir, &sidecar_path, &record) {
            if let Err(cleanup) = fs::remove_file(&filepath) {
                tracing::warn!(
                    path = %filepath.display(),
                    error = %cleanup,
                    "failed to remove artifact after sidecar write failure"
                );
            }
            return Err(err);
        }

        tracing::info!(id = %record.id, kind = %artifact.kind, size = record.size, "artifact stored");
        Ok(record)
    }
}

fn write_sidecar<T: Serialize>(dir: &Path, path: &Path, record: &T) -> Result<(), MediaError> {
    let body = serde_json::to_vec_pretty(record).map_err(|err| {
        MediaError::storage_write(path, std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })?;
    write_atomic(dir, path, &body)
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), MediaError> {
    let fail = |err: std::io::Error| MediaError::storage_write(path, err);
    let mut temp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(fail)?;
    temp.write_all(bytes).map_err(fail)?;
    temp.as_file().sync_all().map_err(fail)?;
    persist_new(temp, path)
}

fn persist_new(temp: NamedTempFile, path: &Path) -> Result<(), MediaError> {
    temp.persist_noclobber(path)
        .map(|_| ())
        .map_err(|err| MediaError::storage_write(path, err.error))
}

/// File extension for a stored artifact of `kind` with the given MIME type.
pub fn extension_for(kind: MediaKind, mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match kind {
        MediaKind::Image => {
            if lowered.contains("jpeg") || lowered.contains("jpg") {
                "jpg".to_string()
            } else if lowered.contains("webp") {
                "webp".to_string()
            } else {
                "png".to_string()
            }
        }
        MediaKind::Video => {
            let subtype = lowered
                .split(';')
                .next()
                .and_then(|essence| essence.split_once('/'))
                .map(|(_, subtype)| subtype.trim())
                .unwrap_or("");
            match subtype {
                "quicktime" => "mov".to_string(),
                "x-matroska" => "mkv".to_string(),
                value if !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric()) => {
                    value.to_string()
                }
                _ => "mp4".to_string(),
            }
        }
    }
}

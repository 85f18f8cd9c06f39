use std::fs::{self, ReadDir};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::artifacts::record::ArtifactRecord;
use crate::artifacts::store::ArtifactStore;
use crate::errors::MediaError;
use crate::media::MediaKind;

/// Read side of the artifact store.
///
/// `get` is strict: any unreadable sidecar is `MetadataNotFound`. Listing is
/// best-effort: each sidecar is parsed on its own and corrupt ones are skipped
/// with a warning.
#[derive(Debug, Clone)]
pub struct MetadataIndex {
    root: PathBuf,
}

impl MetadataIndex {
    pub fn new(store: &ArtifactStore) -> Self {
        Self {
            root: store.root().to_path_buf(),
        }
    }

    pub fn get(&self, kind: MediaKind, id: &str) -> Result<ArtifactRecord, MediaError> {
        let not_found = || MediaError::MetadataNotFound {
            kind,
            id: id.to_string(),
        };
        if !is_safe_id(id) {
            return Err(not_found());
        }
        let path = self.root.join(kind.dir_name()).join(format!("{id}.json"));
        read_record(&path).map_err(|err| {
            tracing::error!(id, kind = %kind, error = %format!("{err:#}"), "metadata lookup failed");
            not_found()
        })
    }

    /// Lazily yields every parsable sidecar for `kind`, in directory order.
    pub fn records(&self, kind: MediaKind) -> Result<Records, MediaError> {
        let dir = self.root.join(kind.dir_name());
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => Some(entries),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => return Err(MediaError::StorageRead { path: dir, source }),
        };
        Ok(Records { entries })
    }

    /// All parsable records for `kind`, oldest first.
    pub fn list(&self, kind: MediaKind) -> Result<Vec<ArtifactRecord>, MediaError> {
        let mut rows: Vec<ArtifactRecord> = self.records(kind)?.collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(rows)
    }
}

pub struct Records {
    entries: Option<ReadDir>,
}

impl Iterator for Records {
    type Item = ArtifactRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;
        for entry in entries.by_ref() {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => return Some(record),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %format!("{err:#}"),
                        "skipping corrupt metadata sidecar"
                    );
                }
            }
        }
        None
    }
}

fn read_record(path: &Path) -> anyhow::Result<ArtifactRecord> {
    let raw = fs::read_to_string(path).with_context(|| format!("failed reading {}", path.display()))?;
    let record = serde_json::from_str(&raw).with_context(|| format!("invalid sidecar {}", path.display()))?;
    Ok(record)
}

fn is_safe_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

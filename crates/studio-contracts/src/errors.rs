use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::media::MediaKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputResolutionKind {
    FetchFailed { status: Option<u16> },
    ReadFailed,
    DecodeFailed,
}

impl fmt::Display for InputResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FetchFailed { status: Some(code) } => write!(f, "failed to fetch image ({code})"),
            Self::FetchFailed { status: None } => f.write_str("failed to fetch image"),
            Self::ReadFailed => f.write_str("failed to read image file"),
            Self::DecodeFailed => f.write_str("failed to decode inline image data"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationApiKind {
    EmptyResult,
    MissingPayload,
    SubmissionFailed,
    OperationFailed,
    DownloadFailed,
    Transport,
}

impl fmt::Display for GenerationApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::EmptyResult => "provider returned no results",
            Self::MissingPayload => "provider result is missing its payload",
            Self::SubmissionFailed => "provider rejected the generation request",
            Self::OperationFailed => "generation operation failed",
            Self::DownloadFailed => "failed to download generated media",
            Self::Transport => "provider request failed",
        };
        f.write_str(text)
    }
}

/// Every core operation ends in a full result or exactly one of these.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{kind}: {detail}")]
    InputResolution {
        kind: InputResolutionKind,
        detail: String,
    },
    #[error("{kind}: {detail}")]
    GenerationApi {
        kind: GenerationApiKind,
        detail: String,
    },
    #[error("video generation timed out after {}s", waited.as_secs())]
    PollingTimeout { waited: Duration },
    #[error("video generation was cancelled")]
    PollingCancelled,
    #[error("failed to store {}: {source}", path.display())]
    StorageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {}: {source}", path.display())]
    StorageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} metadata not found: {id}", kind.title())]
    MetadataNotFound { kind: MediaKind, id: String },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl MediaError {
    pub fn input(kind: InputResolutionKind, detail: impl Into<String>) -> Self {
        Self::InputResolution {
            kind,
            detail: detail.into(),
        }
    }

    pub fn api(kind: GenerationApiKind, detail: impl Into<String>) -> Self {
        Self::GenerationApi {
            kind,
            detail: detail.into(),
        }
    }

    pub fn storage_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StorageWrite {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable label used in event logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InputResolution { .. } => "input_resolution",
            Self::GenerationApi { .. } => "generation_api",
            Self::PollingTimeout { .. } => "polling_timeout",
            Self::PollingCancelled => "polling_cancelled",
            Self::StorageWrite { .. } => "storage_write",
            Self::StorageRead { .. } => "storage_read",
            Self::MetadataNotFound { .. } => "metadata_not_found",
            Self::InvalidRequest(_) => "invalid_request",
        }
    }
}

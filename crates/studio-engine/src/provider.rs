use studio_contracts::media::{ImageConfig, VideoConfig};
use studio_contracts::MediaError;

use crate::input::ResolvedImage;

#[derive(Debug, Clone)]
pub struct ImageGeneration<'a> {
    pub prompt: &'a str,
    pub config: &'a ImageConfig,
}

#[derive(Debug, Clone)]
pub struct VideoSubmission<'a> {
    pub prompt: &'a str,
    pub config: &'a VideoConfig,
    pub image: Option<&'a ResolvedImage>,
}

/// One provider result. `bytes` is `None` when the result carried no payload.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Option<Vec<u8>>,
    pub mime_type: Option<String>,
}

/// Opaque long-running operation name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle(pub String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VideoSample {
    pub uri: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Running,
    Completed(VideoSample),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadedMedia {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

/// Remote generative-media backend.
pub trait MediaProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Synchronous image generation; returns every result the provider sent.
    fn generate_images(&self, request: &ImageGeneration<'_>) -> Result<Vec<GeneratedImage>, MediaError>;

    /// Starts a video job. `Ok(None)` means the provider answered without a handle.
    fn submit_video(&self, request: &VideoSubmission<'_>) -> Result<Option<OperationHandle>, MediaError>;

    fn check_operation(&self, handle: &OperationHandle) -> Result<OperationStatus, MediaError>;

    fn download(&self, uri: &str) -> Result<DownloadedMedia, MediaError>;
}

use std::fs;
use std::sync::Arc;

use anyhow::Context;
use serde_json::{json, Value};
use studio_contracts::artifacts::{ArtifactRecord, ArtifactStore, MetadataIndex, NewArtifact};
use studio_contracts::events::{EventWriter, JobEvent};
use studio_contracts::media::{ImageRequest, MediaKind, VideoRequest};
use studio_contracts::{GenerationApiKind, MediaError};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::genai::GoogleGenAiProvider;
use crate::input::{HttpFetch, InputNormalizer, RemoteFetch};
use crate::poller::{CancelToken, OperationPoller, Pacer, PollSettings, ThreadPacer};
use crate::provider::{MediaProvider, VideoSample};
use crate::submit::JobSubmitter;

pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutcome {
    pub record: ArtifactRecord,
    pub bytes: Vec<u8>,
}

/// Result of a finished video job. `record` is `None` when the video was left
/// on the provider side (`autoDownload: false`).
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOutcome {
    pub id: String,
    pub prompt: String,
    pub record: Option<ArtifactRecord>,
    pub video_url: Option<String>,
    pub bytes: Option<Vec<u8>>,
    pub mime_type: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedArtifact {
    pub kind: MediaKind,
    pub record: ArtifactRecord,
    pub data: Option<Vec<u8>>,
}

/// Read-only view over stored artifacts. Needs no provider credentials.
#[derive(Debug, Clone)]
pub struct ArtifactLibrary {
    store: ArtifactStore,
    index: MetadataIndex,
}

impl ArtifactLibrary {
    pub fn new(store: ArtifactStore) -> Self {
        let index = MetadataIndex::new(&store);
        Self { store, index }
    }

    pub fn open(config: &EngineConfig) -> Result<Self, MediaError> {
        Ok(Self::new(ArtifactStore::init(&config.storage_dir)?))
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn index(&self) -> &MetadataIndex {
        &self.index
    }

    /// Looks up one record. With `include_data`, an unreadable artifact file
    /// still yields the record, just without bytes.
    pub fn get(&self, kind: MediaKind, id: &str, include_data: bool) -> Result<RetrievedArtifact, MediaError> {
        let record = self.index.get(kind, id)?;
        let data = if include_data {
            match fs::read(&record.filepath) {
                Ok(bytes) => Some(bytes),
                Err(err) => {
                    tracing::warn!(
                        id,
                        path = %record.filepath.display(),
                        error = %err,
                        "artifact file unreadable; returning metadata only"
                    );
                    None
                }
            }
        } else {
            None
        };
        Ok(RetrievedArtifact { kind, record, data })
    }

    pub fn list(&self, kind: MediaKind) -> Result<Vec<ArtifactRecord>, MediaError> {
        self.index.list(kind)
    }
}

/// Composition root for generation requests.
pub struct MediaEngine {
    provider: Arc<dyn MediaProvider>,
    fetcher: Arc<dyn RemoteFetch>,
    pacer: Arc<dyn Pacer>,
    library: ArtifactLibrary,
    poll: PollSettings,
    events: Option<EventWriter>,
}

impl MediaEngine {
    pub fn new(provider: Arc<dyn MediaProvider>, fetcher: Arc<dyn RemoteFetch>, store: ArtifactStore) -> Self {
        Self {
            provider,
            fetcher,
            pacer: Arc::new(ThreadPacer),
            library: ArtifactLibrary::new(store),
            poll: PollSettings::default(),
            events: None,
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_poll_settings(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_events(mut self, events: Option<EventWriter>) -> Self {
        self.events = events;
        self
    }

    /// Builds the Google-backed engine. Creates the storage tree first.
    pub fn from_config(config: &EngineConfig) -> anyhow::Result<Self> {
        config.validate()?;
        let api_key = config.require_api_key()?;
        let store = ArtifactStore::init(&config.storage_dir)
            .with_context(|| format!("failed to initialize storage at {}", config.storage_dir.display()))?;
        let provider = GoogleGenAiProvider::new(
            &config.api_base,
            api_key,
            config.image_model.as_str(),
            config.video_model.as_str(),
            config.http_timeout,
        )?;
        let fetcher = HttpFetch::new(config.http_timeout)?;
        let events = EventWriter::new(config.events_path(), Uuid::new_v4().to_string());
        tracing::info!(
            storage = %store.root().display(),
            events = %events.path().display(),
            "media engine ready"
        );
        Ok(Self::new(Arc::new(provider), Arc::new(fetcher), store)
            .with_poll_settings(config.poll_settings())
            .with_events(Some(events)))
    }

    pub fn library(&self) -> &ArtifactLibrary {
        &self.library
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn generate_image(&self, request: &ImageRequest) -> Result<ImageOutcome, MediaError> {
        let result = self.run_image(request);
        if let Err(err) = &result {
            self.report_failure(MediaKind::Image, err);
        }
        result
    }

    pub fn generate_video(&self, request: &VideoRequest, cancel: &CancelToken) -> Result<VideoOutcome, MediaError> {
        let result = self.run_video(request, cancel);
        if let Err(err) = &result {
            self.report_failure(MediaKind::Video, err);
        }
        result
    }

    fn run_image(&self, request: &ImageRequest) -> Result<ImageOutcome, MediaError> {
        request.validate()?;
        let image = JobSubmitter::new(self.provider.as_ref()).generate_image(request)?;
        let record = self.library.store.materialize(NewArtifact {
            kind: MediaKind::Image,
            bytes: &image.bytes,
            mime_type: &image.mime_type,
            prompt: &request.prompt,
            video_url: None,
        })?;
        self.emit(
            JobEvent::ImageGenerated,
            json!({
                "provider": self.provider.name(),
                "id": record.id,
                "mime_type": record.mime_type,
                "size": record.size,
                "returned": image.returned,
            }),
        );
        self.emit_artifact(MediaKind::Image, &record);
        Ok(ImageOutcome {
            record,
            bytes: image.bytes,
        })
    }

    fn run_video(&self, request: &VideoRequest, cancel: &CancelToken) -> Result<VideoOutcome, MediaError> {
        request.validate()?;
        let image = request
            .source_image
            .as_ref()
            .map(|input| InputNormalizer::new(self.fetcher.as_ref()).resolve(input))
            .transpose()?;

        let mut job = JobSubmitter::new(self.provider.as_ref()).submit_video(request, image.as_ref())?;
        let operation = job.handle().as_str().to_string();
        tracing::info!(operation = %operation, "video operation submitted");
        self.emit(
            JobEvent::VideoSubmitted,
            json!({
                "provider": self.provider.name(),
                "operation": operation,
                "from_image": image.is_some(),
                "duration_seconds": request.config.duration_seconds,
            }),
        );

        let sample = OperationPoller::new(self.provider.as_ref(), self.pacer.as_ref(), self.poll)
            .with_events(self.events.as_ref())
            .run(&mut job, cancel)?;
        self.emit(
            JobEvent::VideoCompleted,
            json!({
                "operation": operation,
                "checks": job.checks(),
                "waited_s": job.waited().as_secs_f64(),
                "elapsed_ms": job.elapsed().as_millis() as u64,
                "video_url": sample.uri,
            }),
        );

        let outcome = self.settle_video(request, sample, operation)?;
        if let Some(record) = &outcome.record {
            self.emit_artifact(MediaKind::Video, record);
        }
        Ok(outcome)
    }

    /// Stores the finished sample: inline bytes always, a remote URI only with
    /// `autoDownload`.
    fn settle_video(
        &self,
        request: &VideoRequest,
        sample: VideoSample,
        operation: String,
    ) -> Result<VideoOutcome, MediaError> {
        let VideoSample { uri, bytes, mime_type } = sample;
        let declared = mime_type.filter(|value| value.starts_with("video/"));
        let (bytes, mime_type, uri) = match (bytes, uri) {
            (Some(bytes), uri) => (
                bytes,
                declared.unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string()),
                uri,
            ),
            (None, Some(uri)) if request.auto_download => {
                let downloaded = self.provider.download(&uri)?;
                let mime_type = downloaded
                    .mime_type
                    .map(|value| value.split(';').next().unwrap_or_default().trim().to_string())
                    .filter(|value| value.starts_with("video/"))
                    .or(declared)
                    .unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string());
                (downloaded.bytes, mime_type, Some(uri))
            }
            (None, Some(uri)) => {
                return Ok(VideoOutcome {
                    id: Uuid::new_v4().to_string(),
                    prompt: request.prompt.clone(),
                    record: None,
                    video_url: Some(uri),
                    bytes: None,
                    mime_type: declared.unwrap_or_else(|| DEFAULT_VIDEO_MIME.to_string()),
                    operation,
                });
            }
            (None, None) => {
                return Err(MediaError::api(
                    GenerationApiKind::MissingPayload,
                    format!("operation {operation} finished without a video"),
                ));
            }
        };

        if bytes.is_empty() {
            return Err(MediaError::api(
                GenerationApiKind::MissingPayload,
                format!("operation {operation} produced an empty video"),
            ));
        }
        let record = self.library.store.materialize(NewArtifact {
            kind: MediaKind::Video,
            bytes: &bytes,
            mime_type: &mime_type,
            prompt: &request.prompt,
            video_url: uri.as_deref(),
        })?;
        Ok(VideoOutcome {
            id: record.id.clone(),
            prompt: request.prompt.clone(),
            video_url: uri,
            bytes: Some(bytes),
            mime_type,
            operation,
            record: Some(record),
        })
    }

    fn emit_artifact(&self, kind: MediaKind, record: &ArtifactRecord) {
        self.emit(
            JobEvent::ArtifactCreated,
            json!({
                "kind": kind,
                "id": record.id,
                "resource_uri": record.resource_uri(kind),
                "filepath": record.filepath,
                "size": record.size,
            }),
        );
    }

    fn report_failure(&self, kind: MediaKind, err: &MediaError) {
        tracing::error!(kind = %kind, code = err.code(), error = %err, "generation failed");
        self.emit(
            JobEvent::GenerationFailed,
            json!({
                "kind": kind,
                "code": err.code(),
                "message": err.to_string(),
            }),
        );
    }

    fn emit(&self, event: JobEvent, fields: Value) {
        if let Some(events) = &self.events {
            events.record(event, fields);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use serde_json::Value;
    use studio_contracts::artifacts::ArtifactStore;
    use studio_contracts::events::EventWriter;
    use studio_contracts::media::{ImageInput, ImageRequest, MediaKind, VideoRequest};
    use studio_contracts::{InputResolutionKind, MediaError};

    use super::{ArtifactLibrary, MediaEngine};
    use crate::input::{FetchedBody, RemoteFetch};
    use crate::poller::{CancelToken, Pacer, PollSettings};
    use crate::provider::{
        DownloadedMedia, GeneratedImage, ImageGeneration, MediaProvider, OperationHandle, OperationStatus,
        VideoSample, VideoSubmission,
    };

    #[derive(Default)]
    struct FakeProvider {
        statuses: Mutex<VecDeque<OperationStatus>>,
        submissions: Mutex<u32>,
        downloads: Mutex<Vec<String>>,
    }

    impl FakeProvider {
        fn with_statuses(statuses: Vec<OperationStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Self::default()
            }
        }

        fn submissions(&self) -> u32 {
            *self.submissions.lock().expect("submissions lock")
        }
    }

    impl MediaProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn generate_images(&self, _request: &ImageGeneration<'_>) -> Result<Vec<GeneratedImage>, MediaError> {
            Ok(vec![GeneratedImage {
                bytes: Some(b"png-bytes".to_vec()),
                mime_type: Some("image/png".to_string()),
            }])
        }

        fn submit_video(&self, _request: &VideoSubmission<'_>) -> Result<Option<OperationHandle>, MediaError> {
            *self.submissions.lock().expect("submissions lock") += 1;
            Ok(Some(OperationHandle("operations/video-1".to_string())))
        }

        fn check_operation(&self, _handle: &OperationHandle) -> Result<OperationStatus, MediaError> {
            Ok(self
                .statuses
                .lock()
                .expect("statuses lock")
                .pop_front()
                .unwrap_or(OperationStatus::Running))
        }

        fn download(&self, uri: &str) -> Result<DownloadedMedia, MediaError> {
            self.downloads.lock().expect("downloads lock").push(uri.to_string());
            Ok(DownloadedMedia {
                bytes: b"mp4-bytes".to_vec(),
                mime_type: Some("video/mp4".to_string()),
            })
        }
    }

    struct StatusFetch(u16);

    impl RemoteFetch for StatusFetch {
        fn fetch(&self, _url: &str) -> anyhow::Result<FetchedBody> {
            Ok(FetchedBody {
                status: self.0,
                content_type: Some("image/png".to_string()),
                bytes: b"remote".to_vec(),
            })
        }
    }

    #[derive(Default)]
    struct CountingPacer {
        waits: Mutex<u32>,
    }

    impl Pacer for CountingPacer {
        fn wait(&self, _duration: Duration, _cancel: &CancelToken) -> bool {
            *self.waits.lock().expect("waits lock") += 1;
            true
        }
    }

    const VIDEO_URL: &str = "https://generativelanguage.googleapis.com/v1beta/files/abc:download?alt=media";

    fn engine(
        root: &std::path::Path,
        provider: Arc<FakeProvider>,
        fetch_status: u16,
        pacer: Arc<CountingPacer>,
    ) -> anyhow::Result<MediaEngine> {
        let store = ArtifactStore::init(root)?;
        Ok(MediaEngine::new(provider, Arc::new(StatusFetch(fetch_status)), store)
            .with_pacer(pacer)
            .with_poll_settings(PollSettings {
                interval: Duration::from_secs(10),
                max_wait: Duration::from_secs(600),
            })
            .with_events(Some(EventWriter::new(root.join("events.jsonl"), "test-session"))))
    }

    fn event_types(root: &std::path::Path) -> anyhow::Result<Vec<String>> {
        let raw = fs::read_to_string(root.join("events.jsonl"))?;
        raw.lines()
            .map(|line| -> anyhow::Result<String> {
                let value: Value = serde_json::from_str(line)?;
                Ok(value["type"].as_str().unwrap_or_default().to_string())
            })
            .collect()
    }

    #[test]
    fn image_request_persists_one_png_and_sidecar() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = engine(
            temp.path(),
            Arc::new(FakeProvider::default()),
            200,
            Arc::new(CountingPacer::default()),
        )?;

        let outcome = engine.generate_image(&ImageRequest::new("a cat"))?;
        let record = &outcome.record;
        assert_eq!(record.resource_uri(MediaKind::Image), format!("images://{}", record.id));
        assert_eq!(record.filepath.extension().and_then(|ext| ext.to_str()), Some("png"));
        assert_eq!(fs::read(&record.filepath)?, b"png-bytes");

        let stored = engine.library().get(MediaKind::Image, &record.id, true)?;
        assert_eq!(stored.record.prompt, "a cat");
        assert_eq!(stored.record.size, 9);
        assert_eq!(stored.data.as_deref(), Some(&b"png-bytes"[..]));
        assert_eq!(fs::read_dir(temp.path().join("images"))?.count(), 2);
        assert_eq!(event_types(temp.path())?, vec!["image_generated", "artifact_created"]);
        Ok(())
    }

    #[test]
    fn missing_image_url_fails_before_submission() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let provider = Arc::new(FakeProvider::default());
        let engine = engine(temp.path(), provider.clone(), 404, Arc::new(CountingPacer::default()))?;

        let mut request = VideoRequest::new("animate");
        request.source_image = Some(ImageInput::Reference("https://example.com/missing.png".to_string()));
        let err = engine
            .generate_video(&request, &CancelToken::new())
            .expect_err("404 image");

        assert!(matches!(
            err,
            MediaError::InputResolution {
                kind: InputResolutionKind::FetchFailed { status: Some(404) },
                ..
            }
        ));
        assert_eq!(provider.submissions(), 0);
        assert_eq!(event_types(temp.path())?, vec!["generation_failed"]);
        Ok(())
    }

    #[test]
    fn video_polls_twice_then_downloads_and_stores() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let provider = Arc::new(FakeProvider::with_statuses(vec![
            OperationStatus::Running,
            OperationStatus::Running,
            OperationStatus::Completed(VideoSample {
                uri: Some(VIDEO_URL.to_string()),
                ..VideoSample::default()
            }),
        ]));
        let pacer = Arc::new(CountingPacer::default());
        let engine = engine(temp.path(), provider.clone(), 200, pacer.clone())?;

        let outcome = engine.generate_video(&VideoRequest::new("a wave"), &CancelToken::new())?;
        assert_eq!(*pacer.waits.lock().expect("waits lock"), 2);
        assert_eq!(outcome.video_url.as_deref(), Some(VIDEO_URL));
        let record = outcome.record.expect("stored video");
        assert_eq!(record.video_url.as_deref(), Some(VIDEO_URL));
        assert_eq!(record.filepath.extension().and_then(|ext| ext.to_str()), Some("mp4"));
        assert_eq!(fs::read(&record.filepath)?, b"mp4-bytes");
        assert_eq!(*provider.downloads.lock().expect("downloads lock"), vec![VIDEO_URL.to_string()]);

        let listed = engine.library().list(MediaKind::Video)?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, outcome.id);
        assert_eq!(
            event_types(temp.path())?,
            vec![
                "video_submitted",
                "video_poll",
                "video_poll",
                "video_poll",
                "video_completed",
                "artifact_created"
            ]
        );
        Ok(())
    }

    #[test]
    fn auto_download_off_stores_nothing() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let provider = Arc::new(FakeProvider::with_statuses(vec![OperationStatus::Completed(
            VideoSample {
                uri: Some(VIDEO_URL.to_string()),
                ..VideoSample::default()
            },
        )]));
        let engine = engine(temp.path(), provider.clone(), 200, Arc::new(CountingPacer::default()))?;

        let mut request = VideoRequest::new("a wave");
        request.auto_download = false;
        let outcome = engine.generate_video(&request, &CancelToken::new())?;
        assert!(outcome.record.is_none());
        assert!(!outcome.id.is_empty());
        assert_eq!(outcome.video_url.as_deref(), Some(VIDEO_URL));
        assert!(provider.downloads.lock().expect("downloads lock").is_empty());
        assert!(engine.library().list(MediaKind::Video)?.is_empty());
        Ok(())
    }

    #[test]
    fn inline_video_bytes_are_stored_without_download() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let provider = Arc::new(FakeProvider::with_statuses(vec![OperationStatus::Completed(
            VideoSample {
                bytes: Some(b"inline-video".to_vec()),
                mime_type: Some("video/webm".to_string()),
                ..VideoSample::default()
            },
        )]));
        let engine = engine(temp.path(), provider.clone(), 200, Arc::new(CountingPacer::default()))?;

        let mut request = VideoRequest::new("a wave");
        request.auto_download = false;
        let outcome = engine.generate_video(&request, &CancelToken::new())?;
        let record = outcome.record.expect("stored video");
        assert_eq!(record.mime_type, "video/webm");
        assert_eq!(record.filepath.extension().and_then(|ext| ext.to_str()), Some("webm"));
        assert!(record.video_url.is_none());
        assert!(provider.downloads.lock().expect("downloads lock").is_empty());
        Ok(())
    }

    #[test]
    fn invalid_request_never_reaches_provider() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let provider = Arc::new(FakeProvider::default());
        let engine = engine(temp.path(), provider.clone(), 200, Arc::new(CountingPacer::default()))?;

        let mut request = VideoRequest::new("a wave");
        request.config.duration_seconds = 9;
        let err = engine
            .generate_video(&request, &CancelToken::new())
            .expect_err("duration out of range");
        assert!(matches!(err, MediaError::InvalidRequest(_)));
        assert_eq!(provider.submissions(), 0);
        Ok(())
    }

    #[test]
    fn library_get_tolerates_missing_artifact_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let engine = engine(
            temp.path(),
            Arc::new(FakeProvider::default()),
            200,
            Arc::new(CountingPacer::default()),
        )?;
        let outcome = engine.generate_image(&ImageRequest::new("a cat"))?;
        fs::remove_file(&outcome.record.filepath)?;

        let library = ArtifactLibrary::new(ArtifactStore::init(temp.path())?);
        let retrieved = library.get(MediaKind::Image, &outcome.record.id, true)?;
        assert!(retrieved.data.is_none());
        assert_eq!(retrieved.record, outcome.record);

        let err = library
            .get(MediaKind::Image, "nonexistent-id", false)
            .expect_err("unknown id");
        assert_eq!(err.to_string(), "Image metadata not found: nonexistent-id");
        Ok(())
    }
}

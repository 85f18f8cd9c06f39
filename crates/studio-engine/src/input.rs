use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use studio_contracts::media::ImageInput;
use studio_contracts::{InputResolutionKind, MediaError};

const URL_DEFAULT_MIME: &str = "image/jpeg";
const PATH_DEFAULT_MIME: &str = "image/jpeg";
const INLINE_DEFAULT_MIME: &str = "image/png";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedBody {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

pub trait RemoteFetch: Send + Sync {
    fn fetch(&self, url: &str) -> anyhow::Result<FetchedBody>;
}

pub struct HttpFetch {
    http: HttpClient,
}

impl HttpFetch {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build image fetch client")?;
        Ok(Self { http })
    }
}

impl RemoteFetch for HttpFetch {
    fn fetch(&self, url: &str) -> anyhow::Result<FetchedBody> {
        let response = self
            .http
            .get(url)
            .send()
            .with_context(|| format!("image request failed ({url})"))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .with_context(|| format!("failed reading image body ({url})"))?
            .to_vec();
        Ok(FetchedBody {
            status,
            content_type,
            bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Url,
    Path,
    Inline,
}

/// URL first, then path, then inline data. Inline data that happens to contain
/// `:/` or `:\` is read as a path.
pub fn classify_reference(raw: &str) -> ReferenceKind {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        ReferenceKind::Url
    } else if raw.starts_with('/') || raw.contains(":\\") || raw.contains(":/") {
        ReferenceKind::Path
    } else {
        ReferenceKind::Inline
    }
}

pub fn mime_for_extension(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => PATH_DEFAULT_MIME,
    }
}

pub struct InputNormalizer<'a> {
    fetcher: &'a dyn RemoteFetch,
}

impl<'a> InputNormalizer<'a> {
    pub fn new(fetcher: &'a dyn RemoteFetch) -> Self {
        Self { fetcher }
    }

    pub fn resolve(&self, input: &ImageInput) -> Result<ResolvedImage, MediaError> {
        match input {
            ImageInput::Content(content) => {
                // Typed content is always inline; `/9j/…` JPEG data must not read as a path.
                let hint = Some(content.mime_type.as_str()).filter(|value| !value.trim().is_empty());
                decode_inline(&content.data, hint)
            }
            ImageInput::Reference(raw) => self.resolve_reference(raw, None),
        }
    }

    pub fn resolve_reference(&self, raw: &str, mime_hint: Option<&str>) -> Result<ResolvedImage, MediaError> {
        match classify_reference(raw) {
            ReferenceKind::Url => self.fetch_url(raw, mime_hint),
            ReferenceKind::Path => read_path(Path::new(raw), mime_hint),
            ReferenceKind::Inline => decode_inline(raw, mime_hint),
        }
    }

    fn fetch_url(&self, url: &str, mime_hint: Option<&str>) -> Result<ResolvedImage, MediaError> {
        tracing::debug!(url, "resolving image from URL");
        let body = self.fetcher.fetch(url).map_err(|err| {
            MediaError::input(
                InputResolutionKind::FetchFailed { status: None },
                format!("{err:#}"),
            )
        })?;
        if !(200..300).contains(&body.status) {
            return Err(MediaError::input(
                InputResolutionKind::FetchFailed {
                    status: Some(body.status),
                },
                url,
            ));
        }
        let mime_type = body
            .content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .or(mime_hint)
            .unwrap_or(URL_DEFAULT_MIME)
            .to_string();
        Ok(ResolvedImage {
            bytes: body.bytes,
            mime_type,
        })
    }
}

fn read_path(path: &Path, mime_hint: Option<&str>) -> Result<ResolvedImage, MediaError> {
    tracing::debug!(path = %path.display(), "resolving image from file");
    let bytes = fs::read(path).map_err(|err| {
        MediaError::input(
            InputResolutionKind::ReadFailed,
            format!("{}: {err}", path.display()),
        )
    })?;
    let mime_type = mime_hint.unwrap_or_else(|| mime_for_extension(path)).to_string();
    Ok(ResolvedImage { bytes, mime_type })
}

fn decode_inline(raw: &str, mime_hint: Option<&str>) -> Result<ResolvedImage, MediaError> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|err| MediaError::input(InputResolutionKind::DecodeFailed, err.to_string()))?;
    Ok(ResolvedImage {
        bytes,
        mime_type: mime_hint.unwrap_or(INLINE_DEFAULT_MIME).to_string(),
    })
}

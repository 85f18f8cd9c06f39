use std::time::Duration;

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::{json, Map, Value};
use studio_contracts::{GenerationApiKind, MediaError};

use crate::provider::{
    DownloadedMedia, GeneratedImage, ImageGeneration, MediaProvider, OperationHandle, OperationStatus,
    VideoSample, VideoSubmission,
};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Generative Language REST backend: Imagen for stills, Veo for video.
pub struct GoogleGenAiProvider {
    api_base: String,
    api_key: String,
    image_model: String,
    video_model: String,
    http: HttpClient,
}

impl GoogleGenAiProvider {
    pub fn new(
        api_base: &str,
        api_key: impl Into<String>,
        image_model: impl Into<String>,
        video_model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("failed to build provider HTTP client")?;
        Ok(Self {
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            image_model: resolve_model_name(&image_model.into()),
            video_model: resolve_model_name(&video_model.into()),
            http,
        })
    }

    fn model_endpoint(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    fn post_json(&self, endpoint: &str, payload: &Value) -> Result<Value, MediaError> {
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(payload)
            .send()
            .map_err(|err| transport_error(endpoint, err))?;
        response_json_or_error(endpoint, response)
    }

    /// Only URIs served by the API host get the key attached.
    fn is_api_host(&self, uri: &str) -> bool {
        let origin = |raw: &str| Url::parse(raw).ok().map(|url| url.origin().ascii_serialization());
        match (origin(&self.api_base), origin(uri)) {
            (Some(api), Some(target)) => api == target,
            _ => false,
        }
    }
}

impl MediaProvider for GoogleGenAiProvider {
    fn name(&self) -> &str {
        "google-genai"
    }

    fn generate_images(&self, request: &ImageGeneration<'_>) -> Result<Vec<GeneratedImage>, MediaError> {
        let endpoint = self.model_endpoint(&self.image_model, "predict");
        let payload = image_request_body(request);
        tracing::info!(model = %self.image_model, "requesting image generation");
        let response = self.post_json(&endpoint, &payload)?;
        parse_predictions(&response)
    }

    fn submit_video(&self, request: &VideoSubmission<'_>) -> Result<Option<OperationHandle>, MediaError> {
        let endpoint = self.model_endpoint(&self.video_model, "predictLongRunning");
        let payload = video_request_body(request);
        tracing::info!(
            model = %self.video_model,
            from_image = request.image.is_some(),
            "submitting video generation"
        );
        let response = self
            .post_json(&endpoint, &payload)
            .map_err(as_kind(GenerationApiKind::SubmissionFailed))?;
        Ok(response
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| OperationHandle(name.to_string())))
    }

    fn check_operation(&self, handle: &OperationHandle) -> Result<OperationStatus, MediaError> {
        let endpoint = format!("{}/{}", self.api_base, handle.as_str().trim_start_matches('/'));
        let response = self
            .http
            .get(&endpoint)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .map_err(|err| transport_error(&endpoint, err))?;
        let payload = response_json_or_error(&endpoint, response)?;
        parse_operation(&payload)
    }

    fn download(&self, uri: &str) -> Result<DownloadedMedia, MediaError> {
        let mut request = self.http.get(uri);
        if self.is_api_host(uri) {
            request = request.query(&[("key", self.api_key.as_str())]);
        }
        let response = request
            .send()
            .map_err(|err| download_error(uri, err))?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::api(
                GenerationApiKind::DownloadFailed,
                format!("{} returned {}", strip_query(uri), status.as_u16()),
            ));
        }
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response
            .bytes()
            .map_err(|err| download_error(uri, err))?
            .to_vec();
        Ok(DownloadedMedia { bytes, mime_type })
    }
}

pub fn resolve_model_name(raw: &str) -> String {
    raw.trim().trim_start_matches("models/").to_string()
}

pub fn image_request_body(request: &ImageGeneration<'_>) -> Value {
    json!({
        "instances": [{ "prompt": request.prompt }],
        "parameters": {
            "sampleCount": request.config.number_of_images,
        },
    })
}

pub fn video_request_body(request: &VideoSubmission<'_>) -> Value {
    let config = request.config;
    let mut instance = Map::new();
    instance.insert("prompt".to_string(), Value::String(request.prompt.to_string()));
    if let Some(image) = request.image {
        instance.insert(
            "image".to_string(),
            json!({
                "bytesBase64Encoded": BASE64.encode(&image.bytes),
                "mimeType": image.mime_type,
            }),
        );
    }

    let mut parameters = Map::new();
    parameters.insert(
        "aspectRatio".to_string(),
        Value::String(config.aspect_ratio.as_str().to_string()),
    );
    // Rejected by the API for image-to-video requests.
    if request.image.is_none() {
        parameters.insert(
            "personGeneration".to_string(),
            Value::String(config.person_generation.as_str().to_string()),
        );
    }
    parameters.insert("sampleCount".to_string(), json!(config.number_of_videos));
    parameters.insert("durationSeconds".to_string(), json!(config.duration_seconds));
    parameters.insert("enhancePrompt".to_string(), Value::Bool(config.enhance_prompt));
    if !config.negative_prompt.trim().is_empty() {
        parameters.insert(
            "negativePrompt".to_string(),
            Value::String(config.negative_prompt.clone()),
        );
    }

    json!({
        "instances": [Value::Object(instance)],
        "parameters": Value::Object(parameters),
    })
}

pub fn parse_predictions(payload: &Value) -> Result<Vec<GeneratedImage>, MediaError> {
    let rows = payload
        .get("predictions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(obj) = row.as_object() else {
            out.push(GeneratedImage {
                bytes: None,
                mime_type: None,
            });
            continue;
        };
        let nested = obj
            .get("image")
            .and_then(Value::as_object)
            .unwrap_or(obj);
        let encoded = nested
            .get("bytesBase64Encoded")
            .or_else(|| nested.get("imageBytes"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty());
        let bytes = match encoded {
            Some(encoded) => Some(BASE64.decode(encoded.as_bytes()).map_err(|err| {
                MediaError::api(
                    GenerationApiKind::MissingPayload,
                    format!("image payload is not valid base64: {err}"),
                )
            })?),
            None => None,
        };
        out.push(GeneratedImage {
            bytes,
            mime_type: nested
                .get("mimeType")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(out)
}

pub fn parse_operation(payload: &Value) -> Result<OperationStatus, MediaError> {
    if !payload.get("done").and_then(Value::as_bool).unwrap_or(false) {
        return Ok(OperationStatus::Running);
    }
    if let Some(error) = payload.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Ok(OperationStatus::Failed(message));
    }

    let response = payload.get("response").cloned().unwrap_or(Value::Null);
    let generated = response.get("generateVideoResponse").unwrap_or(&response);
    let samples = generated
        .get("generatedSamples")
        .or_else(|| generated.get("videos"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for row in &samples {
        let video = row.get("video").unwrap_or(row);
        let uri = video
            .get("uri")
            .or_else(|| video.get("gcsUri"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let bytes = match video
            .get("encodedVideo")
            .or_else(|| video.get("bytesBase64Encoded"))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
        {
            Some(encoded) => Some(BASE64.decode(encoded.as_bytes()).map_err(|err| {
                MediaError::api(
                    GenerationApiKind::MissingPayload,
                    format!("video payload is not valid base64: {err}"),
                )
            })?),
            None => None,
        };
        if uri.is_none() && bytes.is_none() {
            continue;
        }
        let mime_type = video
            .get("mimeType")
            .or_else(|| video.get("encoding"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Ok(OperationStatus::Completed(VideoSample { uri, bytes, mime_type }));
    }

    let filtered: Vec<String> = generated
        .get("raiMediaFilteredReasons")
        .and_then(Value::as_array)
        .map(|rows| rows.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    if filtered.is_empty() {
        Ok(OperationStatus::Failed(
            "operation completed without a generated video".to_string(),
        ))
    } else {
        Ok(OperationStatus::Failed(format!(
            "generated video was filtered: {}",
            filtered.join("; ")
        )))
    }
}

fn response_json_or_error(endpoint: &str, response: HttpResponse) -> Result<Value, MediaError> {
    let status = response.status();
    let body = response
        .text()
        .map_err(|err| transport_error(endpoint, err))?;
    if !status.is_success() {
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|value| {
                value
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| truncate_text(&body, 512));
        return Err(MediaError::api(
            GenerationApiKind::Transport,
            format!("{} returned {}: {}", strip_query(endpoint), status.as_u16(), message),
        ));
    }
    serde_json::from_str(&body).map_err(|err| {
        MediaError::api(
            GenerationApiKind::Transport,
            format!("{} returned invalid JSON: {err}", strip_query(endpoint)),
        )
    })
}

fn transport_error(endpoint: &str, err: reqwest::Error) -> MediaError {
    // reqwest errors can echo the URL, which carries the key.
    let err = err.without_url();
    MediaError::api(
        GenerationApiKind::Transport,
        format!("request to {} failed: {err}", strip_query(endpoint)),
    )
}

fn download_error(uri: &str, err: reqwest::Error) -> MediaError {
    let err = err.without_url();
    MediaError::api(
        GenerationApiKind::DownloadFailed,
        format!("download from {} failed: {err}", strip_query(uri)),
    )
}

fn as_kind(kind: GenerationApiKind) -> impl Fn(MediaError) -> MediaError {
    move |err| match err {
        MediaError::GenerationApi { detail, .. } => MediaError::api(kind, detail),
        other => other,
    }
}

fn strip_query(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

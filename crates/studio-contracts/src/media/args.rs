//! Tool argument shapes and their declared defaults.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::MediaError;
use crate::media::options::{resolve_bool, BoolOption};
use crate::media::request::{
    ImageConfig, ImageRequest, VideoConfig, VideoRequest, DEFAULT_IMAGE_TO_VIDEO_PROMPT,
};
use crate::media::{AspectRatio, ImageInput, PersonGeneration};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageArgs {
    /// Text prompt, 1-1000 characters.
    pub prompt: String,
    /// Number of images to request (1-4, default 1).
    #[serde(default)]
    pub number_of_images: Option<u32>,
    /// Return the image bytes inline (default false).
    #[serde(default)]
    pub include_full_data: Option<BoolOption>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VideoOptionArgs {
    /// "16:9" (default) or "9:16".
    #[serde(default)]
    pub aspect_ratio: Option<AspectRatio>,
    /// "dont_allow" (default) or "allow_adult".
    #[serde(default)]
    pub person_generation: Option<PersonGeneration>,
    /// 1 (default) or 2.
    #[serde(default)]
    pub number_of_videos: Option<u32>,
    /// Clip length in whole seconds, 5-8 (default 5). `6.0` is accepted.
    #[serde(default)]
    pub duration_seconds: Option<f64>,
    #[serde(default)]
    pub enhance_prompt: Option<BoolOption>,
    #[serde(default)]
    pub negative_prompt: Option<String>,
    /// Return the video bytes inline (default false).
    #[serde(default)]
    pub include_full_data: Option<BoolOption>,
    /// Download and store the generated video (default true).
    #[serde(default)]
    pub auto_download: Option<BoolOption>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoFromTextArgs {
    /// Text prompt, 1-1000 characters.
    pub prompt: String,
    #[serde(flatten)]
    pub options: VideoOptionArgs,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateVideoFromImageArgs {
    /// Image content object, or a URL, file path or base64 string.
    pub image: ImageInput,
    /// Defaults to "Generate a video from this image".
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(flatten)]
    pub options: VideoOptionArgs,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GetArtifactArgs {
    pub id: String,
    #[serde(default)]
    pub include_full_data: Option<BoolOption>,
}

impl GenerateImageArgs {
    pub fn into_request(self) -> Result<ImageRequest, MediaError> {
        let defaults = ImageConfig::default();
        let request = ImageRequest {
            prompt: self.prompt,
            config: ImageConfig {
                number_of_images: self.number_of_images.unwrap_or(defaults.number_of_images),
            },
            include_full_data: resolve_bool(self.include_full_data.as_ref(), false),
        };
        request.validate()?;
        Ok(request)
    }
}

impl VideoOptionArgs {
    fn into_request(self, prompt: String, source_image: Option<ImageInput>) -> Result<VideoRequest, MediaError> {
        let defaults = VideoConfig::default();
        let duration_seconds = match self.duration_seconds {
            Some(value) => whole_seconds(value)?,
            None => defaults.duration_seconds,
        };
        let request = VideoRequest {
            prompt,
            source_image,
            config: VideoConfig {
                aspect_ratio: self.aspect_ratio.unwrap_or(defaults.aspect_ratio),
                person_generation: self.person_generation.unwrap_or(defaults.person_generation),
                number_of_videos: self.number_of_videos.unwrap_or(defaults.number_of_videos),
                duration_seconds,
                enhance_prompt: resolve_bool(self.enhance_prompt.as_ref(), defaults.enhance_prompt),
                negative_prompt: self.negative_prompt.unwrap_or(defaults.negative_prompt),
            },
            include_full_data: resolve_bool(self.include_full_data.as_ref(), false),
            auto_download: resolve_bool(self.auto_download.as_ref(), true),
        };
        request.validate()?;
        Ok(request)
    }
}

fn whole_seconds(value: f64) -> Result<u32, MediaError> {
    if !value.is_finite() || value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(MediaError::InvalidRequest(format!(
            "durationSeconds must be a whole number of seconds (got {value})"
        )));
    }
    Ok(value as u32)
}

impl GenerateVideoFromTextArgs {
    pub fn into_request(self) -> Result<VideoRequest, MediaError> {
        self.options.into_request(self.prompt, None)
    }
}

impl GenerateVideoFromImageArgs {
    pub fn into_request(self) -> Result<VideoRequest, MediaError> {
        let prompt = self
            .prompt
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_IMAGE_TO_VIDEO_PROMPT.to_string());
        self.options.into_request(prompt, Some(self.image))
    }
}

impl GetArtifactArgs {
    pub fn include_full_data(&self) -> bool {
        resolve_bool(self.include_full_data.as_ref(), false)
    }
}

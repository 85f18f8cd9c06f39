use serde::{Deserialize, Serialize};

use crate::errors::MediaError;
use crate::media::{AspectRatio, ImageInput, PersonGeneration};

pub const PROMPT_MAX_CHARS: usize = 1000;
pub const DEFAULT_IMAGE_TO_VIDEO_PROMPT: &str = "Generate a video from this image";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub number_of_images: u32,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            number_of_images: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConfig {
    pub aspect_ratio: AspectRatio,
    pub person_generation: PersonGeneration,
    pub number_of_videos: u32,
    pub duration_seconds: u32,
    pub enhance_prompt: bool,
    pub negative_prompt: String,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            aspect_ratio: AspectRatio::default(),
            person_generation: PersonGeneration::default(),
            number_of_videos: 1,
            duration_seconds: 5,
            enhance_prompt: false,
            negative_prompt: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub prompt: String,
    pub config: ImageConfig,
    pub include_full_data: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub source_image: Option<ImageInput>,
    pub config: VideoConfig,
    pub include_full_data: bool,
    pub auto_download: bool,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            config: ImageConfig::default(),
            include_full_data: false,
        }
    }

    pub fn validate(&self) -> Result<(), MediaError> {
        validate_prompt(&self.prompt)?;
        if !(1..=4).contains(&self.config.number_of_images) {
            return Err(MediaError::InvalidRequest(format!(
                "numberOfImages must be between 1 and 4 (got {})",
                self.config.number_of_images
            )));
        }
        Ok(())
    }
}

impl VideoRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            source_image: None,
            config: VideoConfig::default(),
            include_full_data: false,
            auto_download: true,
        }
    }

    pub fn validate(&self) -> Result<(), MediaError> {
        validate_prompt(&self.prompt)?;
        let config = &self.config;
        if !matches!(config.number_of_videos, 1 | 2) {
            return Err(MediaError::InvalidRequest(format!(
                "numberOfVideos must be 1 or 2 (got {})",
                config.number_of_videos
            )));
        }
        if !(5..=8).contains(&config.duration_seconds) {
            return Err(MediaError::InvalidRequest(format!(
                "durationSeconds must be between 5 and 8 (got {})",
                config.duration_seconds
            )));
        }
        if let Some(ImageInput::Reference(raw)) = &self.source_image {
            if raw.trim().is_empty() {
                return Err(MediaError::InvalidRequest("image must not be empty".to_string()));
            }
        }
        Ok(())
    }
}

fn validate_prompt(prompt: &str) -> Result<(), MediaError> {
    let chars = prompt.chars().count();
    if chars == 0 || chars > PROMPT_MAX_CHARS {
        return Err(MediaError::InvalidRequest(format!(
            "prompt must be 1-{PROMPT_MAX_CHARS} characters (got {chars})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{ImageRequest, VideoRequest, PROMPT_MAX_CHARS};
    use crate::errors::MediaError;
    use crate::media::{AspectRatio, ImageInput, PersonGeneration};

    #[test]
    fn video_defaults_match_declared_options() {
        let request = VideoRequest::new("a wave");
        assert_eq!(request.config.aspect_ratio, AspectRatio::Landscape);
        assert_eq!(request.config.person_generation, PersonGeneration::DontAllow);
        assert_eq!(request.config.number_of_videos, 1);
        assert_eq!(request.config.duration_seconds, 5);
        assert!(!request.config.enhance_prompt);
        assert!(request.config.negative_prompt.is_empty());
        assert!(!request.include_full_data);
        assert!(request.auto_download);
    }

    #[test]
    fn prompt_length_is_bounded() {
        assert!(ImageRequest::new("a cat").validate().is_ok());
        assert!(matches!(
            ImageRequest::new("").validate(),
            Err(MediaError::InvalidRequest(_))
        ));
        let long = "x".repeat(PROMPT_MAX_CHARS + 1);
        assert!(ImageRequest::new(long).validate().is_err());
        let exact = "é".repeat(PROMPT_MAX_CHARS);
        assert!(ImageRequest::new(exact).validate().is_ok());
    }

    #[test]
    fn output_counts_and_duration_are_checked() {
        let mut image = ImageRequest::new("a cat");
        image.config.number_of_images = 5;
        assert!(image.validate().is_err());
        image.config.number_of_images = 4;
        assert!(image.validate().is_ok());

        let mut video = VideoRequest::new("a wave");
        video.config.number_of_videos = 3;
        assert!(video.validate().is_err());
        video.config.number_of_videos = 2;
        video.config.duration_seconds = 9;
        assert!(video.validate().is_err());
        video.config.duration_seconds = 8;
        assert!(video.validate().is_ok());

        video.source_image = Some(ImageInput::Reference("  ".to_string()));
        assert!(video.validate().is_err());
    }

}

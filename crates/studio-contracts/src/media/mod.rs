pub mod args;
pub mod options;
pub mod request;

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use args::{
    GenerateImageArgs, GenerateVideoFromImageArgs, GenerateVideoFromTextArgs, GetArtifactArgs, VideoOptionArgs,
};
pub use options::{resolve_bool, BoolOption};
pub use request::{
    ImageConfig, ImageRequest, VideoConfig, VideoRequest,
    DEFAULT_IMAGE_TO_VIDEO_PROMPT, PROMPT_MAX_CHARS,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Image, MediaKind::Video];

    /// Directory under the storage root, also the locator scheme.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "images",
            Self::Video => "videos",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Image => "Image",
            Self::Video => "Video",
        }
    }

    pub fn resource_uri(self, id: &str) -> String {
        format!("{}://{}", self.dir_name(), id)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Some(Self::Image),
            "video" | "videos" => Some(Self::Video),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "image",
            Self::Video => "video",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PersonGeneration {
    #[default]
    DontAllow,
    AllowAdult,
}

impl PersonGeneration {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DontAllow => "dont_allow",
            Self::AllowAdult => "allow_adult",
        }
    }
}

/// An image handed to image-to-video generation.
///
/// The string form is dispatched by the input normalizer: URL first, then
/// filesystem path, otherwise base64 data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ImageInput {
    Content(ImageContent),
    Reference(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub mime_type: String,
    /// Base64 encoded image bytes.
    pub data: String,
}

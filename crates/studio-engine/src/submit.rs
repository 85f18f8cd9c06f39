use studio_contracts::media::{ImageRequest, VideoRequest};
use studio_contracts::{GenerationApiKind, MediaError};

use crate::input::ResolvedImage;
use crate::poller::GenerationJob;
use crate::provider::{ImageGeneration, MediaProvider, VideoSubmission};

pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Bytes of the first generated image.
#[derive(Debug, Clone, PartialEq)]
pub struct FirstImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub returned: usize,
}

pub struct JobSubmitter<'a> {
    provider: &'a dyn MediaProvider,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(provider: &'a dyn MediaProvider) -> Self {
        Self { provider }
    }

    pub fn generate_image(&self, request: &ImageRequest) -> Result<FirstImage, MediaError> {
        let results = self.provider.generate_images(&ImageGeneration {
            prompt: &request.prompt,
            config: &request.config,
        })?;
        let returned = results.len();
        let Some(first) = results.into_iter().next() else {
            return Err(MediaError::api(
                GenerationApiKind::EmptyResult,
                format!("{} returned zero images", self.provider.name()),
            ));
        };
        let bytes = first.bytes.filter(|bytes| !bytes.is_empty()).ok_or_else(|| {
            MediaError::api(
                GenerationApiKind::MissingPayload,
                format!("{} returned an image without bytes", self.provider.name()),
            )
        })?;
        Ok(FirstImage {
            bytes,
            mime_type: first
                .mime_type
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_IMAGE_MIME.to_string()),
            returned,
        })
    }

    pub fn submit_video(
        &self,
        request: &VideoRequest,
        image: Option<&ResolvedImage>,
    ) -> Result<GenerationJob, MediaError> {
        let handle = self.provider.submit_video(&VideoSubmission {
            prompt: &request.prompt,
            config: &request.config,
            image,
        })?;
        handle.map(GenerationJob::submitted).ok_or_else(|| {
            MediaError::api(
                GenerationApiKind::SubmissionFailed,
                format!("{} returned no operation handle", self.provider.name()),
            )
        })
    }
}

//! Tool-level operations: parsed arguments in, [`ToolResponse`] out.
//! Shared by the MCP server and the one-shot CLI commands.

use studio_contracts::media::{
    GenerateImageArgs, GenerateVideoFromImageArgs, GenerateVideoFromTextArgs, GetArtifactArgs, MediaKind,
    VideoRequest,
};
use studio_contracts::MediaError;

use crate::engine::{ArtifactLibrary, MediaEngine};
use crate::poller::CancelToken;
use crate::response::ToolResponse;

pub fn generate_image(engine: &MediaEngine, args: GenerateImageArgs) -> ToolResponse {
    let request = match args.into_request() {
        Ok(request) => request,
        Err(err) => return rejected(&err),
    };
    tracing::info!(prompt_chars = request.prompt.chars().count(), "generateImage");
    match engine.generate_image(&request) {
        Ok(outcome) => ToolResponse::image_generated(&outcome, request.include_full_data),
        Err(err) => ToolResponse::failure(&err),
    }
}

pub fn generate_video_from_text(
    engine: &MediaEngine,
    args: GenerateVideoFromTextArgs,
    cancel: &CancelToken,
) -> ToolResponse {
    tracing::info!("generateVideoFromText");
    run_video(engine, args.into_request(), cancel)
}

pub fn generate_video_from_image(
    engine: &MediaEngine,
    args: GenerateVideoFromImageArgs,
    cancel: &CancelToken,
) -> ToolResponse {
    tracing::info!("generateVideoFromImage");
    run_video(engine, args.into_request(), cancel)
}

pub fn get_artifact(library: &ArtifactLibrary, kind: MediaKind, args: GetArtifactArgs) -> ToolResponse {
    let include_data = args.include_full_data();
    match library.get(kind, args.id.trim(), include_data) {
        Ok(artifact) => ToolResponse::artifact_retrieved(&artifact),
        Err(err) => ToolResponse::failure(&err),
    }
}

pub fn list_artifacts(library: &ArtifactLibrary, kind: MediaKind) -> ToolResponse {
    match library.list(kind) {
        Ok(records) => {
            tracing::info!(kind = %kind, count = records.len(), "listed artifacts");
            ToolResponse::artifacts_listed(kind, &records)
        }
        Err(err) => {
            tracing::error!(kind = %kind, error = %err, "listing failed");
            ToolResponse::failure(&err)
        }
    }
}

fn run_video(
    engine: &MediaEngine,
    request: Result<VideoRequest, MediaError>,
    cancel: &CancelToken,
) -> ToolResponse {
    let request = match request {
        Ok(request) => request,
        Err(err) => return rejected(&err),
    };
    match engine.generate_video(&request, cancel) {
        Ok(outcome) => ToolResponse::video_generated(&outcome, request.include_full_data),
        Err(err) => ToolResponse::failure(&err),
    }
}

fn rejected(err: &MediaError) -> ToolResponse {
    tracing::warn!(error = %err, "rejected tool arguments");
    ToolResponse::failure(err)
}

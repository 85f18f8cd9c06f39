use std::sync::Arc;

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use studio_contracts::media::{
    GenerateImageArgs, GenerateVideoFromImageArgs, GenerateVideoFromTextArgs, GetArtifactArgs, MediaKind,
};
use studio_engine::{tools, CancelToken, MediaEngine, ToolResponse};

/// Cancels the poll of a tool call whose future was dropped.
struct CancelOnDrop(CancelToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

#[derive(Clone)]
pub struct StudioServer {
    engine: Arc<MediaEngine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl StudioServer {
    pub fn new(engine: Arc<MediaEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "generateImage",
        description = "Generate an image from a text prompt and store it under images://{id}"
    )]
    async fn generate_image(&self, Parameters(args): Parameters<GenerateImageArgs>) -> Result<CallToolResult, McpError> {
        self.blocking(move |engine, _| tools::generate_image(engine, args)).await
    }

    #[tool(
        name = "generateVideoFromText",
        description = "Generate a video from a text prompt. Blocks until the provider finishes or the poll times out"
    )]
    async fn generate_video_from_text(
        &self,
        Parameters(args): Parameters<GenerateVideoFromTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.blocking(move |engine, cancel| tools::generate_video_from_text(engine, args, cancel))
            .await
    }

    #[tool(
        name = "generateVideoFromImage",
        description = "Animate an image (content object, URL, file path or base64) into a video"
    )]
    async fn generate_video_from_image(
        &self,
        Parameters(args): Parameters<GenerateVideoFromImageArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.blocking(move |engine, cancel| tools::generate_video_from_image(engine, args, cancel))
            .await
    }

    #[tool(name = "getImage", description = "Fetch a stored image's metadata by id, optionally with its bytes")]
    async fn get_image(&self, Parameters(args): Parameters<GetArtifactArgs>) -> Result<CallToolResult, McpError> {
        self.blocking(move |engine, _| tools::get_artifact(engine.library(), MediaKind::Image, args))
            .await
    }

    #[tool(name = "getVideo", description = "Fetch a stored video's metadata by id, optionally with its bytes")]
    async fn get_video(&self, Parameters(args): Parameters<GetArtifactArgs>) -> Result<CallToolResult, McpError> {
        self.blocking(move |engine, _| tools::get_artifact(engine.library(), MediaKind::Video, args))
            .await
    }

    #[tool(name = "listGeneratedImages", description = "List every stored image, oldest first")]
    async fn list_generated_images(&self) -> Result<CallToolResult, McpError> {
        self.blocking(|engine, _| tools::list_artifacts(engine.library(), MediaKind::Image))
            .await
    }

    #[tool(name = "listGeneratedVideos", description = "List every stored video, oldest first")]
    async fn list_generated_videos(&self) -> Result<CallToolResult, McpError> {
        self.blocking(|engine, _| tools::list_artifacts(engine.library(), MediaKind::Video))
            .await
    }
}

impl StudioServer {
    /// Runs `work` on the blocking pool. Dropping the returned future cancels
    /// any video poll the work is waiting on.
    async fn blocking<F>(&self, work: F) -> Result<CallToolResult, McpError>
    where
        F: FnOnce(&MediaEngine, &CancelToken) -> ToolResponse + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let cancel = CancelToken::new();
        let _guard = CancelOnDrop(cancel.clone());
        let response = tokio::task::spawn_blocking(move || work(&engine, &cancel))
            .await
            .map_err(|err| McpError::internal_error(format!("tool task failed: {err}"), None))?;
        Ok(call_result(response))
    }
}

#[tool_handler]
impl ServerHandler for StudioServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Generates images and videos from prompts. Results are stored locally and addressed as images://{id} or videos://{id}; use the get and list tools to retrieve them."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Inline media first, then the JSON payload as text.
pub fn call_result(response: ToolResponse) -> CallToolResult {
    let text = response.payload_text();
    let mut content = Vec::with_capacity(2);
    if let Some(inline) = response.inline {
        content.push(Content::image(inline.data, inline.mime_type));
    }
    content.push(Content::text(text));
    if response.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

pub async fn serve_stdio(engine: Arc<MediaEngine>) -> anyhow::Result<()> {
    tracing::info!(provider = engine.provider_name(), "serving MCP tools on stdio");
    let service = StudioServer::new(engine).serve(stdio()).await?;
    service.waiting().await?;
    tracing::info!("MCP client disconnected");
    Ok(())
}

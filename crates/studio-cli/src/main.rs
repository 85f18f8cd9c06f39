mod server;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use studio_contracts::media::{
    AspectRatio, BoolOption, GenerateImageArgs, GenerateVideoFromImageArgs, GenerateVideoFromTextArgs,
    GetArtifactArgs, ImageInput, MediaKind, PersonGeneration, VideoOptionArgs,
};
use studio_engine::{tools, ArtifactLibrary, CancelToken, EngineConfig, MediaEngine, ToolResponse};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Parser)]
#[command(name = "studio-mcp", version, about = "Image and video generation over MCP")]
struct Cli {
    /// Storage root; overrides STORAGE_DIR.
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,
    /// Event log path; overrides STUDIO_EVENTS_PATH.
    #[arg(long, global = true)]
    events: Option<PathBuf>,
    /// Dotenv file loaded before reading the environment (default `.env`).
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the generation tools over stdio.
    Serve,
    Image(ImageArgs),
    Video(VideoArgs),
    Get(GetArgs),
    List(ListArgs),
}

#[derive(Debug, Args)]
struct ImageArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    number_of_images: Option<u32>,
    #[arg(long)]
    include_full_data: bool,
}

#[derive(Debug, Args)]
struct VideoArgs {
    #[arg(long)]
    prompt: Option<String>,
    /// URL, file path or base64 data; switches to image-to-video.
    #[arg(long)]
    image: Option<String>,
    #[arg(long, value_parser = parse_wire::<AspectRatio>)]
    aspect_ratio: Option<AspectRatio>,
    #[arg(long, value_parser = parse_wire::<PersonGeneration>)]
    person_generation: Option<PersonGeneration>,
    #[arg(long)]
    number_of_videos: Option<u32>,
    #[arg(long)]
    duration_seconds: Option<u32>,
    #[arg(long)]
    enhance_prompt: bool,
    #[arg(long)]
    negative_prompt: Option<String>,
    #[arg(long)]
    include_full_data: bool,
    /// Leave the result on the provider and only report its URL.
    #[arg(long)]
    no_download: bool,
}

#[derive(Debug, Args)]
struct GetArgs {
    #[arg(long, value_parser = parse_kind)]
    kind: MediaKind,
    #[arg(long)]
    id: String,
    #[arg(long)]
    include_full_data: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, value_parser = parse_kind)]
    kind: MediaKind,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("studio-mcp error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    load_env_file(cli.env_file.as_ref())?;
    init_tracing();

    let mut config = EngineConfig::from_env()?;
    if let Some(dir) = cli.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(path) = cli.events {
        config.events_path = Some(path);
    }

    match cli.command {
        Command::Serve => run_serve(&config),
        Command::Image(args) => {
            let engine = MediaEngine::from_config(&config)?;
            Ok(print_response(&tools::generate_image(&engine, args.into_tool_args())))
        }
        Command::Video(args) => {
            let engine = MediaEngine::from_config(&config)?;
            let cancel = CancelToken::new();
            let response = match args.image.clone() {
                Some(image) => {
                    tools::generate_video_from_image(&engine, args.into_image_tool_args(image), &cancel)
                }
                None => tools::generate_video_from_text(&engine, args.into_text_tool_args()?, &cancel),
            };
            Ok(print_response(&response))
        }
        Command::Get(args) => {
            let library = ArtifactLibrary::open(&config)?;
            let tool_args = GetArtifactArgs {
                id: args.id,
                include_full_data: Some(BoolOption::from(args.include_full_data)),
            };
            Ok(print_response(&tools::get_artifact(&library, args.kind, tool_args)))
        }
        Command::List(args) => {
            let library = ArtifactLibrary::open(&config)?;
            Ok(print_response(&tools::list_artifacts(&library, args.kind)))
        }
    }
}

/// The engine outlives the runtime so its blocking HTTP clients are never
/// dropped on an async worker.
fn run_serve(config: &EngineConfig) -> Result<i32> {
    let engine = Arc::new(MediaEngine::from_config(config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let served = runtime.block_on(server::serve_stdio(Arc::clone(&engine)));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    drop(engine);
    served?;
    Ok(0)
}

fn load_env_file(path: Option<&PathBuf>) -> Result<()> {
    match path {
        Some(path) => {
            dotenvy::from_path(path).with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_response(response: &ToolResponse) -> i32 {
    println!("{}", response.payload_text());
    if response.is_error {
        1
    } else {
        0
    }
}

fn parse_kind(raw: &str) -> Result<MediaKind, String> {
    MediaKind::parse(raw).ok_or_else(|| format!("unknown kind {raw:?} (expected image or video)"))
}

fn parse_wire<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(Value::String(raw.trim().to_string())).map_err(|err| err.to_string())
}

impl ImageArgs {
    fn into_tool_args(self) -> GenerateImageArgs {
        GenerateImageArgs {
            prompt: self.prompt,
            number_of_images: self.number_of_images,
            include_full_data: Some(BoolOption::from(self.include_full_data)),
        }
    }
}

impl VideoArgs {
    fn options(&self) -> VideoOptionArgs {
        VideoOptionArgs {
            aspect_ratio: self.aspect_ratio,
            person_generation: self.person_generation,
            number_of_videos: self.number_of_videos,
            duration_seconds: self.duration_seconds.map(f64::from),
            enhance_prompt: Some(BoolOption::from(self.enhance_prompt)),
            negative_prompt: self.negative_prompt.clone(),
            include_full_data: Some(BoolOption::from(self.include_full_data)),
            auto_download: Some(BoolOption::from(!self.no_download)),
        }
    }

    fn into_text_tool_args(self) -> Result<GenerateVideoFromTextArgs> {
        let options = self.options();
        let prompt = self.prompt.context("--prompt is required without --image")?;
        Ok(GenerateVideoFromTextArgs { prompt, options })
    }

    fn into_image_tool_args(self, image: String) -> GenerateVideoFromImageArgs {
        GenerateVideoFromImageArgs {
            image: ImageInput::Reference(image),
            options: self.options(),
            prompt: self.prompt,
        }
    }
}

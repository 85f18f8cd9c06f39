pub mod config;
pub mod engine;
pub mod genai;
pub mod input;
pub mod poller;
pub mod provider;
pub mod response;
pub mod submit;
pub mod tools;

pub use config::EngineConfig;
pub use engine::{ArtifactLibrary, ImageOutcome, MediaEngine, RetrievedArtifact, VideoOutcome};
pub use poller::{CancelToken, PollSettings};
pub use response::{InlineMedia, ToolResponse};

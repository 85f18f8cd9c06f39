pub mod artifacts;
pub mod errors;
pub mod events;
pub mod media;

pub use errors::{GenerationApiKind, InputResolutionKind, MediaError};

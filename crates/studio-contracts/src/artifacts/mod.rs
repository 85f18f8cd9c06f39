pub mod index;
pub mod record;
pub mod store;

pub use index::{MetadataIndex, Records};
pub use record::ArtifactRecord;
pub use store::{extension_for, ArtifactStore, NewArtifact};

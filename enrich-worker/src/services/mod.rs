//! External collaborators: queue service, feature registry, artifact store and
//! the tile packaging tool

pub mod artifact_store;
pub mod packager;
pub mod queue_client;
pub mod registry_client;

pub use artifact_store::{artifact_key, ArtifactStore, HttpArtifactStore};
pub use packager::{ExternalPackager, TilePackager};
pub use queue_client::{HttpQueueClient, QueueClient, QueueError};
pub use registry_client::{FeatureRegistry, RegistryClient};

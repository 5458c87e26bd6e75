//! Data model handed to message handlers.

pub mod artifact;
pub mod description;
pub mod identity;

pub use artifact::ArtifactRef;
pub use description::{
    ACK_DEADLINE_MULTIPLIER, MessageDescription, PubsubType, RETENTION_DEADLINE_MILLIS,
    ack_deadline_millis,
};
pub use identity::NodeIdentity;

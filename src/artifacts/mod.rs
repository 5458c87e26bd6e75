//! Artifact extraction from message payloads.
//!
//! The receiver only depends on the [`ArtifactExtractor`] contract. The
//! shipped [`MessageArtifactTranslator`] either reads an `artifacts` array
//! straight from a JSON payload, or renders a JSON template with values taken
//! from the payload.

pub mod translator;

pub use translator::{ArtifactExtractor, MessageArtifactTranslator};

//! The `utils` module provides definitions shared across the `pubsub_bridge`
//! crate: error types and logging setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;

//! # pubsub-bridge
//!
//! `pubsub_bridge` attaches to a named broker subscription, translates every
//! delivered message into a [`MessageDescription`](model::MessageDescription)
//! and hands it to an application handler together with a single-use
//! [`Acknowledger`](subscriber::Acknowledger).
//!
//! ## Core Modules
//!
//! - `subscriber`: the subscriber, its message receiver, acknowledger and failure reporting.
//! - `model`: data handed to handlers (`MessageDescription`, `ArtifactRef`, `NodeIdentity`).
//! - `artifacts`: extraction of artifact references from payloads.
//! - `transport`: broker bindings (popsub WebSocket broker, in-process broker).
//! - `config`: loading settings from files and the environment.
//! - `utils`: error types and logging setup.

pub mod artifacts;
pub mod config;
pub mod model;
pub mod subscriber;
pub mod transport;
pub mod utils;

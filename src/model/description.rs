//! Normalized description of one delivered message.
//!
//! A `MessageDescription` is built once per delivery by the message receiver
//! and moved into the handler. It is never mutated afterwards.
//!
//! Timing fields:
//! - `ack_deadline_millis`: application-level ceiling on processing time,
//!   [`ACK_DEADLINE_MULTIPLIER`] times the broker-configured deadline
//! - `retention_deadline_millis`: how long idempotency records for the message
//!   may be kept, fixed at the broker's maximum retention of 7 days

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ArtifactRef;

pub const ACK_DEADLINE_MULTIPLIER: u64 = 5;

pub const RETENTION_DEADLINE_MILLIS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Ack deadline handed to handlers for a broker-configured deadline in seconds.
pub fn ack_deadline_millis(ack_deadline_seconds: u64) -> u64 {
    ACK_DEADLINE_MULTIPLIER
        .saturating_mul(ack_deadline_seconds)
        .saturating_mul(1000)
}

/// Broker family that delivered a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PubsubType {
    Google,
    Amazon,
    Popsub,
}

impl PubsubType {
    /// Fully qualified subscription identifier for this broker family.
    pub fn format_subscription_name(self, project: &str, name: &str) -> String {
        match self {
            PubsubType::Google | PubsubType::Popsub => {
                format!("projects/{project}/subscriptions/{name}")
            }
            PubsubType::Amazon => name.to_string(),
        }
    }
}

impl fmt::Display for PubsubType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            PubsubType::Google => "GOOGLE",
            PubsubType::Amazon => "AMAZON",
            PubsubType::Popsub => "POPSUB",
        };
        f.write_str(tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDescription {
    pub subscription_name: String,
    pub message_id: String,
    pub message_payload: String,
    pub pubsub_type: PubsubType,
    pub ack_deadline_millis: u64,
    pub retention_deadline_millis: u64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub artifacts: HashSet<ArtifactRef>,
}

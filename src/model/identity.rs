use std::fmt;

use uuid::Uuid;

/// Identity of this process, passed to every handler so processing can be
/// attributed to a node.
///
/// Built once at startup and cloned into each subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeIdentity(String);

impl NodeIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// `{host}:{uuid}`, with the host taken from `HOSTNAME` (or `COMPUTERNAME`).
    ///
    /// The uuid keeps two processes on one host distinguishable.
    pub fn from_environment() -> Self {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .ok()
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| "unknown-host".to_string());
        Self(format!("{}:{}", host.trim(), Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::utils::error::CredentialsError;

/// Credentials presented to the broker when the subscription connects.
///
/// Read from a JSON file holding either a ready-made `token` or a
/// `username`/`password` pair that is exchanged for one at login.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Credentials {
    Token { token: String },
    Password { username: String, password: String },
}

impl Credentials {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CredentialsError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token { .. } => f.debug_struct("Token").field("token", &"***").finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

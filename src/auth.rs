//! Credential check against a fixed table loaded at startup.
//!
//! The returned identity is the username itself. Nothing downstream verifies
//! it again: the client sends it back as `author` / `userId` and it is taken
//! at face value.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Identity(pub String);

impl Identity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CredentialTable {
    users: HashMap<String, String>,
}

impl CredentialTable {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        CredentialTable {
            users: credentials
                .into_iter()
                .map(|c| (c.username, c.password))
                .collect(),
        }
    }

    /// Reads a JSON array of `{"username", "password"}` objects.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file {}", path.display()))?;
        let credentials: Vec<Credential> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse users file {}", path.display()))?;
        Ok(Self::new(credentials))
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Option<Identity> {
        match self.users.get(username) {
            Some(expected) if expected == password => Some(Identity(username.to_string())),
            _ => None,
        }
    }
}

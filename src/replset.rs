//! Replica set descriptors handed to the watcher manager.
//!
//! A [`Replset`] is produced by whatever discovers replica sets (the
//! orchestrator API, or the static list in the watchdog config) and is
//! read-only from the manager's point of view. Its `name` is the registry key.

use std::fmt;

use serde::Deserialize;

use crate::error::WatchError;

/// One member of a replica set.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Member {
    /// Hostname or IP address.
    pub host: String,
    /// mongod port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    27017
}

impl Member {
    /// Creates a member from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port` form used for connecting.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A named replica set and the members needed to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Replset {
    /// Unique replica set name.
    pub name: String,
    /// Known members.
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Replset {
    /// Creates a replset without members.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Adds a member.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Checks that the descriptor can be used as a registry key.
    pub fn validate(&self) -> Result<(), WatchError> {
        if self.name.trim().is_empty() {
            return Err(WatchError::InvalidReplset {
                reason: "replset name is empty".into(),
            });
        }
        if let Some(m) = self.members.iter().find(|m| m.host.trim().is_empty()) {
            return Err(WatchError::InvalidReplset {
                reason: format!("replset {} has a member with an empty host (port {})", self.name, m.port),
            });
        }
        Ok(())
    }
}

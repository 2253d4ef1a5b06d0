//! Remote-execution credentials
//!
//! A `Connection` describes how to reach a remote host: address, port,
//! username, and exactly one of a private key file or a password. It is
//! immutable once constructed and shared by `Arc` across every task that
//! does not carry its own override.

use std::path::{Path, PathBuf};

use crate::error::ValidationError;

/// How a connection authenticates against the remote host
#[derive(Debug, Clone)]
pub enum ConnectionAuth {
    /// Path to a private key file (checked for existence at construction)
    Key(PathBuf),
    /// Plain password
    Password(String),
}

/// Credential bundle for tasks that reach a remote system
#[derive(Debug, Clone)]
pub struct Connection {
    host: String,
    port: u16,
    username: String,
    auth: ConnectionAuth,
}

impl Connection {
    /// Creates a key-authenticated connection
    ///
    /// Fails if the key file does not exist, so a mistyped path is caught
    /// while the job definition is being built rather than mid-run.
    pub fn with_key(
        host: impl Into<String>,
        username: impl Into<String>,
        key: impl Into<PathBuf>,
        port: Option<u16>,
    ) -> Result<Self, ValidationError> {
        let key = key.into();
        if !key.exists() {
            return Err(ValidationError::MissingKeyFile(key));
        }
        Ok(Self {
            host: host.into(),
            port: port.unwrap_or(22),
            username: username.into(),
            auth: ConnectionAuth::Key(key),
        })
    }

    /// Creates a password-authenticated connection
    pub fn with_password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        port: Option<u16>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.unwrap_or(22),
            username: username.into(),
            auth: ConnectionAuth::Password(password.into()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn auth(&self) -> &ConnectionAuth {
        &self.auth
    }

    /// The key file path, if this connection authenticates with a key
    pub fn key(&self) -> Option<&Path> {
        match &self.auth {
            ConnectionAuth::Key(path) => Some(path),
            ConnectionAuth::Password(_) => None,
        }
    }

    /// `user@host` form used on ssh/rsync command lines
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

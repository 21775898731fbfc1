//! SSH Error types

use std::fmt;

use thiserror::Error;

/// Which half of session establishment failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStage {
    /// Resolving, dialing, SSH handshake or authentication
    Transport,
    /// Opening the channel and negotiating the SFTP subsystem
    Protocol,
}

impl fmt::Display for ConnectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectStage::Transport => f.write_str("transport"),
            ConnectStage::Protocol => f.write_str("protocol"),
        }
    }
}

/// Host key did not match the pinned fingerprint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("SSH-key verification: expected {expected:?} but got {got:?}")]
pub struct TrustError {
    pub expected: String,
    pub got: String,
}

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Failed to resolve address: {0}")]
    Resolve(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Host key rejected: {0}")]
    HostKey(#[from] TrustError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("SFTP negotiation failed: {0}")]
    Protocol(String),
}

impl ConnectError {
    pub fn stage(&self) -> ConnectStage {
        match self {
            ConnectError::Protocol(_) => ConnectStage::Protocol,
            _ => ConnectStage::Transport,
        }
    }
}

impl From<russh::Error> for ConnectError {
    fn from(err: russh::Error) -> Self {
        ConnectError::Transport(err.to_string())
    }
}

impl From<std::io::Error> for ConnectError {
    fn from(err: std::io::Error) -> Self {
        ConnectError::Transport(err.to_string())
    }
}

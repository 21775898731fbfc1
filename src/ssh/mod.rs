//! SSH module - dials the server and negotiates SFTP sessions
//!
//! # Features
//! - Password authentication
//! - Host key pinning (or accept-any with a logged fingerprint)
//! - Connect timeout and optional keepalive

mod client;
mod config;
mod error;
pub mod host_key;
mod session;

pub use client::{ClientHandler, SshSessionFactory};
pub use config::{SftpConfig, ENV_PREFIX};
pub use error::{ConnectError, ConnectStage, TrustError};
pub use host_key::{key_string, HostKeyPolicy};
pub use session::SshSftpSession;

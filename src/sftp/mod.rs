//! SFTP file operations module
//!
//! The [`SftpClient`] facade works against any [`RemoteSession`]; the SSH
//! backed implementation lives in [`crate::ssh`].

pub mod client;
pub mod error;
pub mod path_utils;
pub mod policy;
pub mod remote;
pub mod types;
pub mod walk;

#[cfg(test)]
pub(crate) mod memory;

pub use client::{ClientOptions, SftpClient};
pub use error::{SftpError, TransportError, TransportErrorKind, WalkError, CONNECTION_LOST};
pub use policy::{Disposition, ErrorPolicy, LossClassifier};
pub use remote::{RemoteSession, SessionFactory};
pub use types::*;
pub use walk::Walker;

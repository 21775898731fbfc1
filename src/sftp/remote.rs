//! Session collaborator traits
//!
//! The client never talks to russh directly. It drives a [`RemoteSession`]
//! obtained from a [`SessionFactory`], which lets the reconnect machinery be
//! exercised against any backend.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use super::error::TransportError;
use super::types::RemoteFileEntry;
use super::walk::Walker;
use crate::ssh::ConnectError;

/// An established connection over which remote file operations are issued
#[async_trait]
pub trait RemoteSession: Send + Sync + 'static {
    /// Open remote file handle
    type File: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open an existing file for reading
    async fn open(&self, path: &str) -> Result<Self::File, TransportError>;

    /// Create (or truncate) a file for writing
    async fn create(&self, path: &str) -> Result<Self::File, TransportError>;

    async fn rename(&self, src: &str, dst: &str) -> Result<(), TransportError>;

    async fn remove(&self, path: &str) -> Result<(), TransportError>;

    async fn mkdir(&self, path: &str) -> Result<(), TransportError>;

    /// List a directory, excluding `.` and `..`
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteFileEntry>, TransportError>;

    /// Describe a single path without following a trailing symlink
    async fn stat(&self, path: &str) -> Result<RemoteFileEntry, TransportError>;

    async fn close(&self) -> Result<(), TransportError>;

    /// Whether the transport under this session is known to be gone
    fn is_transport_closed(&self) -> bool {
        false
    }

    /// Depth-first walk rooted at `root`
    fn walk(&self, root: &str) -> Walker<'_, Self>
    where
        Self: Sized,
    {
        Walker::new(self, root)
    }
}

/// Dials and negotiates a fresh [`RemoteSession`]
///
/// Invoked once at client construction and again for every reconnect attempt.
/// Implementations must not retry internally.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: RemoteSession;

    async fn connect(&self) -> Result<Self::Session, ConnectError>;
}

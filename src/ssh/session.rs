//! russh-sftp backed remote session

use async_trait::async_trait;
use russh::client::Handle;
use russh_sftp::client::error::Error as SftpErrorInner;
use russh_sftp::client::fs::{File, Metadata};
use russh_sftp::client::SftpSession as RusshSftpSession;
use russh_sftp::protocol::StatusCode;
use tracing::{debug, info};

use super::client::ClientHandler;
use crate::sftp::path_utils::join_remote_path;
use crate::sftp::error::is_closed_channel_message;
use crate::sftp::{
    FileType, RemoteFileEntry, RemoteSession, TransportError, TransportErrorKind,
};

/// An SSH connection carrying one SFTP channel
///
/// The SSH handle is kept alongside the SFTP session so the connection lives
/// exactly as long as this value.
pub struct SshSftpSession {
    sftp: RusshSftpSession,
    handle: Handle<ClientHandler>,
}

impl SshSftpSession {
    pub fn new(sftp: RusshSftpSession, handle: Handle<ClientHandler>) -> Self {
        Self { sftp, handle }
    }

    /// Whether the underlying SSH connection has been closed
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    fn map_error(&self, err: SftpErrorInner, path: &str) -> TransportError {
        map_sftp_error(err, path, self.is_closed())
    }
}

/// Map SFTP errors to our error type
///
/// russh-sftp reports a dead channel as an internal failure ("session
/// closed", "sender dropped", a failed send or receive) rather than a status
/// code, so those become `ConnectionLost`. Any failure seen after the SSH
/// connection has closed is `ConnectionLost` too.
fn map_sftp_error(err: SftpErrorInner, path: &str, transport_closed: bool) -> TransportError {
    let kind = match &err {
        _ if transport_closed => TransportErrorKind::ConnectionLost,
        SftpErrorInner::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => TransportErrorKind::NotFound,
            StatusCode::PermissionDenied => TransportErrorKind::PermissionDenied,
            StatusCode::ConnectionLost | StatusCode::NoConnection => {
                TransportErrorKind::ConnectionLost
            }
            _ => TransportErrorKind::Other,
        },
        SftpErrorInner::UnexpectedBehavior(msg) | SftpErrorInner::IO(msg)
            if is_closed_channel_message(msg) =>
        {
            TransportErrorKind::ConnectionLost
        }
        SftpErrorInner::Timeout => TransportErrorKind::Timeout,
        SftpErrorInner::IO(_) => TransportErrorKind::Io,
        _ => TransportErrorKind::Other,
    };
    TransportError::new(kind, format!("{}: {}", path, err))
}

fn entry_from_metadata(path: &str, name: String, metadata: &Metadata) -> RemoteFileEntry {
    let file_type = if metadata.is_dir() {
        FileType::Directory
    } else if metadata.is_symlink() {
        FileType::Symlink
    } else if metadata.is_regular() {
        FileType::File
    } else {
        FileType::Unknown
    };

    RemoteFileEntry {
        name,
        path: path.to_string(),
        file_type,
        size: metadata.size.unwrap_or(0),
        modified: metadata.mtime.map(|t| t as i64).unwrap_or(0),
        permissions: metadata
            .permissions
            .map(|p| format!("{:o}", p & 0o777))
            .unwrap_or_else(|| "000".to_string()),
    }
}

#[async_trait]
impl RemoteSession for SshSftpSession {
    type File = File;

    fn is_transport_closed(&self) -> bool {
        self.is_closed()
    }

    async fn open(&self, path: &str) -> Result<File, TransportError> {
        debug!("Opening remote file: {}", path);
        self.sftp
            .open(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn create(&self, path: &str) -> Result<File, TransportError> {
        debug!("Creating remote file: {}", path);
        self.sftp
            .create(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), TransportError> {
        info!("Renaming {} to {}", src, dst);
        self.sftp
            .rename(src, dst)
            .await
            .map_err(|e| self.map_error(e, src))
    }

    async fn remove(&self, path: &str) -> Result<(), TransportError> {
        info!("Deleting: {}", path);
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn mkdir(&self, path: &str) -> Result<(), TransportError> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| self.map_error(e, path))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteFileEntry>, TransportError> {
        let read_dir = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| self.map_error(e, path))?;

        let entries: Vec<RemoteFileEntry> = read_dir
            .into_iter()
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let name = entry.file_name();
                let full_path = join_remote_path(path, &name);
                entry_from_metadata(&full_path, name, &entry.metadata())
            })
            .collect();

        debug!("Listed {} entries in {}", entries.len(), path);
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> Result<RemoteFileEntry, TransportError> {
        let metadata = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| self.map_error(e, path))?;

        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Ok(entry_from_metadata(path, name, &metadata))
    }

    async fn close(&self) -> Result<(), TransportError> {
        info!("Closing SFTP session");
        let closed = self.sftp.close().await.map_err(|e| self.map_error(e, "/"));
        let _ = self
            .handle
            .disconnect(russh::Disconnect::ByApplication, "Session closed", "en")
            .await;
        closed
    }
}

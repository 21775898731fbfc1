//! SFTP error types

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Literal that marks an error as a lost transport.
///
/// Transport errors of kind [`TransportErrorKind::ConnectionLost`] always carry
/// it in their rendered message, so message-based and kind-based
/// classification agree.
pub const CONNECTION_LOST: &str = "connection lost";

/// Wording used by russh-sftp and tokio once the channel under a session has
/// gone away
const CLOSED_CHANNEL_MARKERS: &[&str] = &[
    CONNECTION_LOST,
    "session closed",
    "sender dropped",
    "senderror",
    "recverror",
    "channel closed",
    "broken pipe",
    "connection reset",
];

/// Whether an error message says the underlying channel is gone
pub fn is_closed_channel_message(message: &str) -> bool {
    let message = message.to_lowercase();
    CLOSED_CHANNEL_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Coarse classification of a failed remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The underlying SSH/SFTP connection is unusable
    ConnectionLost,
    NotFound,
    PermissionDenied,
    Timeout,
    /// Stream-level I/O failure that was not identified as connection loss
    Io,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::ConnectionLost => CONNECTION_LOST,
            TransportErrorKind::NotFound => "not found",
            TransportErrorKind::PermissionDenied => "permission denied",
            TransportErrorKind::Timeout => "timed out",
            TransportErrorKind::Io => "i/o error",
            TransportErrorKind::Other => "failure",
        };
        f.write_str(s)
    }
}

/// Failure reported by a remote session operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::ConnectionLost, message)
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, path)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_connection_lost(&self) -> bool {
        self.kind == TransportErrorKind::ConnectionLost
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        let kind = match err.kind() {
            ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected => TransportErrorKind::ConnectionLost,
            ErrorKind::NotFound => TransportErrorKind::NotFound,
            ErrorKind::PermissionDenied => TransportErrorKind::PermissionDenied,
            ErrorKind::TimedOut => TransportErrorKind::Timeout,
            // russh-sftp file handles surface channel failures as `Other`
            _ if is_closed_channel_message(&err.to_string()) => TransportErrorKind::ConnectionLost,
            _ => TransportErrorKind::Io,
        };
        TransportError::new(kind, err.to_string())
    }
}

/// Errors returned by [`SftpClient`](super::SftpClient) operations
#[derive(Error, Debug)]
pub enum SftpError {
    #[error("Remote operation failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Local file {path}: {source}")]
    LocalIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Client is closed")]
    Closed,
}

impl SftpError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        SftpError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The transport error behind this failure, if any
    pub fn transport(&self) -> Option<&TransportError> {
        match self {
            SftpError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

/// A remote walk that stopped early
///
/// `partial` holds every file path collected before the failing step; callers
/// must treat it as incomplete.
#[derive(Error, Debug)]
#[error("Walk aborted after {} file(s): {source}", partial.len())]
pub struct WalkError {
    pub partial: Vec<String>,
    #[source]
    pub source: SftpError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_lost_message_carries_marker() {
        let err = TransportError::connection_lost("channel closed");
        assert!(err.to_string().contains(CONNECTION_LOST));

        let wrapped = SftpError::from(err);
        assert!(wrapped.to_string().contains(CONNECTION_LOST));
    }

    #[test]
    fn test_other_kinds_do_not_carry_marker() {
        for kind in [
            TransportErrorKind::NotFound,
            TransportErrorKind::PermissionDenied,
            TransportErrorKind::Timeout,
            TransportErrorKind::Io,
            TransportErrorKind::Other,
        ] {
            let err = TransportError::new(kind, "/data/report.csv");
            assert!(!err.to_string().contains(CONNECTION_LOST), "{kind:?}");
        }
    }

    #[test]
    fn test_io_error_mapping() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(TransportError::from(reset).is_connection_lost());

        let eof = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert_eq!(TransportError::from(eof).kind(), TransportErrorKind::Io);
    }

    #[test]
    fn test_file_handle_channel_failure_is_connection_lost() {
        let closed = std::io::Error::new(
            std::io::ErrorKind::Other,
            "Unexpected behavior: session closed",
        );
        assert!(TransportError::from(closed).is_connection_lost());

        let quota = std::io::Error::new(std::io::ErrorKind::Other, "disk quota exceeded");
        assert_eq!(TransportError::from(quota).kind(), TransportErrorKind::Io);
    }

    #[test]
    fn test_closed_channel_messages() {
        assert!(is_closed_channel_message("SendError: channel closed"));
        assert!(is_closed_channel_message("Unexpected behavior: sender dropped"));
        assert!(!is_closed_channel_message("No such file"));
    }

    #[test]
    fn test_walk_error_reports_partial_count() {
        let err = WalkError {
            partial: vec!["/a".to_string(), "/b".to_string()],
            source: SftpError::Closed,
        };
        assert!(err.to_string().starts_with("Walk aborted after 2 file(s)"));
    }
}

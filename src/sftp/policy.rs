//! Error disposition and connection-loss classification
//!
//! Every facade operation funnels its failures through a [`LossClassifier`]
//! to decide whether the supervisor should redial, and through an
//! [`ErrorPolicy`] to decide whether the caller sees the error at all.

use std::fmt;
use std::sync::Arc;

use super::error::{SftpError, TransportErrorKind, CONNECTION_LOST};

/// What an operation does with an error after it has been logged and routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return the error to the caller
    Propagate,
    /// Return an empty success
    Swallow,
}

/// Per-operation error handling
///
/// The default keeps the long-standing behavior of the client: directory
/// listings and text uploads report failure only through the logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorPolicy {
    /// `files`: swallowed errors yield an empty listing
    pub list_errors: Disposition,
    /// `put_string`: swallowed errors yield `Ok(())`
    pub put_string_errors: Disposition,
    /// Whether local read failures in `put_file` reach the connection-loss
    /// handler
    pub route_local_io_errors: bool,
}

impl Default for ErrorPolicy {
    fn default() -> Self {
        Self {
            list_errors: Disposition::Swallow,
            put_string_errors: Disposition::Swallow,
            route_local_io_errors: true,
        }
    }
}

impl ErrorPolicy {
    /// Every error reaches the caller; local errors never trigger a reconnect
    pub fn strict() -> Self {
        Self {
            list_errors: Disposition::Propagate,
            put_string_errors: Disposition::Propagate,
            route_local_io_errors: false,
        }
    }
}

/// Decides whether an error means the transport is gone
#[derive(Clone)]
pub enum LossClassifier {
    /// Rendered error contains the given text
    MessageContains(String),
    /// Error is a transport error of kind `ConnectionLost`
    TransportKind,
    Custom(Arc<dyn Fn(&SftpError) -> bool + Send + Sync>),
}

impl Default for LossClassifier {
    fn default() -> Self {
        LossClassifier::MessageContains(CONNECTION_LOST.to_string())
    }
}

impl fmt::Debug for LossClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossClassifier::MessageContains(needle) => {
                f.debug_tuple("MessageContains").field(needle).finish()
            }
            LossClassifier::TransportKind => f.write_str("TransportKind"),
            LossClassifier::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl LossClassifier {
    pub fn custom(f: impl Fn(&SftpError) -> bool + Send + Sync + 'static) -> Self {
        LossClassifier::Custom(Arc::new(f))
    }

    pub fn is_connection_lost(&self, error: &SftpError) -> bool {
        match self {
            LossClassifier::MessageContains(needle) => error.to_string().contains(needle.as_str()),
            LossClassifier::TransportKind => error
                .transport()
                .map(|e| e.kind() == TransportErrorKind::ConnectionLost)
                .unwrap_or(false),
            LossClassifier::Custom(f) => f(error),
        }
    }
}

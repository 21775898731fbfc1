//! Session supervision
//!
//! Owns the current SFTP session and replaces it in the background when the
//! transport breaks.

mod supervisor;

pub use supervisor::{ReconnectRequest, ReconnectSupervisor, SupervisorState};

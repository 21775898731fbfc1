//! resilient-sftp - An SFTP client that keeps itself connected
//!
//! Built on russh and russh-sftp. File operations go through [`SftpClient`];
//! a background supervisor redials whenever an operation reports a lost
//! connection.

pub mod session;
pub mod sftp;
pub mod ssh;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use session::{ReconnectSupervisor, SupervisorState};
pub use sftp::{
    ClientOptions, ErrorPolicy, LossClassifier, ReconnectOutcome, RemoteFileEntry, SftpClient,
    SftpError, WalkError,
};
pub use ssh::{ConnectError, SftpConfig, SshSessionFactory, SshSftpSession};

/// Client backed by a real SSH connection
pub type SshSftpClient = SftpClient<SshSftpSession>;

/// Connect to the server described by `config`
pub async fn connect(config: SftpConfig) -> Result<SshSftpClient, ConnectError> {
    SftpClient::connect(SshSessionFactory::new(config)).await
}

/// Initialize logging
///
/// Honors `RUST_LOG`, defaulting to `info`. Calling it twice is a no-op.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

//! SSH Client implementation using russh

use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh::keys::PublicKey;
use russh_sftp::client::SftpSession as RusshSftpSession;
use tracing::{debug, info, warn};

use super::config::SftpConfig;
use super::error::ConnectError;
use super::host_key::HostKeyPolicy;
use super::session::SshSftpSession;
use crate::sftp::SessionFactory;

/// Dials the configured server and negotiates an SFTP session
///
/// Stateless apart from the configuration; every call is an independent
/// attempt with no retries.
#[derive(Debug, Clone)]
pub struct SshSessionFactory {
    config: Arc<SftpConfig>,
}

impl SshSessionFactory {
    pub fn new(config: SftpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SftpConfig {
        &self.config
    }

    /// Connect, authenticate and start the SFTP subsystem
    pub async fn connect(&self) -> Result<SshSftpSession, ConnectError> {
        let addr = self.config.address();

        info!("Connecting to SSH server at {}", addr);

        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| ConnectError::Resolve(format!("{}: {}", addr, e)))?
            .next()
            .ok_or_else(|| ConnectError::Resolve(format!("{}: no address found", addr)))?;

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: self.config.keepalive_secs.map(Duration::from_secs),
            keepalive_max: 3,
            ..Default::default()
        };

        let handler = ClientHandler::new(HostKeyPolicy::from_trusted_key(
            self.config.trusted_key(),
        ));

        let timeout = self.config.connect_timeout();
        let mut handle = tokio::time::timeout(
            timeout,
            client::connect(Arc::new(ssh_config), socket_addr, handler),
        )
        .await
        .map_err(|_| ConnectError::Timeout(format!("{} after {:?}", addr, timeout)))??;

        debug!("SSH handshake completed");

        let authenticated = handle
            .authenticate_password(&self.config.username, &self.config.password)
            .await
            .map_err(|e| ConnectError::Authentication(e.to_string()))?;

        if !authenticated.success() {
            return Err(ConnectError::Authentication(
                "Authentication rejected by server".to_string(),
            ));
        }

        info!("SSH authentication successful for {}", self.config.username);

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| ConnectError::Protocol(format!("Failed to open channel: {}", e)))?;

        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| {
                ConnectError::Protocol(format!("Failed to request SFTP subsystem: {}", e))
            })?;

        let sftp = RusshSftpSession::new(channel.into_stream())
            .await
            .map_err(|e| ConnectError::Protocol(e.to_string()))?;

        info!("SFTP subsystem opened on {}", addr);

        Ok(SshSftpSession::new(sftp, handle))
    }
}

#[async_trait]
impl SessionFactory for SshSessionFactory {
    type Session = SshSftpSession;

    async fn connect(&self) -> Result<SshSftpSession, ConnectError> {
        SshSessionFactory::connect(self).await
    }
}

/// Client handler for russh callbacks
///
/// Only host key verification is handled; the connection carries nothing but
/// the SFTP channel.
pub struct ClientHandler {
    policy: HostKeyPolicy,
}

impl ClientHandler {
    pub fn new(policy: HostKeyPolicy) -> Self {
        Self { policy }
    }
}

impl client::Handler for ClientHandler {
    type Error = ConnectError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        match self.policy.verify(server_public_key) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Host key rejected: {}", e);
                Err(e.into())
            }
        }
    }
}

//! Resilient SFTP client
//!
//! `SftpClient` is the file-operation facade. Each call borrows the current
//! session from the [`ReconnectSupervisor`], and every failure is offered to
//! [`SftpClient::connection_lost_handler`], which asks the supervisor for a
//! fresh session when the transport looks broken. The failing call itself is
//! never retried.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info};

use super::error::{SftpError, TransportError, WalkError};
use super::path_utils::ancestor_dirs;
use super::policy::{Disposition, ErrorPolicy, LossClassifier};
use super::remote::{RemoteSession, SessionFactory};
use super::types::{ReconnectOutcome, RemoteFileEntry};
use crate::session::{ReconnectRequest, ReconnectSupervisor, SupervisorState};
use crate::ssh::ConnectError;

/// Chunk size for uploads
const CHUNK_SIZE: usize = 64 * 1024;

/// Label used for the in-memory source of `put_string`
const TEXT_SOURCE: &str = "<text>";

/// Behavior knobs fixed at construction
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub policy: ErrorPolicy,
    pub classifier: LossClassifier,
    /// Upper bound for each operation, `None` for no bound
    pub deadline: Option<Duration>,
}

struct ClientInner<S: RemoteSession> {
    supervisor: ReconnectSupervisor<S>,
    policy: ErrorPolicy,
    classifier: LossClassifier,
}

/// SFTP client that keeps itself connected
///
/// Cheap to clone; clones share the session and the supervisor but each
/// carries its own deadline (see [`SftpClient::with_deadline`]).
pub struct SftpClient<S: RemoteSession> {
    inner: Arc<ClientInner<S>>,
    deadline: Option<Duration>,
}

impl<S: RemoteSession> Clone for SftpClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            deadline: self.deadline,
        }
    }
}

impl<S: RemoteSession> SftpClient<S> {
    /// Dial once with `factory` and start supervising the session
    ///
    /// A failed initial connect is returned as is; nothing is retried and no
    /// supervisor is started.
    pub async fn connect<F>(factory: F) -> Result<Self, ConnectError>
    where
        F: SessionFactory<Session = S>,
    {
        Self::connect_with(factory, ClientOptions::default()).await
    }

    pub async fn connect_with<F>(factory: F, options: ClientOptions) -> Result<Self, ConnectError>
    where
        F: SessionFactory<Session = S>,
    {
        let session = factory.connect().await.map_err(|e| {
            error!("Connect fail: {}", e);
            e
        })?;
        info!("SFTP client connected");
        Ok(Self::from_session(factory, session, options))
    }

    /// Wrap an already established session
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_session<F>(factory: F, session: S, options: ClientOptions) -> Self
    where
        F: SessionFactory<Session = S>,
    {
        let supervisor = ReconnectSupervisor::spawn(factory, session);
        Self {
            inner: Arc::new(ClientInner {
                supervisor,
                policy: options.policy,
                classifier: options.classifier,
            }),
            deadline: options.deadline,
        }
    }

    /// A handle whose operations fail with [`SftpError::Timeout`] after `deadline`
    pub fn with_deadline(&self, deadline: Duration) -> Self {
        Self {
            inner: self.inner.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn subscribe_reconnects(&self) -> broadcast::Receiver<ReconnectOutcome> {
        self.inner.supervisor.subscribe()
    }

    pub fn supervisor_state(&self) -> SupervisorState {
        self.inner.supervisor.state()
    }

    pub fn supervisor(&self) -> &ReconnectSupervisor<S> {
        &self.inner.supervisor
    }

    /// Decide whether `err` means the transport is gone and, if so, ask the
    /// supervisor to redial
    ///
    /// Never waits for the reconnect. Returns `true` when a reconnect is
    /// pending because of this call or an earlier one.
    pub fn connection_lost_handler(&self, err: &SftpError) -> bool {
        if !self.inner.classifier.is_connection_lost(err) {
            debug!("Not a lost connection, no reconnect: {}", err);
            return false;
        }
        info!("Reconnecting...");
        self.inner
            .supervisor
            .request_reconnect(ReconnectRequest::new(err.to_string()))
    }

    fn session(&self) -> Result<Arc<S>, SftpError> {
        self.inner.supervisor.current().ok_or(SftpError::Closed)
    }

    /// Log and route a failure, handing it back for the caller
    fn fail(&self, context: &str, err: SftpError) -> SftpError {
        let err = self.escalate(err);
        error!("{}: {}", context, err);
        self.connection_lost_handler(&err);
        err
    }

    /// Report a transport failure as a lost connection when the current
    /// session's transport is already closed
    fn escalate(&self, err: SftpError) -> SftpError {
        match err {
            SftpError::Transport(e) if !e.is_connection_lost() => {
                let closed = self
                    .inner
                    .supervisor
                    .current()
                    .map(|session| session.is_transport_closed())
                    .unwrap_or(false);
                if closed {
                    SftpError::Transport(TransportError::connection_lost(e.to_string()))
                } else {
                    SftpError::Transport(e)
                }
            }
            other => other,
        }
    }

    async fn bounded<T, Fut>(&self, fut: Fut) -> Result<T, SftpError>
    where
        Fut: Future<Output = Result<T, SftpError>>,
    {
        match self.deadline {
            None => fut.await,
            Some(deadline) => timeout(deadline, fut)
                .await
                .unwrap_or(Err(SftpError::Timeout(deadline))),
        }
    }

    /// Open a remote file for reading
    pub async fn open_file(&self, path: &str) -> Result<S::File, SftpError> {
        self.bounded(async { Ok::<_, SftpError>(self.session()?.open(path).await?) })
            .await
            .map_err(|e| self.fail(&format!("Open file {}", path), e))
    }

    /// Open `path` and hand the reader to `parse`
    ///
    /// `parse` runs only if the open succeeded.
    pub async fn get_records<T, P, Fut>(&self, path: &str, parse: P) -> Result<T, SftpError>
    where
        P: FnOnce(S::File) -> Fut,
        Fut: Future<Output = Result<T, SftpError>>,
    {
        let file = self.open_file(path).await?;
        self.bounded(parse(file))
            .await
            .map_err(|e| self.fail(&format!("Read records from {}", path), e))
    }

    /// Immediate children of `dir`
    pub async fn files(&self, dir: &str) -> Result<Vec<RemoteFileEntry>, SftpError> {
        match self
            .bounded(async { Ok::<_, SftpError>(self.session()?.read_dir(dir).await?) })
            .await
        {
            Ok(entries) => Ok(entries),
            Err(e) => {
                let e = self.fail(&format!("List directory {}", dir), e);
                match self.inner.policy.list_errors {
                    Disposition::Swallow => Ok(Vec::new()),
                    Disposition::Propagate => Err(e),
                }
            }
        }
    }

    /// Paths of every non-directory entry under `dir`, in walk order
    ///
    /// The first failing step ends the walk; the paths gathered so far are
    /// returned inside the error.
    pub async fn walk_files(&self, dir: &str) -> Result<Vec<String>, WalkError> {
        let session = match self.session() {
            Ok(session) => session,
            Err(e) => {
                return Err(WalkError {
                    partial: Vec::new(),
                    source: self.fail(&format!("Walk {}", dir), e),
                })
            }
        };

        let deadline = self.deadline.map(|d| (Instant::now() + d, d));
        let mut walker = session.walk(dir);
        let mut files = Vec::new();

        loop {
            let step = match deadline {
                None => walker.step().await.map(|r| r.map_err(SftpError::from)),
                Some((at, d)) => match timeout_at(at, walker.step()).await {
                    Ok(step) => step.map(|r| r.map_err(SftpError::from)),
                    Err(_) => Some(Err(SftpError::Timeout(d))),
                },
            };

            match step {
                None => break,
                Some(Ok(entry)) => {
                    if !entry.is_dir() {
                        files.push(entry.path);
                    }
                }
                Some(Err(e)) => {
                    return Err(WalkError {
                        source: self.fail(&format!("Walk {} ({} files so far)", dir, files.len()), e),
                        partial: files,
                    })
                }
            }
        }

        debug!("Walked {}: {} files", dir, files.len());
        Ok(files)
    }

    pub async fn move_file(&self, src: &str, dst: &str) -> Result<(), SftpError> {
        self.bounded(async { Ok::<_, SftpError>(self.session()?.rename(src, dst).await?) })
            .await
            .map_err(|e| self.fail(&format!("Move {} to {}", src, dst), e))
    }

    pub async fn remove_file(&self, path: &str) -> Result<(), SftpError> {
        self.bounded(async { Ok::<_, SftpError>(self.session()?.remove(path).await?) })
            .await
            .map_err(|e| self.fail(&format!("Remove {}", path), e))
    }

    /// Upload a local file, creating missing remote parent directories
    ///
    /// Returns the number of bytes written.
    pub async fn put_file(
        &self,
        local_path: impl AsRef<Path>,
        remote_path: &str,
    ) -> Result<u64, SftpError> {
        let local_path = local_path.as_ref();
        let local_label = local_path.display().to_string();

        let mut source = match tokio::fs::File::open(local_path).await {
            Ok(file) => file,
            Err(e) => {
                let err = SftpError::LocalIo {
                    path: local_label,
                    source: e,
                };
                error!("Open local file: {}", err);
                if self.inner.policy.route_local_io_errors {
                    self.connection_lost_handler(&err);
                }
                return Err(err);
            }
        };

        let result = self
            .bounded(self.upload(&mut source, &local_label, remote_path))
            .await;

        match result {
            Ok(bytes) => {
                info!("Uploaded {} to {} ({} bytes)", local_label, remote_path, bytes);
                Ok(bytes)
            }
            Err(err @ SftpError::LocalIo { .. }) if !self.inner.policy.route_local_io_errors => {
                error!("Upload {} to {}: {}", local_label, remote_path, err);
                Err(err)
            }
            Err(e) => Err(self.fail(&format!("Upload {} to {}", local_label, remote_path), e)),
        }
    }

    /// Write `text` to a remote file, creating missing parent directories
    pub async fn put_string(&self, text: &str, remote_path: &str) -> Result<(), SftpError> {
        let mut source = text.as_bytes();
        let result = self
            .bounded(self.upload(&mut source, TEXT_SOURCE, remote_path))
            .await;

        match result {
            Ok(bytes) => {
                debug!("Wrote {} bytes to {}", bytes, remote_path);
                Ok(())
            }
            Err(e) => {
                let e = self.fail(&format!("Write {}", remote_path), e);
                match self.inner.policy.put_string_errors {
                    Disposition::Swallow => Ok(()),
                    Disposition::Propagate => Err(e),
                }
            }
        }
    }

    async fn upload<R>(
        &self,
        source: &mut R,
        source_label: &str,
        remote_path: &str,
    ) -> Result<u64, SftpError>
    where
        R: AsyncRead + Unpin,
    {
        let session = self.session()?;
        make_parent_dirs(session.as_ref(), remote_path).await;
        let mut dest = session.create(remote_path).await?;
        copy_chunks(source, &mut dest, source_label).await
    }

    /// Stop the supervisor and close the current session
    ///
    /// Affects every clone. Later operations fail with [`SftpError::Closed`];
    /// closing twice is a no-op.
    pub async fn close(&self) -> Result<(), SftpError> {
        self.inner.supervisor.shutdown().await;
        match self.inner.supervisor.take_session() {
            Some(session) => {
                info!("Closing SFTP client");
                session.close().await.map_err(SftpError::from)
            }
            None => Ok(()),
        }
    }
}

/// Create every ancestor of `remote_path`, root first
///
/// Failures are ignored; an ancestor that already exists fails like any
/// other, and a real problem resurfaces when the file itself is created.
async fn make_parent_dirs<S: RemoteSession>(session: &S, remote_path: &str) {
    for dir in ancestor_dirs(remote_path) {
        if let Err(e) = session.mkdir(&dir).await {
            debug!("mkdir {}: {}", dir, e);
        }
    }
}

async fn copy_chunks<R, W>(reader: &mut R, writer: &mut W, source_label: &str) -> Result<u64, SftpError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut transferred: u64 = 0;

    loop {
        let n = reader
            .read(&mut buffer)
            .await
            .map_err(|e| SftpError::LocalIo {
                path: source_label.to_string(),
                source: e,
            })?;
        if n == 0 {
            break;
        }

        writer
            .write_all(&buffer[..n])
            .await
            .map_err(TransportError::from)?;
        transferred += n as u64;
    }

    writer.flush().await.map_err(TransportError::from)?;
    writer.shutdown().await.map_err(TransportError::from)?;

    Ok(transferred)
}

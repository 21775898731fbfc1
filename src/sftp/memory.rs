//! In-memory remote file system for tests
//!
//! `MemoryFs` is shared by every session it hands out, so a factory can
//! "reconnect" to the same tree. Sessions can be broken from the outside to
//! simulate a dropped transport.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{self, Read};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::Semaphore;

use super::error::{TransportError, TransportErrorKind};
use super::path_utils::{ancestor_dirs, parent_remote_path};
use super::remote::{RemoteSession, SessionFactory};
use super::types::{FileType, RemoteFileEntry};
use crate::ssh::ConnectError;

#[derive(Default)]
struct FsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    mkdir_calls: Vec<String>,
    /// Returned by the next operations, one per call
    injected: VecDeque<TransportError>,
    /// Returned by every open, stat or listing of the path
    failing_paths: BTreeMap<String, TransportError>,
    fail_writes: bool,
    /// Broken sessions fail with plain I/O errors instead of a lost connection
    quiet_drop: bool,
    sessions: Vec<Arc<AtomicBool>>,
}

#[derive(Clone)]
pub(crate) struct MemoryFs {
    state: Arc<Mutex<FsState>>,
}

fn normalize(path: &str) -> String {
    if path.len() > 1 {
        path.trim_end_matches('/').to_string()
    } else {
        path.to_string()
    }
}

fn lost_io() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionReset, "connection lost")
}

impl MemoryFs {
    pub fn new() -> Self {
        let mut state = FsState::default();
        state.dirs.insert("/".to_string());
        state.dirs.insert(String::new());
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn session(&self) -> MemorySession {
        let broken = Arc::new(AtomicBool::new(false));
        self.state.lock().sessions.push(broken.clone());
        MemorySession {
            fs: self.clone(),
            broken,
            closed: AtomicBool::new(false),
        }
    }

    pub fn add_file(&self, path: &str, content: &[u8]) {
        let mut state = self.state.lock();
        for dir in ancestor_dirs(path) {
            state.dirs.insert(dir);
        }
        state.files.insert(normalize(path), content.to_vec());
    }

    pub fn add_dir(&self, path: &str) {
        let path = normalize(path);
        let mut state = self.state.lock();
        for dir in ancestor_dirs(&path) {
            state.dirs.insert(dir);
        }
        state.dirs.insert(path);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state.lock().dirs.contains(path)
    }

    pub fn mkdir_calls(&self) -> Vec<String> {
        self.state.lock().mkdir_calls.clone()
    }

    pub fn fail_next(&self, err: TransportError) {
        self.state.lock().injected.push_back(err);
    }

    pub fn fail_path(&self, path: &str, err: TransportError) {
        self.state.lock().failing_paths.insert(normalize(path), err);
    }

    pub fn fail_writes(&self) {
        self.state.lock().fail_writes = true;
    }

    /// Break every session handed out so far without saying the connection
    /// was lost
    pub fn drop_quietly(&self) {
        self.state.lock().quiet_drop = true;
        self.break_sessions();
    }

    /// Break every session handed out so far
    pub fn break_sessions(&self) {
        for broken in &self.state.lock().sessions {
            broken.store(true, Ordering::SeqCst);
        }
    }
}

pub(crate) struct MemorySession {
    fs: MemoryFs,
    broken: Arc<AtomicBool>,
    closed: AtomicBool,
}

impl MemorySession {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), TransportError> {
        if self.broken.load(Ordering::SeqCst) || self.is_closed() {
            if self.fs.state.lock().quiet_drop {
                return Err(TransportError::new(TransportErrorKind::Io, "unexpected eof"));
            }
            return Err(TransportError::connection_lost("session is gone"));
        }
        match self.fs.state.lock().injected.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn check_path(&self, path: &str) -> Result<(), TransportError> {
        match self.fs.state.lock().failing_paths.get(path) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn entry(state: &FsState, path: &str) -> Option<RemoteFileEntry> {
        if state.dirs.contains(path) {
            Some(RemoteFileEntry::new(path, FileType::Directory))
        } else {
            state
                .files
                .get(path)
                .map(|data| RemoteFileEntry::new(path, FileType::File).with_size(data.len() as u64))
        }
    }

    fn file_handle(&self, path: String, content: Vec<u8>) -> MemoryFile {
        MemoryFile {
            path,
            reader: io::Cursor::new(content),
            state: self.fs.state.clone(),
            broken: self.broken.clone(),
        }
    }
}

#[async_trait]
impl RemoteSession for MemorySession {
    type File = MemoryFile;

    async fn open(&self, path: &str) -> Result<MemoryFile, TransportError> {
        self.check()?;
        let path = normalize(path);
        self.check_path(&path)?;
        let content = self
            .fs
            .state
            .lock()
            .files
            .get(&path)
            .cloned()
            .ok_or_else(|| TransportError::not_found(path.clone()))?;
        Ok(self.file_handle(path, content))
    }

    async fn create(&self, path: &str) -> Result<MemoryFile, TransportError> {
        self.check()?;
        let path = normalize(path);
        {
            let mut state = self.fs.state.lock();
            if !state.dirs.contains(parent_remote_path(&path)) {
                return Err(TransportError::not_found(path));
            }
            if state.dirs.contains(&path) {
                return Err(TransportError::other(format!("{} is a directory", path)));
            }
            state.files.insert(path.clone(), Vec::new());
        }
        Ok(self.file_handle(path, Vec::new()))
    }

    async fn rename(&self, src: &str, dst: &str) -> Result<(), TransportError> {
        self.check()?;
        let (src, dst) = (normalize(src), normalize(dst));
        let mut state = self.fs.state.lock();
        if !state.dirs.contains(parent_remote_path(&dst)) {
            return Err(TransportError::not_found(dst));
        }
        match state.files.remove(&src) {
            Some(data) => {
                state.files.insert(dst, data);
                Ok(())
            }
            None => Err(TransportError::not_found(src)),
        }
    }

    async fn remove(&self, path: &str) -> Result<(), TransportError> {
        self.check()?;
        let path = normalize(path);
        match self.fs.state.lock().files.remove(&path) {
            Some(_) => Ok(()),
            None => Err(TransportError::not_found(path)),
        }
    }

    async fn mkdir(&self, path: &str) -> Result<(), TransportError> {
        let path = normalize(path);
        self.fs.state.lock().mkdir_calls.push(path.clone());
        self.check()?;

        let mut state = self.fs.state.lock();
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(TransportError::other(format!("{} already exists", path)));
        }
        if !state.dirs.contains(parent_remote_path(&path)) {
            return Err(TransportError::not_found(path));
        }
        state.dirs.insert(path);
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteFileEntry>, TransportError> {
        self.check()?;
        let path = normalize(path);
        self.check_path(&path)?;
        let state = self.fs.state.lock();
        if !state.dirs.contains(&path) {
            return Err(TransportError::not_found(path));
        }

        let children = state
            .dirs
            .iter()
            .chain(state.files.keys())
            .filter(|candidate| **candidate != path && parent_remote_path(candidate) == path)
            .filter_map(|candidate| Self::entry(&state, candidate))
            .collect();
        Ok(children)
    }

    async fn stat(&self, path: &str) -> Result<RemoteFileEntry, TransportError> {
        self.check()?;
        let path = normalize(path);
        self.check_path(&path)?;
        let state = self.fs.state.lock();
        Self::entry(&state, &path).ok_or_else(|| TransportError::not_found(path))
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_transport_closed(&self) -> bool {
        self.broken.load(Ordering::SeqCst) || self.is_closed()
    }
}

pub(crate) struct MemoryFile {
    path: String,
    reader: io::Cursor<Vec<u8>>,
    state: Arc<Mutex<FsState>>,
    broken: Arc<AtomicBool>,
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(lost_io()));
        }
        match this.reader.read(buf.initialize_unfilled()) {
            Ok(n) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            Err(e) => Poll::Ready(Err(e)),
        }
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(lost_io()));
        }
        let mut state = this.state.lock();
        if state.fail_writes {
            return Poll::Ready(Err(io::Error::new(io::ErrorKind::Other, "disk quota exceeded")));
        }
        match state.files.get_mut(&this.path) {
            Some(data) => {
                data.extend_from_slice(buf);
                Poll::Ready(Ok(buf.len()))
            }
            None => Poll::Ready(Err(io::Error::new(io::ErrorKind::NotFound, "file vanished"))),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if self.broken.load(Ordering::SeqCst) {
            return Poll::Ready(Err(lost_io()));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

#[derive(Default)]
struct FactoryState {
    /// `true` connects, `false` refuses; an empty script always connects
    script: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

/// Scripted [`SessionFactory`] over a [`MemoryFs`]
#[derive(Clone)]
pub(crate) struct MemoryFactory {
    fs: MemoryFs,
    inner: Arc<FactoryState>,
}

impl MemoryFactory {
    pub fn new(fs: MemoryFs) -> Self {
        Self {
            fs,
            inner: Arc::new(FactoryState::default()),
        }
    }

    pub fn scripted(fs: MemoryFs, script: impl IntoIterator<Item = bool>) -> Self {
        Self::build(fs, script, None)
    }

    /// Every connect waits for a permit on `gate` before resolving
    pub fn gated(fs: MemoryFs, gate: Arc<Semaphore>) -> Self {
        Self::build(fs, [], Some(gate))
    }

    fn build(
        fs: MemoryFs,
        script: impl IntoIterator<Item = bool>,
        gate: Option<Arc<Semaphore>>,
    ) -> Self {
        let state = FactoryState {
            script: Mutex::new(script.into_iter().collect()),
            gate,
            ..Default::default()
        };
        Self {
            fs,
            inner: Arc::new(state),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MemoryFactory {
    type Session = MemorySession;

    async fn connect(&self) -> Result<MemorySession, ConnectError> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.inner.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let accept = self.inner.script.lock().pop_front().unwrap_or(true);
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        if accept {
            Ok(self.fs.session())
        } else {
            Err(ConnectError::Transport("connection refused".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_injected_error_is_consumed_once() {
        let fs = MemoryFs::new();
        fs.fail_next(TransportError::new(TransportErrorKind::PermissionDenied, "/x"));
        let session = fs.session();
        assert!(session.stat("/").await.is_err());
        assert!(session.stat("/").await.is_ok());
    }

    #[tokio::test]
    async fn test_broken_session_reports_connection_lost() {
        let fs = MemoryFs::new();
        let session = fs.session();
        fs.break_sessions();
        let err = session.read_dir("/").await.unwrap_err();
        assert!(err.is_connection_lost());

        // Sessions created afterwards are healthy
        assert!(fs.session().read_dir("/").await.is_ok());
    }
}

//! Reconnect Supervisor
//!
//! This module implements the "single owner" pattern for the current SFTP
//! session.
//!
//! # Architecture
//!
//! One background task services reconnect requests, strictly one at a time.
//! It is the only writer of the session slot; file operations read the slot,
//! clone the `Arc` out and release the lock before doing any I/O, so an
//! operation never waits for a reconnect to finish.
//!
//! ```text
//! facade op ──error──▶ request_reconnect() ──mpsc(1)──▶ supervisor loop
//!                                                       │ factory.connect()
//!     slot (RwLock<Option<Arc<S>>>) ◀──── swap on success┘
//!                                                       │
//!     subscribe() ◀──────────── broadcast(ReconnectOutcome)
//! ```
//!
//! Requests arriving while one is already queued are coalesced into it.
//! Outcomes are broadcast and never wait for a listener.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::sftp::{ReconnectOutcome, RemoteSession, SessionFactory};

/// Buffered outcomes per subscriber before the oldest are dropped
const OUTCOME_CAPACITY: usize = 16;

/// Supervisor state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SupervisorState {
    /// Waiting for a reconnect request
    Idle = 0,
    /// One connect attempt in flight
    Reconnecting = 1,
    /// Loop has exited; requests are dropped
    Stopped = 2,
}

impl SupervisorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Idle,
            1 => Self::Reconnecting,
            _ => Self::Stopped,
        }
    }
}

/// "Transport appears broken, attempt to re-establish"
#[derive(Debug, Clone)]
pub struct ReconnectRequest {
    /// Rendered error that triggered the request
    pub cause: String,
}

impl ReconnectRequest {
    pub fn new(cause: impl Into<String>) -> Self {
        Self {
            cause: cause.into(),
        }
    }
}

struct Shared<S> {
    slot: RwLock<Option<Arc<S>>>,
    state: AtomicU8,
    attempts: AtomicU64,
    generation: AtomicU64,
    outcome_tx: broadcast::Sender<ReconnectOutcome>,
}

impl<S> Shared<S> {
    fn set_state(&self, state: SupervisorState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn publish(&self, outcome: ReconnectOutcome) {
        if self.outcome_tx.send(outcome).is_err() {
            debug!("No reconnect outcome listeners");
        }
    }
}

/// Handle to the background reconnect task and the session slot it owns
pub struct ReconnectSupervisor<S: RemoteSession> {
    shared: Arc<Shared<S>>,
    request_tx: mpsc::Sender<ReconnectRequest>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<S: RemoteSession> ReconnectSupervisor<S> {
    /// Install `initial` as the current session and start the loop
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<F>(factory: F, initial: S) -> Self
    where
        F: SessionFactory<Session = S>,
    {
        let (request_tx, request_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (outcome_tx, _) = broadcast::channel(OUTCOME_CAPACITY);

        let shared = Arc::new(Shared {
            slot: RwLock::new(Some(Arc::new(initial))),
            state: AtomicU8::new(SupervisorState::Idle as u8),
            attempts: AtomicU64::new(0),
            generation: AtomicU64::new(1),
            outcome_tx,
        });

        let task = tokio::spawn(run_supervisor(
            factory,
            shared.clone(),
            request_rx,
            shutdown_rx,
        ));

        Self {
            shared,
            request_tx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Session new operations should use, `None` once taken by close
    pub fn current(&self) -> Option<Arc<S>> {
        self.shared.slot.read().clone()
    }

    /// Remove the current session from the slot
    pub fn take_session(&self) -> Option<Arc<S>> {
        self.shared.slot.write().take()
    }

    /// Ask for a reconnect without waiting for it
    ///
    /// Returns `true` if a reconnect is now pending (queued by this call or
    /// already queued by an earlier one), `false` if the supervisor has
    /// stopped.
    pub fn request_reconnect(&self, request: ReconnectRequest) -> bool {
        match self.request_tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Reconnect already pending, coalescing request");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Reconnect supervisor stopped, dropping request");
                false
            }
        }
    }

    /// Receive every outcome published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ReconnectOutcome> {
        self.shared.outcome_tx.subscribe()
    }

    pub fn state(&self) -> SupervisorState {
        SupervisorState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Connect attempts started so far
    pub fn attempts(&self) -> u64 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Number of sessions installed so far, the initial one included
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::SeqCst)
    }

    /// Stop the loop and wait for the task to exit
    ///
    /// An attempt in flight is abandoned. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Reconnect supervisor task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_supervisor<F: SessionFactory>(
    factory: F,
    shared: Arc<Shared<F::Session>>,
    mut request_rx: mpsc::Receiver<ReconnectRequest>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!("Reconnect supervisor started");

    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            request = request_rx.recv() => match request {
                Some(request) => request,
                // All handles dropped
                None => break,
            },
        };

        shared.set_state(SupervisorState::Reconnecting);
        let attempt = shared.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        info!("Reconnecting (attempt {}) after: {}", attempt, request.cause);

        let result = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => {
                info!("Shutdown requested during reconnect attempt {}", attempt);
                break;
            }
            result = factory.connect() => result,
        };

        let outcome = match result {
            Ok(session) => {
                let session = Arc::new(session);
                let installed = {
                    let mut slot = shared.slot.write();
                    if slot.is_some() {
                        *slot = Some(session.clone());
                        true
                    } else {
                        false
                    }
                };

                if installed {
                    let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
                    info!("Reconnected (session generation {})", generation);
                    ReconnectOutcome::Reconnected { generation }
                } else {
                    // Client was closed while we were dialing
                    warn!("Client closed during reconnect, discarding new session");
                    let _ = session.close().await;
                    ReconnectOutcome::Failed {
                        error: "client closed during reconnect".to_string(),
                    }
                }
            }
            Err(e) => {
                error!("Reconnect failure: {}", e);
                ReconnectOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        shared.set_state(SupervisorState::Idle);
        shared.publish(outcome);
    }

    shared.set_state(SupervisorState::Stopped);
    info!("Reconnect supervisor stopped");
}

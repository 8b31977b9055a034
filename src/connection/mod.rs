//! Coordination-store connection lifecycle.
//!
//! # Responsibilities
//! - Own the single store connection shared by all announcers
//! - Detect session expiration and transparently re-establish a session
//! - Re-publish every desired-up announcer after a new session
//! - Fan out mark-up-all / mark-down-all with aggregate completion
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting → Connected → (SessionExpired → Connecting) → ...
//! ```
//!
//! # Design Decisions
//! - The manager recovers the *connection*; it never retries individual
//!   caller operations — those surface retryable errors to their callers
//! - Operations arriving during a reconnection window queue in the gate and
//!   replay exactly once against the new session
//! - Shutdown is best-effort: mark-down failures are logged, the callback
//!   still fires exactly once

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;

use crate::announcer::{Announcer, ServerIdentity};
use crate::callback::{Completion, MultiCompletion};
use crate::config::ConnectionConfig;
use crate::connection::backoff::BackoffPolicy;
use crate::connection::gate::StoreGate;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::store::{CoordinationStore, SessionEvent, SessionId, StoreError};

pub mod backoff;
pub mod gate;

/// Observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected(SessionId),
}

/// Manages one persistent store connection for a set of announcers.
pub struct ConnectionManager {
    store: Arc<dyn CoordinationStore>,
    gate: Arc<StoreGate>,
    announcers: Mutex<Vec<Arc<Announcer>>>,
    config: ConnectionConfig,
    lifecycle: Shutdown,
    started: AtomicBool,
    status: Mutex<SessionStatus>,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn CoordinationStore>, config: ConnectionConfig) -> Arc<Self> {
        let gate = StoreGate::new(Arc::clone(&store), config.operation_timeout());
        Arc::new(Self {
            store,
            gate,
            announcers: Mutex::new(Vec::new()),
            config,
            lifecycle: Shutdown::new(),
            started: AtomicBool::new(false),
            status: Mutex::new(SessionStatus::Disconnected),
        })
    }

    /// Create an announcer bound to this manager's store connection.
    pub fn new_announcer(&self, identity: ServerIdentity) -> Arc<Announcer> {
        let announcer = Announcer::new(Arc::clone(&self.gate), identity);
        self.announcers.lock().unwrap().push(Arc::clone(&announcer));
        announcer
    }

    pub fn announcers(&self) -> Vec<Arc<Announcer>> {
        self.announcers.lock().unwrap().clone()
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.lock().unwrap()
    }

    /// Establish the connection. Resolves on the first successful session;
    /// with `start_timeout` configured, resolves `Err(Timeout)` at the bound
    /// while reconnection continues in the background. Never fails
    /// permanently on an unreachable store.
    pub fn start(self: &Arc<Self>, done: Completion) {
        if self.started.swap(true, Ordering::SeqCst) {
            done.resolve(Err(StoreError::BadData(
                "connection manager already started".into(),
            )));
            return;
        }

        let start_done = Arc::new(Mutex::new(Some(done)));
        if let Some(bound) = self.config.start_timeout() {
            let slot = Arc::clone(&start_done);
            tokio::spawn(async move {
                tokio::time::sleep(bound).await;
                if let Some(done) = slot.lock().unwrap().take() {
                    done.resolve(Err(StoreError::Timeout(bound)));
                }
            });
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.session_loop(start_done).await;
        });
    }

    /// Mark up every owned announcer; aggregate completion waits for all and
    /// surfaces the first error.
    pub fn mark_up_all(&self, done: Completion) {
        let announcers = self.announcers();
        let join = MultiCompletion::new(announcers.len(), done);
        for announcer in announcers {
            announcer.mark_up(join.child());
        }
    }

    /// Mark down every owned announcer; same aggregation policy.
    pub fn mark_down_all(&self, done: Completion) {
        let announcers = self.announcers();
        let join = MultiCompletion::new(announcers.len(), done);
        for announcer in announcers {
            announcer.mark_down(join.child());
        }
    }

    /// Best-effort: mark down everything, then close the connection.
    /// The callback fires exactly once even when mark-downs fail.
    pub fn shutdown(self: &Arc<Self>, done: Completion) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let (all_down, handle) = Completion::new();
            this.mark_down_all(all_down);
            match tokio::time::timeout(this.config.shutdown_timeout(), handle.wait()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Mark-down during shutdown failed, closing anyway")
                }
                Err(_) => tracing::warn!("Mark-down during shutdown timed out, closing anyway"),
            }

            this.lifecycle.trigger();
            this.gate.close();
            this.store.close().await;
            *this.status.lock().unwrap() = SessionStatus::Disconnected;
            tracing::info!("Connection manager shut down");
            done.resolve(Ok(()));
        });
    }

    fn set_status(&self, status: SessionStatus) {
        *self.status.lock().unwrap() = status;
    }

    async fn session_loop(self: Arc<Self>, start_done: Arc<Mutex<Option<Completion>>>) {
        let mut shutdown_rx = self.lifecycle.subscribe();
        let mut events = self.store.session_events();
        let backoff = BackoffPolicy::new(self.config.backoff_base(), self.config.backoff_max());

        'sessions: loop {
            self.set_status(SessionStatus::Connecting);
            let mut attempt: u32 = 0;

            let session = loop {
                let connect = tokio::time::timeout(self.config.connect_timeout(), self.store.connect());
                tokio::select! {
                    result = connect => match result {
                        Ok(Ok(session)) => break session,
                        Ok(Err(StoreError::Closed)) => break 'sessions,
                        Ok(Err(e)) => {
                            tracing::warn!(error = %e, attempt, "Store connect failed");
                        }
                        Err(_) => {
                            tracing::warn!(attempt, "Store connect timed out");
                        }
                    },
                    _ = shutdown_rx.recv() => break 'sessions,
                }

                attempt += 1;
                let delay = backoff.delay(attempt);
                metrics::record_reconnect_delay(delay);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => break 'sessions,
                }
            };

            self.set_status(SessionStatus::Connected(session));
            metrics::record_session_established();
            tracing::info!(session = %session, "Coordination store session established");

            if let Some(done) = start_done.lock().unwrap().take() {
                done.resolve(Ok(()));
            }

            // Re-publish desired-up announcers into the (still suspended)
            // gate, then open it: the queue drains in one pass, replaying
            // operations stranded by the old session exactly once.
            for announcer in self.announcers() {
                announcer.republish_if_up();
            }
            self.gate.open();

            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(SessionEvent::SessionExpired) => {
                            tracing::warn!(session = %session, "Session expired, reconnecting");
                            metrics::record_session_expired();
                            self.gate.suspend();
                            continue 'sessions;
                        }
                        Ok(SessionEvent::ConnectionLost) => {
                            tracing::warn!(session = %session, "Connection lost, reconnecting");
                            metrics::record_connection_lost();
                            self.gate.suspend();
                            continue 'sessions;
                        }
                        // Echo of our own connect.
                        Ok(SessionEvent::Connected(_)) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Session event stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break 'sessions,
                    },
                    _ = shutdown_rx.recv() => break 'sessions,
                }
            }
        }

        self.gate.suspend();
        self.set_status(SessionStatus::Disconnected);
        tracing::debug!("Session loop exited");
    }
}

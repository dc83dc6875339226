//! Consumer lifecycle on top of the reconnecting stream connection.
//!
//! [`ConsumerService`] decides when to subscribe: the first consumer
//! subscribes, later ones are replayed the last snapshot, and dismissing the
//! last one unsubscribes. After a reconnect it subscribes again whenever
//! consumers are registered, which yields a fresh snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use topostream_types::Request;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection;
use crate::consumer::Consumer;
use crate::error::ClientError;
use crate::reconcile::Reconciler;

/// State shared between the service handle and the connection task.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) reconciler: Arc<Reconciler>,
    /// Request queue of the open connection, if any.
    requests: Mutex<Option<mpsc::Sender<String>>>,
    connected: AtomicBool,
    subscribed: AtomicBool,
}

impl Shared {
    /// A connection opened. Subscribes if anyone is listening.
    pub(crate) fn on_open(&self, requests: mpsc::Sender<String>) {
        *self.requests.lock().unwrap_or_else(PoisonError::into_inner) = Some(requests);
        self.connected.store(true, Ordering::SeqCst);
        if self.reconciler.consumer_count() > 0 {
            self.subscribe();
        }
    }

    /// The connection closed. The next open starts unsubscribed.
    pub(crate) fn on_close(&self) {
        *self.requests.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.connected.store(false, Ordering::SeqCst);
        self.subscribed.store(false, Ordering::SeqCst);
    }

    /// Send SUBSCRIBE unless already subscribed.
    fn subscribe(&self) {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return;
        }
        let request = Request::subscribe(self.config.criteria());
        if !self.send(&request) {
            self.subscribed.store(false, Ordering::SeqCst);
        }
    }

    /// Send UNSUBSCRIBE if subscribed.
    fn unsubscribe(&self) {
        if self.subscribed.swap(false, Ordering::SeqCst) {
            self.send(&Request::unsubscribe());
        }
    }

    /// Queue a request on the open connection. Returns whether it was queued.
    fn send(&self, request: &Request) -> bool {
        let frame = match request.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Failed to encode request");
                return false;
            }
        };
        let guard = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(requests) = guard.as_ref() else {
            debug!(action = ?request.action, "Not connected, request deferred");
            return false;
        };
        match requests.try_send(frame) {
            Ok(()) => {
                debug!(action = ?request.action, "Request queued");
                true
            }
            Err(e) => {
                warn!(action = ?request.action, error = %e, "Failed to queue request");
                false
            }
        }
    }
}

/// Handle of a running connection task.
struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Connects to a topology stream server and feeds registered consumers.
pub struct ConsumerService {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl ConsumerService {
    /// Create a stopped service.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                reconciler: Arc::new(Reconciler::new()),
                requests: Mutex::new(None),
                connected: AtomicBool::new(false),
                subscribed: AtomicBool::new(false),
            }),
            running: Mutex::new(None),
        }
    }

    /// The reconciliation engine behind this service.
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.shared.reconciler
    }

    /// Register a consumer.
    ///
    /// The first consumer triggers a subscription. A later one receives the
    /// last snapshot straight away if the connection is already subscribed.
    pub fn accept(&self, consumer: Arc<dyn Consumer>) {
        let count = self.shared.reconciler.add_consumer(Arc::clone(&consumer));
        info!(consumers = count, "Consumer added");
        if count == 1 {
            self.shared.subscribe();
        } else if self.is_subscribed() {
            self.shared.reconciler.replay_to(&consumer);
        }
    }

    /// Remove a consumer. Unsubscribes when it was the last one.
    pub fn dismiss(&self, consumer: &Arc<dyn Consumer>) {
        let count = self.shared.reconciler.remove_consumer(consumer);
        info!(consumers = count, "Consumer removed");
        if count == 0 {
            self.shared.unsubscribe();
        }
    }

    /// Spawn the connection task. Must be called from a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyStarted`] if the task is running.
    pub fn start(&self) -> Result<(), ClientError> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(ClientError::AlreadyStarted);
        }
        info!(url = %self.shared.config.url, "Starting consumer service");
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(connection::run(Arc::clone(&self.shared), shutdown_rx));
        *running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Close the connection and stop reconnecting. No-op when stopped.
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(Running { shutdown, task }) = running else {
            return;
        };
        info!("Stopping consumer service");
        let _ = shutdown.send(true);
        if let Err(e) = task.await {
            warn!(error = %e, "Connection task ended abnormally");
        }
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Whether a SUBSCRIBE has been sent on the open connection.
    pub fn is_subscribed(&self) -> bool {
        self.shared.subscribed.load(Ordering::SeqCst)
    }
}

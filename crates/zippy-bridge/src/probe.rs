//! [`LivenessProbe`] – connectivity check against the Ollama server.
//!
//! The probe owns the server endpoint (URL + model) and the last observed
//! [`ConnectivityState`].  It offers two ways to learn whether the server
//! is reachable:
//!
//! * [`probe_sync`][LivenessProbe::probe_sync] issues `GET {url}/ping`,
//!   parks the calling thread until the request settles, stores the result
//!   and publishes it to the `probe_finished` listeners.
//! * [`record_reply`][LivenessProbe::record_reply] absorbs the outcome of
//!   any other request on the shared transport (a background probe or a
//!   prompt submission).  It updates the state but publishes **nothing**, so
//!   listeners miss changes produced this way.
//!
//! Only transport failures count as "disconnected".  Any completed HTTP
//! exchange counts as success, including `404` and `500` replies; the status
//! is logged at `debug` level so the discrepancy stays visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zippy_types::{ConnectivityState, ServerEndpoint};

use crate::events::EventHub;
use crate::transport::{Transport, TransportFailure, TransportReply};

/// Outcome of one request on the shared transport.
pub type ReplyOutcome = Result<TransportReply, TransportFailure>;

/// Liveness probe for a single Ollama endpoint.
pub struct LivenessProbe {
    endpoint: RwLock<ServerEndpoint>,
    connected: Arc<AtomicBool>,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    events: Arc<EventHub>,
    timeout: Duration,
    /// Serializes the request and state write of synchronous probes.
    in_flight: Mutex<()>,
}

impl LivenessProbe {
    /// Create a probe in the [`ConnectivityState::Disconnected`] state.
    ///
    /// Requests are spawned onto `runtime`; each one is abandoned and counted
    /// as a transport failure after `timeout`.
    pub fn new(
        endpoint: ServerEndpoint,
        transport: Arc<dyn Transport>,
        runtime: Handle,
        events: Arc<EventHub>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: RwLock::new(endpoint),
            connected: Arc::new(AtomicBool::new(false)),
            transport,
            runtime,
            events,
            timeout,
            in_flight: Mutex::new(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Endpoint
    // ─────────────────────────────────────────────────────────────────────

    /// Replace both endpoint fields.  Does not probe.
    pub fn configure(&self, url: impl Into<String>, model: impl Into<String>) {
        let mut endpoint = self.endpoint_mut();
        endpoint.url = url.into();
        endpoint.model = model.into();
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.endpoint_mut().url = url.into();
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.endpoint_mut().model = model.into();
    }

    /// Snapshot of the current `(url, model)` pair.
    pub fn endpoint(&self) -> ServerEndpoint {
        self.endpoint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn url(&self) -> String {
        self.endpoint().url
    }

    pub fn model(&self) -> String {
        self.endpoint().model
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connectivity
    // ─────────────────────────────────────────────────────────────────────

    /// Last stored probe result.  Never touches the network.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from(self.is_connected())
    }

    /// Ping the server and block until the request settles.
    ///
    /// Returns `true` iff the transport reported no error.  The result is
    /// stored before `probe_finished` listeners are notified, so a listener
    /// calling [`is_connected`][Self::is_connected] sees the new value.
    ///
    /// Concurrent callers are serialized for the request and the state
    /// store only.  Listeners run after that lock is released, so a
    /// listener may probe again (e.g. a retry while offline).
    ///
    /// Must not be called from inside an async runtime: the calling thread
    /// is parked on a one-shot channel until the spawned request completes.
    pub fn probe_sync(&self) -> bool {
        let success = {
            let _flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);

            let url = self.endpoint().ping_url();
            debug!(%url, "pinging Ollama");
            let success = match self.request_blocking(url.clone()) {
                Ok(reply) => {
                    debug!(%url, status = reply.status, "ping completed");
                    true
                }
                Err(failure) => {
                    warn!(%url, error = %failure, "ping failed");
                    false
                }
            };
            self.connected.store(success, Ordering::SeqCst);
            success
        };

        self.events.emit_probe_finished(success);
        success
    }

    /// Ping the server on the runtime without blocking and without
    /// notifying listeners.  The returned handle resolves to the stored
    /// result.
    pub fn probe_in_background(&self) -> JoinHandle<bool> {
        let url = self.endpoint().ping_url();
        let transport = Arc::clone(&self.transport);
        let connected = Arc::clone(&self.connected);
        let timeout = self.timeout;
        self.runtime.spawn(async move {
            let outcome = get_with_timeout(transport.as_ref(), &url, timeout).await;
            let success = outcome.is_ok();
            connected.store(success, Ordering::SeqCst);
            match &outcome {
                Ok(_) => info!(%url, "background ping successful"),
                Err(failure) => warn!(%url, error = %failure, "background ping failed"),
            }
            success
        })
    }

    /// Absorb the completion of a request issued outside
    /// [`probe_sync`][Self::probe_sync]: success marks the server connected,
    /// a transport failure marks it disconnected.  Listeners are not
    /// notified.
    pub fn record_reply(&self, outcome: &ReplyOutcome) -> bool {
        let success = outcome.is_ok();
        self.connected.store(success, Ordering::SeqCst);
        match outcome {
            Ok(reply) => debug!(status = reply.status, "request completed; server reachable"),
            Err(failure) => warn!(error = %failure, "request failed; server unreachable"),
        }
        success
    }

    fn request_blocking(&self, url: String) -> ReplyOutcome {
        let (tx, rx) = oneshot::channel();
        let transport = Arc::clone(&self.transport);
        let timeout = self.timeout;
        self.runtime.spawn(async move {
            let outcome = get_with_timeout(transport.as_ref(), &url, timeout).await;
            // The receiver only disappears if the caller's thread unwound.
            let _ = tx.send(outcome);
        });
        rx.blocking_recv()
            .unwrap_or_else(|_| Err(TransportFailure::new("ping task ended without a reply")))
    }

    fn endpoint_mut(&self) -> std::sync::RwLockWriteGuard<'_, ServerEndpoint> {
        self.endpoint.write().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn get_with_timeout(transport: &dyn Transport, url: &str, limit: Duration) -> ReplyOutcome {
    match tokio::time::timeout(limit, transport.get(url)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TransportFailure::new(format!(
            "no reply from {url} within {} ms",
            limit.as_millis()
        ))),
    }
}

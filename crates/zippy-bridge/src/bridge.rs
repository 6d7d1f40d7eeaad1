//! [`OllamaBridge`] – the component a front end talks to.
//!
//! Owns every long-lived resource:
//!
//! * a small Tokio runtime that drives all network I/O;
//! * the shared [`Transport`] (one HTTP client for pings, prompts and
//!   model listings);
//! * the [`LivenessProbe`] holding endpoint and connectivity state;
//! * the [`EventHub`] collaborators subscribe to;
//! * the [`RequestWorker`] thread that runs prompt submissions.
//!
//! Pings block the caller; prompts are handed to the worker.  Dropping the
//! bridge joins the worker before the transport and runtime are released,
//! so it must be dropped from a plain thread, not from inside an async task.
//!
//! # Example
//!
//! ```rust,no_run
//! use zippy_bridge::{BridgeConfig, OllamaBridge};
//!
//! let bridge = OllamaBridge::new(&BridgeConfig::default()).expect("bridge");
//! bridge.events().on_probe_finished(|ok| println!("ollama reachable: {ok}"));
//! bridge.events().on_response_received(|text| println!("{text}"));
//!
//! if bridge.ping() {
//!     bridge.generate("When does the advising office open?").expect("queued");
//! }
//! ```

use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use tokio::runtime::Runtime;
use tracing::{debug, info};
use uuid::Uuid;
use zippy_types::{ConnectivityState, GenerateStatus, ModelInfo, PromptRequest, ServerEndpoint, ZippyError};

use crate::config::BridgeConfig;
use crate::events::EventHub;
use crate::generate::{GenerateOptions, PromptJob, StatusTracker};
use crate::probe::LivenessProbe;
use crate::transport::{HttpTransport, Transport};
use crate::worker::RequestWorker;

/// Raw shape of the `/api/tags` JSON response.
#[derive(Debug, Deserialize)]
struct TagsResponse {
    models: Vec<ModelInfo>,
}

/// Bridge between a front end and a local Ollama server.
pub struct OllamaBridge {
    // Field order is drop order: worker first, runtime last.
    worker: RequestWorker,
    probe: Arc<LivenessProbe>,
    events: Arc<EventHub>,
    status: Arc<StatusTracker>,
    transport: Arc<dyn Transport>,
    options: GenerateOptions,
    system_prompt: RwLock<String>,
    runtime: Runtime,
}

impl OllamaBridge {
    /// Build a bridge that talks HTTP through [`HttpTransport`].
    ///
    /// # Errors
    ///
    /// Fails when the runtime, the HTTP client or the worker thread cannot
    /// be created.
    pub fn new(config: &BridgeConfig) -> Result<Self, ZippyError> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a bridge on top of a caller-supplied transport.
    pub fn with_transport(
        config: &BridgeConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ZippyError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("zippy-io")
            .enable_all()
            .build()
            .map_err(|e| ZippyError::Runtime(format!("Failed to start I/O runtime: {e}")))?;

        let events = Arc::new(EventHub::new());
        let probe = Arc::new(LivenessProbe::new(
            config.endpoint(),
            Arc::clone(&transport),
            runtime.handle().clone(),
            Arc::clone(&events),
            config.probe_timeout(),
        ));
        let worker = RequestWorker::start(config.queue_capacity)?;

        info!(
            url = %config.ollama_url,
            model = %config.model,
            "Ollama bridge ready"
        );

        Ok(Self {
            worker,
            probe,
            events,
            status: Arc::new(StatusTracker::new()),
            transport,
            options: config.generate_options(),
            system_prompt: RwLock::new(config.system_prompt.clone()),
            runtime,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Endpoint & connectivity (delegated to the probe)
    // ─────────────────────────────────────────────────────────────────────

    pub fn probe(&self) -> &LivenessProbe {
        &self.probe
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    pub fn configure(&self, url: impl Into<String>, model: impl Into<String>) {
        self.probe.configure(url, model);
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.probe.set_url(url);
    }

    pub fn set_model(&self, model: impl Into<String>) {
        self.probe.set_model(model);
    }

    pub fn endpoint(&self) -> ServerEndpoint {
        self.probe.endpoint()
    }

    /// Blocking liveness check; see [`LivenessProbe::probe_sync`].
    pub fn ping(&self) -> bool {
        self.probe.probe_sync()
    }

    pub fn is_connected(&self) -> bool {
        self.probe.is_connected()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.probe.state()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Prompts
    // ─────────────────────────────────────────────────────────────────────

    pub fn system_prompt(&self) -> String {
        self.system_prompt
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_system_prompt(&self, prompt: impl Into<String>) {
        *self
            .system_prompt
            .write()
            .unwrap_or_else(PoisonError::into_inner) = prompt.into();
    }

    pub fn generate_status(&self) -> GenerateStatus {
        self.status.get()
    }

    /// Submit `prompt` with the configured system prompt.
    pub fn generate(&self, prompt: impl Into<String>) -> Result<Uuid, ZippyError> {
        self.submit_prompt(self.system_prompt(), prompt)
    }

    /// Queue a prompt on the request worker and return its id.
    ///
    /// The outcome arrives through the `response_received` /
    /// `response_finished` / `request_error` listeners.  The generate status
    /// moves to [`GenerateStatus::Generating`] immediately and stays there
    /// until every queued prompt has completed.
    ///
    /// # Errors
    ///
    /// [`ZippyError::QueueFull`] or [`ZippyError::WorkerStopped`] when the
    /// worker refuses the job.  The refused prompt counts as failed: with no
    /// other prompt pending the status becomes [`GenerateStatus::Error`].
    /// No `request_error` listener is called.
    pub fn submit_prompt(
        &self,
        system: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Result<Uuid, ZippyError> {
        let request = PromptRequest::new(system, prompt);
        let id = request.id;
        let job = PromptJob {
            request,
            endpoint: self.probe.endpoint(),
            options: self.options,
            transport: Arc::clone(&self.transport),
            runtime: self.runtime.handle().clone(),
            probe: Arc::clone(&self.probe),
            events: Arc::clone(&self.events),
            status: Arc::clone(&self.status),
        };

        self.status.begin(&self.events);
        if let Err(e) = self.worker.submit(Box::new(move || job.run())) {
            self.status.complete(GenerateStatus::Error, &self.events);
            return Err(e);
        }
        debug!(%id, "prompt queued");
        Ok(id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Models
    // ─────────────────────────────────────────────────────────────────────

    /// Fetch the models installed on the server (blocking).
    ///
    /// Like every request on the shared transport, the outcome updates the
    /// connectivity state silently.
    ///
    /// # Errors
    ///
    /// [`ZippyError::Transport`] when the server is unreachable,
    /// [`ZippyError::BadResponse`] for non-2xx replies or unexpected JSON.
    pub fn list_models(&self) -> Result<Vec<ModelInfo>, ZippyError> {
        let url = self.probe.endpoint().tags_url();
        let outcome = self.runtime.block_on(self.transport.get(&url));
        self.probe.record_reply(&outcome);
        let reply = outcome?;
        if !reply.is_success() {
            return Err(ZippyError::BadResponse(format!(
                "Ollama returned HTTP {}",
                reply.status
            )));
        }
        let tags: TagsResponse = serde_json::from_str(&reply.body).map_err(|e| {
            ZippyError::BadResponse(format!("Failed to parse Ollama model list: {e}"))
        })?;
        Ok(tags.models)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Stop accepting prompts, finish queued ones and join the worker.
    /// Pings and model listings keep working afterwards.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }
}

impl Drop for OllamaBridge {
    fn drop(&mut self) {
        self.worker.shutdown();
        debug!("Ollama bridge released");
    }
}

//! `zippy-bridge` – front-end bridge to a local Ollama server.
//!
//! # Modules
//!
//! - [`bridge`] – [`OllamaBridge`][bridge::OllamaBridge]: owns the I/O
//!   runtime, the shared transport, the probe, the event hub and the request
//!   worker; the single object a UI layer holds.
//! - [`probe`] – [`LivenessProbe`][probe::LivenessProbe]: endpoint storage
//!   and the `GET {url}/ping` connectivity check, blocking with notification
//!   or in the background without.
//! - [`generate`] – prompt submission to `/api/generate`, executed on the
//!   request worker, plus the [`GenerateStatus`][zippy_types::GenerateStatus]
//!   tracker.
//! - [`events`] – [`EventHub`][events::EventHub]: typed callback registry
//!   collaborators subscribe to.
//! - [`worker`] – [`RequestWorker`][worker::RequestWorker]: dedicated thread
//!   with a bounded job queue.
//! - [`transport`] – the [`Transport`][transport::Transport] seam and its
//!   `reqwest` implementation.
//! - [`config`] – [`BridgeConfig`][config::BridgeConfig] persisted at
//!   `~/.zippy/config.toml` with `ZIPPY_*` environment overrides.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing].

pub mod bridge;
pub mod config;
pub mod events;
pub mod generate;
pub mod probe;
pub mod telemetry;
pub mod transport;
pub mod worker;

pub use bridge::OllamaBridge;
pub use config::BridgeConfig;
pub use events::EventHub;
pub use generate::{DEFAULT_SYSTEM_PROMPT, GenerateOptions};
pub use probe::LivenessProbe;
pub use telemetry::init_tracing;
pub use transport::{HttpTransport, Transport, TransportFailure, TransportReply};
pub use worker::RequestWorker;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Location of the Ollama server and the model to target.
///
/// Neither field is validated here; a malformed URL only shows up as a
/// transport failure the next time a request is issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoint {
    /// Base address, e.g. `"http://localhost:11434"`.
    pub url: String,
    /// Model identifier, e.g. `"gemma3:4b"`.
    pub model: String,
}

impl ServerEndpoint {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
        }
    }

    /// Liveness URL. The base URL is used verbatim, so a trailing slash
    /// yields `"…//ping"`.
    pub fn ping_url(&self) -> String {
        format!("{}/ping", self.url)
    }

    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.url)
    }

    pub fn tags_url(&self) -> String {
        format!("{}/api/tags", self.url)
    }
}

/// Last observed result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectivityState {
    #[default]
    Disconnected,
    Connected,
}

impl ConnectivityState {
    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

impl From<bool> for ConnectivityState {
    fn from(connected: bool) -> Self {
        if connected {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        }
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Disconnected => write!(f, "disconnected"),
            ConnectivityState::Connected => write!(f, "connected"),
        }
    }
}

/// Lifecycle of the most recent prompt submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateStatus {
    /// No prompt has been submitted yet.
    #[default]
    Idle,
    /// A prompt is queued or in flight on the request worker.
    Generating,
    /// The last prompt produced a response.
    Finished,
    /// The last prompt failed.
    Error,
}

impl std::fmt::Display for GenerateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateStatus::Idle => write!(f, "idle"),
            GenerateStatus::Generating => write!(f, "generating"),
            GenerateStatus::Finished => write!(f, "finished"),
            GenerateStatus::Error => write!(f, "error"),
        }
    }
}

/// A prompt handed to the request worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Correlates log records and the id returned to the submitter.
    pub id: Uuid,
    pub system: String,
    pub prompt: String,
}

impl PromptRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

/// A model installed on the Ollama server, as listed by `/api/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

/// Error type shared by every Zippy crate.
///
/// The liveness probe never surfaces these; it reduces every failure to
/// `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ZippyError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Unexpected response from Ollama: {0}")]
    BadResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Request queue is full")]
    QueueFull,

    #[error("Request worker has stopped")]
    WorkerStopped,

    #[error("Async runtime error: {0}")]
    Runtime(String),
}

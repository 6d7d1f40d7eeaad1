//! Bridge configuration – reads/writes `~/.zippy/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use zippy_types::{ServerEndpoint, ZippyError};

use crate::generate::{DEFAULT_SYSTEM_PROMPT, GenerateOptions};

/// Persisted settings for [`OllamaBridge`][crate::bridge::OllamaBridge].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Base URL of the Ollama instance.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model used for prompt submission.
    #[serde(default = "default_model")]
    pub model: String,

    /// How long a ping may take before it counts as a transport failure.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound for any single HTTP exchange (generation can be slow).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum number of tokens to generate per prompt.
    #[serde(default = "default_num_predict")]
    pub num_predict: u32,

    /// Prompts that may wait for the request worker before submission is
    /// refused.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// System prompt used by [`generate`][crate::bridge::OllamaBridge::generate].
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "gemma3:4b".to_string()
}
fn default_probe_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    180_000
}
fn default_temperature() -> f32 {
    GenerateOptions::default().temperature
}
fn default_num_predict() -> u32 {
    GenerateOptions::default().num_predict
}
fn default_queue_capacity() -> usize {
    16
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            probe_timeout_ms: default_probe_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            temperature: default_temperature(),
            num_predict: default_num_predict(),
            queue_capacity: default_queue_capacity(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl BridgeConfig {
    pub fn endpoint(&self) -> ServerEndpoint {
        ServerEndpoint::new(self.ollama_url.clone(), self.model.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn generate_options(&self) -> GenerateOptions {
        GenerateOptions {
            temperature: self.temperature,
            num_predict: self.num_predict,
        }
    }
}

/// Return the path to `~/.zippy/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".zippy").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<BridgeConfig>, ZippyError> {
    load_from(&config_path())
}

/// Where a startup configuration came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Read from the config file.
    File,
    /// No config file; built-in defaults.
    Defaults,
    /// The config file could not be used; built-in defaults.
    Fallback(ZippyError),
}

/// Resolve the startup configuration from `~/.zippy/config.toml`.
///
/// Never fails: a missing or unusable file yields the built-in defaults.
/// `ZIPPY_*` overrides apply on every path.
pub fn load_or_default() -> (BridgeConfig, ConfigSource) {
    load_or_default_from(&config_path())
}

/// [`load_or_default`] for a specific path.
pub fn load_or_default_from(path: &Path) -> (BridgeConfig, ConfigSource) {
    let (mut cfg, source) = match load_from(path) {
        Ok(Some(cfg)) => return (cfg, ConfigSource::File),
        Ok(None) => (BridgeConfig::default(), ConfigSource::Defaults),
        Err(e) => (BridgeConfig::default(), ConfigSource::Fallback(e)),
    };
    apply_env_overrides(&mut cfg);
    (cfg, source)
}

/// Load the config from a specific path.
pub fn load_from(path: &Path) -> Result<Option<BridgeConfig>, ZippyError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ZippyError::Config(format!("Failed to read config at {}: {}", path.display(), e))
    })?;
    let mut cfg: BridgeConfig = toml::from_str(&raw)
        .map_err(|e| ZippyError::Config(format!("Failed to parse config: {}", e)))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `ZIPPY_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `ZIPPY_OLLAMA_URL` | `ollama_url` |
/// | `ZIPPY_MODEL` | `model` |
/// | `ZIPPY_PROBE_TIMEOUT_MS` | `probe_timeout_ms` |
/// | `ZIPPY_REQUEST_TIMEOUT_MS` | `request_timeout_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut BridgeConfig) {
    if let Ok(v) = std::env::var("ZIPPY_OLLAMA_URL") {
        cfg.ollama_url = v;
    }
    if let Ok(v) = std::env::var("ZIPPY_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("ZIPPY_PROBE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.probe_timeout_ms = ms;
    }
    if let Ok(v) = std::env::var("ZIPPY_REQUEST_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.request_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.zippy/` if necessary.
pub fn save(cfg: &BridgeConfig) -> Result<(), ZippyError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path with owner-only permissions on Unix.
pub fn save_to(cfg: &BridgeConfig, path: &Path) -> Result<(), ZippyError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            ZippyError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ZippyError::Config(format!("Failed to serialize config: {}", e)))?;
    write_private(path, raw.as_bytes()).map_err(|e| {
        ZippyError::Config(format!("Failed to write config at {}: {}", path.display(), e))
    })
}

#[cfg(unix)]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

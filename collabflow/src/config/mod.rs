//! Configuration for the `collabflow` client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/collabflow/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::PathBuf;
use std::time::Duration;

use crate::activity::DEFAULT_CAPACITY;
use crate::channel::ReconnectPolicy;
use crate::channel::websocket::DEFAULT_CONNECT_TIMEOUT;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// `[storage] backend` names no known backend.
    #[error("unknown storage backend {0:?} (expected \"local\" or \"remote\")")]
    UnknownBackend(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    identity: IdentityFileConfig,
    reconnect: ReconnectFileConfig,
    storage: StorageFileConfig,
    activity: ActivityFileConfig,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct IdentityFileConfig {
    user_id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    attempts: Option<u32>,
    delay_ms: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageFileConfig {
    backend: Option<String>,
    data_dir: Option<PathBuf>,
    api_url: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ActivityFileConfig {
    capacity: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Where task changes are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// JSON files under the data directory.
    #[default]
    Local,
    /// The REST API at `api_url`.
    Remote,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "remote" | "http" => Ok(Self::Remote),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Server --
    /// Realtime server WebSocket URL.
    pub server_url: Option<String>,
    /// Bearer credential.
    pub token: Option<String>,
    /// WebSocket handshake timeout.
    pub connect_timeout: Duration,

    // -- Identity --
    /// Project (room) to open.
    pub project: Option<String>,
    /// This participant's id.
    pub user_id: Option<String>,
    /// Name shown to other participants.
    pub display_name: Option<String>,

    // -- Reconnect --
    /// Reconnect attempts and delay.
    pub reconnect: ReconnectPolicy,

    // -- Storage --
    /// Storage backend.
    pub backend: StorageBackend,
    /// Directory for the local backend.
    pub data_dir: PathBuf,
    /// REST API root for the remote backend.
    pub api_url: Option<String>,

    // -- Activity --
    /// Activity entries kept.
    pub activity_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            project: None,
            user_id: None,
            display_name: None,
            reconnect: ReconnectPolicy::default(),
            backend: StorageBackend::Local,
            data_dir: default_data_dir(),
            api_url: None,
            activity_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// any config file cannot be parsed, or the storage backend is unknown.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match cli.backend.as_deref().or(file.storage.backend.as_deref()) {
            Some(name) => name.parse()?,
            None => defaults.backend,
        };

        Ok(Self {
            server_url: cli.server_url.clone().or_else(|| file.server.url.clone()),
            token: cli.token.clone(),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            project: cli.project.clone(),
            user_id: cli
                .user_id
                .clone()
                .or_else(|| file.identity.user_id.clone()),
            display_name: cli
                .display_name
                .clone()
                .or_else(|| file.identity.display_name.clone()),
            reconnect: ReconnectPolicy {
                max_attempts: file
                    .reconnect
                    .attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
                delay: file
                    .reconnect
                    .delay_ms
                    .map_or(defaults.reconnect.delay, Duration::from_millis),
            },
            backend,
            data_dir: cli
                .data_dir
                .clone()
                .or_else(|| file.storage.data_dir.clone())
                .unwrap_or(defaults.data_dir),
            api_url: cli.api_url.clone().or_else(|| file.storage.api_url.clone()),
            activity_capacity: file.activity.capacity.unwrap_or(defaults.activity_capacity),
        })
    }

    /// Display name, falling back to the user id.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref().or(self.user_id.as_deref())
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Real-time collaborative task board client")]
pub struct CliArgs {
    /// WebSocket URL of the realtime server.
    #[arg(long, env = "COLLABFLOW_SERVER_URL")]
    pub server_url: Option<String>,

    /// Bearer credential for the server and the REST API.
    #[arg(long, env = "COLLABFLOW_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Project (room) to open.
    #[arg(short, long, env = "COLLABFLOW_PROJECT")]
    pub project: Option<String>,

    /// Your participant id.
    #[arg(long, env = "COLLABFLOW_USER_ID")]
    pub user_id: Option<String>,

    /// Name shown to other participants.
    #[arg(long)]
    pub display_name: Option<String>,

    /// Storage backend (`local` or `remote`).
    #[arg(long)]
    pub backend: Option<String>,

    /// Directory for the local storage backend.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// REST API root for the remote storage backend.
    #[arg(long, env = "COLLABFLOW_API_URL")]
    pub api_url: Option<String>,

    /// Path to config file (default: `~/.config/collabflow/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "COLLABFLOW_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/collabflow.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir().map_or_else(
        || std::env::temp_dir().join("collabflow"),
        |dir| dir.join("collabflow"),
    )
}

/// If `explicit_path` is `Some`, the file must exist. Otherwise the default
/// path is tried and a missing file is an empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("collabflow").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

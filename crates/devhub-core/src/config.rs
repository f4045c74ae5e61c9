use crate::error::Result;
use crate::placeholder::DEFAULT_PLACEHOLDER_PREFIX;
use crate::reconciler::{LateArrival, ReconcilerOptions, DEFAULT_DEADLINE};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const CONFIG_FILE: &str = "devhub.yaml";
pub const CONFIG_ENV: &str = "DEVHUB_CONFIG";
pub const DEFAULT_USER_ID: &str = "local";

/// Deadlines above this still work but leave a pending placeholder on screen
/// for longer than anyone waits.
const LONG_DEADLINE_MS: u64 = 120_000;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// RemoteConfig
// ---------------------------------------------------------------------------

/// Connection to the hosted backend's REST endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Signed-in user's token. Falls back to `api_key` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

// ---------------------------------------------------------------------------
// ReconcilerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_placeholder_prefix")]
    pub placeholder_prefix: String,
    #[serde(default)]
    pub late_arrival: LateArrival,
}

fn default_deadline_ms() -> u64 {
    DEFAULT_DEADLINE.as_millis() as u64
}

fn default_placeholder_prefix() -> String {
    DEFAULT_PLACEHOLDER_PREFIX.to_string()
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_deadline_ms(),
            placeholder_prefix: default_placeholder_prefix(),
            late_arrival: LateArrival::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    7878
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Read the config at `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        atomic_write(path, data.as_bytes())
    }

    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    pub fn reconciler_options(&self) -> ReconcilerOptions {
        ReconcilerOptions {
            deadline: Duration::from_millis(self.reconciler.deadline_ms),
            placeholder_prefix: self.reconciler.placeholder_prefix.clone(),
            late_arrival: self.reconciler.late_arrival,
        }
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.reconciler.deadline_ms == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "reconciler.deadline_ms must be greater than 0".to_string(),
            });
        } else if self.reconciler.deadline_ms > LONG_DEADLINE_MS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "reconciler.deadline_ms is {}ms; placeholders stay pending that long on a stalled backend",
                    self.reconciler.deadline_ms
                ),
            });
        }

        if self.reconciler.placeholder_prefix.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "reconciler.placeholder_prefix must not be empty".to_string(),
            });
        }

        if self.remote.url.is_some() && self.remote.api_key.is_none() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "remote.url is set but remote.api_key is missing".to_string(),
            });
        }

        if self.user_id.as_deref().is_some_and(|u| u.trim().is_empty()) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "user_id must not be blank".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Locate the config file: explicit path, then `$DEVHUB_CONFIG`, then
/// `./devhub.yaml` if present, then `~/.devhub/config.yaml`.
pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    resolve_path_from(
        explicit,
        std::env::var_os(CONFIG_ENV).map(PathBuf::from),
        Path::new("."),
        home::home_dir(),
    )
}

fn resolve_path_from(
    explicit: Option<&Path>,
    env: Option<PathBuf>,
    cwd: &Path,
    home: Option<PathBuf>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = env.filter(|p| !p.as_os_str().is_empty()) {
        return path;
    }
    let local = cwd.join(CONFIG_FILE);
    if local.exists() {
        return local;
    }
    match home {
        Some(home) => home.join(".devhub").join("config.yaml"),
        None => local,
    }
}

/// Write through a sibling temp file so readers never see a partial config.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Overrides `credentials_path` when set.
pub const CREDENTIALS_ENV: &str = "RUNLOG_CREDENTIALS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// The log streams this client writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    /// Events from the reproduction tool itself.
    Client,
    /// Reproduction runs reported by the CI daemon.
    Ci,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project_id: String,
    pub client_log: String,
    pub ci_log: String,
    pub endpoint: String,
    pub credentials_path: PathBuf,
    pub scope: String,
    pub timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: "clusterfuzz-tools".to_string(),
            client_log: "client".to_string(),
            ci_log: "ci".to_string(),
            endpoint: "https://logging.googleapis.com/v2/entries:write".to_string(),
            credentials_path: PathBuf::from("/python-daemon/service-account-credentials.json"),
            scope: "https://www.googleapis.com/auth/logging.write".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stream_name(&self, stream: LogStream) -> &str {
        match stream {
            LogStream::Client => &self.client_log,
            LogStream::Ci => &self.ci_log,
        }
    }
}

/// Resolves the effective [`Config`]: an explicit file, else the first
/// candidate file that exists, else defaults. The credentials override is
/// applied last, whichever source won.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    candidates: Vec<PathBuf>,
    credentials_override: Option<PathBuf>,
}

impl ConfigLoader {
    /// `./runlog.yaml`, then `~/.runlog/config.yaml`, with the override taken
    /// from [`CREDENTIALS_ENV`].
    pub fn from_env() -> Self {
        let mut candidates = vec![PathBuf::from("./runlog.yaml")];
        if let Some(home) = dirs::home_dir() {
            candidates.push(home.join(".runlog").join("config.yaml"));
        }
        Self::default()
            .with_candidates(candidates)
            .with_credentials_override(std::env::var_os(CREDENTIALS_ENV))
    }

    pub fn with_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    /// An empty value counts as unset.
    pub fn with_credentials_override(mut self, path: Option<OsString>) -> Self {
        self.credentials_override = path.filter(|p| !p.is_empty()).map(PathBuf::from);
        self
    }

    pub async fn load(&self, explicit: Option<&Path>) -> Result<Config, ConfigError> {
        let source = explicit
            .map(Path::to_path_buf)
            .or_else(|| self.candidates.iter().find(|p| p.exists()).cloned());

        let mut config = match source {
            Some(path) => {
                debug!("Loading config from {}", path.display());
                Self::read(&path).await?
            }
            None => Config::default(),
        };
        if let Some(path) = &self.credentials_override {
            config.credentials_path = path.clone();
        }
        Ok(config)
    }

    async fn read(path: &Path) -> Result<Config, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

//! Configuration for the Branches client.
//!
//! Settings come from `~/.branches/config.toml` (optional) with environment
//! overrides layered on top:
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:8000"
//! connect_timeout_secs = 30
//! request_timeout_secs = 60
//!
//! [session]
//! token_path = "${HOME}/.branches/branches_access_token"
//! ```
//!
//! String values may reference environment variables as `${VAR}`.

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Used when neither the config file nor the environment names a server.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";
/// Environment variable that overrides `[api] base_url`.
pub const API_URL_ENV: &str = "BRANCHES_API_URL";
/// File name of the single persisted credential slot.
pub const TOKEN_FILE_NAME: &str = "branches_access_token";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize)]
pub struct BranchesConfig {
    pub api: Option<ApiConfig>,
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    /// Whole-request timeout. Unset means the transport waits indefinitely.
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionConfig {
    pub token_path: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Fully resolved settings, after defaults and environment overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Option<Duration>,
    /// `None` when no home directory can be determined and none was configured.
    pub token_path: Option<PathBuf>,
}

impl BranchesConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Resolve against the process environment.
    #[must_use]
    pub fn settings(config: Option<&Self>) -> Settings {
        Self::settings_with(config, |name| env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn settings_with<F>(config: Option<&Self>, lookup: F) -> Settings
    where
        F: Fn(&str) -> Option<String>,
    {
        let api = config.and_then(|c| c.api.as_ref());

        let base_url = lookup(API_URL_ENV)
            .filter(|value| !value.trim().is_empty())
            .or_else(|| api.and_then(|a| a.base_url.clone()))
            .map(|raw| expand_env_vars_with(&raw, &lookup))
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let connect_timeout = Duration::from_secs(
            api.and_then(|a| a.connect_timeout_secs)
                .filter(|secs| *secs > 0)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        );
        let request_timeout = api
            .and_then(|a| a.request_timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let token_path = config
            .and_then(|c| c.session.as_ref())
            .and_then(|s| s.token_path.as_deref())
            .map(|raw| expand_env_vars_with(raw, &lookup))
            .filter(|raw| !raw.trim().is_empty())
            .map(PathBuf::from)
            .or_else(default_token_path);

        Settings {
            base_url,
            connect_timeout,
            request_timeout,
            token_path,
        }
    }
}

#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_env_vars_with(value, |name| env::var(name).ok())
}

/// Replace `${VAR}` with `lookup(VAR)`; unknown variables expand to nothing.
pub fn expand_env_vars_with<F>(value: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                if name.is_empty() {
                    out.push_str("${}");
                } else {
                    out.push_str(&lookup(name).unwrap_or_default());
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    out
}

/// `~/.branches`
#[must_use]
pub fn branches_home() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".branches"))
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    branches_home().map(|dir| dir.join("config.toml"))
}

#[must_use]
pub fn default_token_path() -> Option<PathBuf> {
    branches_home().map(|dir| dir.join(TOKEN_FILE_NAME))
}

//! Configuration for waspnest.
//!
//! Settings live in `~/.waspnest/config.toml`:
//!
//! ```toml
//! [app]
//! model = "gpt-4o-mini"
//! step_limit = 10
//!
//! [api_keys]
//! openai = "${OPENAI_API_KEY}"
//!
//! [openai]
//! base_url = "https://api.openai.com"
//! timeout_seconds = 60
//! ```
//!
//! Every section is optional. `${VAR}` references in string values are expanded from the
//! process environment when the value is resolved; unset variables expand to nothing.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use waspnest_types::{ApiKey, ModelId};

const CONFIG_DIR: &str = ".waspnest";
const CONFIG_FILE: &str = "config.toml";
const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
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

#[derive(Debug, Default, Deserialize)]
pub struct WaspnestConfig {
    pub app: Option<AppConfig>,
    pub api_keys: Option<ApiKeys>,
    pub openai: Option<OpenAIConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    pub model: Option<String>,
    /// Maximum number of steps per run.
    pub step_limit: Option<usize>,
}

#[derive(Default, Deserialize)]
pub struct ApiKeys {
    pub openai: Option<String>,
}

// Keys must never reach logs.
impl fmt::Debug for ApiKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let openai = if self.openai.is_some() {
            "[REDACTED]"
        } else {
            "None"
        };
        f.debug_struct("ApiKeys").field("openai", &openai).finish()
    }
}

/// Chat Completions endpoint settings.
#[derive(Debug, Default, Deserialize)]
pub struct OpenAIConfig {
    /// Origin of an OpenAI-compatible API.
    pub base_url: Option<String>,
    pub timeout_seconds: Option<u64>,
}

impl WaspnestConfig {
    /// Load the default config file. A missing file is not an error.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. A missing file is not an error.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config at {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {}: {source}", path.display());
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        Self::parse(&content)
            .map(Some)
            .map_err(|source| {
                tracing::warn!("Failed to parse config at {}: {source}", path.display());
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    /// Configured model, or the default model when unset or blank.
    #[must_use]
    pub fn model(&self) -> ModelId {
        let Some(raw) = self.app.as_ref().and_then(|app| app.model.as_deref()) else {
            return ModelId::default();
        };
        match ModelId::new(expand_env_vars(raw)) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!("Invalid model in config: {err}");
                ModelId::default()
            }
        }
    }

    #[must_use]
    pub fn step_limit(&self) -> Option<usize> {
        self.app.as_ref().and_then(|app| app.step_limit)
    }

    /// Configured OpenAI key, falling back to `OPENAI_API_KEY`.
    #[must_use]
    pub fn openai_api_key(&self) -> Option<ApiKey> {
        self.openai_api_key_with(|name| env::var(name).ok())
    }

    fn openai_api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<ApiKey> {
        self.api_keys
            .as_ref()
            .and_then(|keys| keys.openai.as_deref())
            .map(|raw| expand_with(raw, &lookup))
            .filter(|key| !key.trim().is_empty())
            .or_else(|| lookup(OPENAI_API_KEY_ENV).filter(|key| !key.trim().is_empty()))
            .map(ApiKey::new)
    }

    #[must_use]
    pub fn openai_base_url(&self) -> Option<String> {
        self.openai
            .as_ref()
            .and_then(|openai| openai.base_url.as_deref())
            .map(expand_env_vars)
            .filter(|url| !url.trim().is_empty())
    }

    #[must_use]
    pub fn openai_timeout(&self) -> Option<Duration> {
        self.openai
            .as_ref()
            .and_then(|openai| openai.timeout_seconds)
            .map(Duration::from_secs)
    }
}

/// Expand `${VAR}` references from the process environment.
///
/// Unset variables and `${}` expand to the empty string; an unclosed `${` is kept verbatim.
#[must_use]
pub fn expand_env_vars(value: &str) -> String {
    expand_with(value, |name| env::var(name).ok())
}

fn expand_with(value: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after[..end];
        if !name.is_empty() {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

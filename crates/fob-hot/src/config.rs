//! Bridge configuration.
//!
//! Loaded from defaults, an optional `fob-hot.json` and `FOB_HOT_*`
//! environment variables, in that order of precedence (later wins).

use crate::error::{ConfigError, Result};
use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file looked up in the working directory.
pub const CONFIG_FILE: &str = "fob-hot.json";

/// What to do with a request that arrives while a build is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldPolicy {
    /// Wait for the in-flight build to resolve before answering
    #[default]
    Hold,
    /// Answer from the last valid generation when it has the file
    Stale,
}

impl std::str::FromStr for HoldPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "hold" => Ok(Self::Hold),
            "stale" => Ok(Self::Stale),
            other => Err(ConfigError::InvalidValue {
                field: "holdPolicy".to_string(),
                value: other.to_string(),
                hint: "Use 'hold' or 'stale'".to_string(),
            }),
        }
    }
}

/// Hot bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HotConfig {
    /// Serving policy while compiling
    pub hold_policy: HoldPolicy,

    /// Maximum time a held request waits for its build
    pub request_timeout_ms: u64,

    /// File served for `/` (and directory paths) when no exact match exists
    pub entry_fallback: String,

    /// Messages buffered per streaming client before it is dropped
    pub client_buffer: usize,

    /// Keep-alive interval for the event stream
    pub keep_alive_secs: u64,

    /// Broadcast a `building` message when a cycle starts
    pub announce_builds: bool,

    /// Inject the hot client script into served HTML
    pub inject_client: bool,

    /// Route prefix for the event stream and client script
    pub prefix: String,
}

impl Default for HotConfig {
    fn default() -> Self {
        Self {
            hold_policy: HoldPolicy::Hold,
            request_timeout_ms: 30_000,
            entry_fallback: "index.html".to_string(),
            client_buffer: 64,
            keep_alive_secs: 15,
            announce_builds: false,
            inject_client: true,
            prefix: "/__fob_hot__".to_string(),
        }
    }
}

impl HotConfig {
    /// Load configuration from multiple sources.
    /// Priority: environment variables > config file > defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit `path` does not exist, a source has
    /// the wrong shape, or the merged result fails [`HotConfig::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));

        let config_file = match path {
            Some(path) if !path.exists() => {
                return Err(ConfigError::NotFound(path.to_path_buf()).into());
            }
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default_path = Path::new(CONFIG_FILE);
                default_path.exists().then(|| default_path.to_path_buf())
            }
        };

        if let Some(path) = config_file {
            figment = figment.merge(Json::file(path));
        }

        // FOB_HOT_REQUEST_TIMEOUT_MS -> requestTimeoutMs
        figment = figment.merge(
            Env::prefixed("FOB_HOT_")
                .map(|key| camel_case(key.as_str()).into())
                .lowercase(false),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::InvalidValue {
            field: "configuration".to_string(),
            value: e.to_string(),
            hint: format!("Check {} syntax and field types", CONFIG_FILE),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate option ranges.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(invalid(
                "requestTimeoutMs",
                "0",
                "Timeout must be at least 1ms",
            ));
        }

        if self.entry_fallback.trim_matches('/').is_empty() {
            return Err(invalid(
                "entryFallback",
                &self.entry_fallback,
                "Name the file served for '/', e.g. index.html",
            ));
        }

        if self.client_buffer == 0 {
            return Err(invalid(
                "clientBuffer",
                "0",
                "Clients need room for at least one message",
            ));
        }

        if !self.prefix.starts_with('/') || self.prefix.len() < 2 || self.prefix.ends_with('/') {
            return Err(invalid(
                "prefix",
                &self.prefix,
                "Use an absolute path without a trailing slash, e.g. /__fob_hot__",
            ));
        }

        Ok(())
    }

    /// Held request budget.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Store key of the entry fallback (`index.html` -> `/index.html`).
    pub fn entry_key(&self) -> String {
        format!("/{}", self.entry_fallback.trim_start_matches('/'))
    }

    /// Path of the event stream endpoint.
    pub fn events_path(&self) -> &str {
        &self.prefix
    }

    /// Path of the client script.
    pub fn client_script_path(&self) -> String {
        format!("{}/client.js", self.prefix)
    }
}

fn invalid(field: &str, value: &str, hint: &str) -> crate::error::HotError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    }
    .into()
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for c in key.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c.to_ascii_lowercase());
        }
    }
    out
}

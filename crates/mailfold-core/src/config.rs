//! Runtime configuration.
//!
//! A [`Config`] is built once at process start (normally from the
//! environment) and passed by reference to everything that needs it.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption. Suitable for local bridges on loopback.
    #[default]
    None,
    /// Start with plaintext, upgrade with STARTTLS.
    StartTls,
    /// TLS from the start (port 993).
    Implicit,
}

impl Security {
    /// Returns the conventional port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

impl FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "plain" | "off" => Ok(Self::None),
            "starttls" => Ok(Self::StartTls),
            "tls" | "ssl" | "implicit" => Ok(Self::Implicit),
            other => Err(Error::Config(format!("unknown IMAP security mode: {other}"))),
        }
    }
}

/// Mailbox connection settings.
#[derive(Clone)]
pub struct ImapConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Login name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Upper bound for connecting and for every single command.
    pub timeout: Duration,
}

impl fmt::Debug for ImapConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Classification oracle settings.
#[derive(Clone)]
pub struct OracleConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Model resource name, e.g. `models/gemini-2.0-flash`.
    pub model: String,
    /// Model to retry with when the primary one is unknown to the provider.
    pub fallback_model: Option<String>,
    /// Base URL of the generative language API.
    pub endpoint: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl fmt::Debug for OracleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("fallback_model", &self.fallback_model)
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Triage engine settings.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    /// Folder whose messages are triaged.
    pub source_folder: String,
    /// Search criteria applied to the source folder.
    pub search: String,
    /// Top-level container for every engine-managed folder.
    pub root: String,
    /// Maximum snippet length in characters.
    pub snippet_chars: usize,
    /// Delay between polling cycles.
    pub interval: Duration,
    /// Pause before the next classification after a rate limit.
    pub rate_limit_backoff: Duration,
    /// Number of messages fetched per round trip.
    pub fetch_batch: usize,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            source_folder: "INBOX".to_string(),
            search: "ALL".to_string(),
            root: "Folders".to_string(),
            snippet_chars: 500,
            interval: Duration::from_secs(60),
            rate_limit_backoff: Duration::ZERO,
            fetch_batch: 25,
        }
    }
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Mailbox settings.
    pub imap: ImapConfig,
    /// Oracle settings. `None` when no API key was provided.
    pub oracle: Option<OracleConfig>,
    /// Engine settings.
    pub triage: TriageConfig,
}

/// Default Gemini endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
/// Default classification model.
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash";
/// Model used when the default one is unavailable.
pub const DEFAULT_FALLBACK_MODEL: &str = "models/gemini-flash-latest";

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// value does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// value does not parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = ["IMAP_USERNAME", "IMAP_PASSWORD"]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "missing required variables: {}",
                missing.join(", ")
            )));
        }

        let security = get("IMAP_SECURITY")
            .map(|v| v.parse::<Security>())
            .transpose()?
            .unwrap_or_default();

        let imap = ImapConfig {
            host: get("IMAP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("IMAP_PORT", get("IMAP_PORT"), 1143)?,
            security,
            username: get("IMAP_USERNAME").unwrap_or_default(),
            password: get("IMAP_PASSWORD").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or("IMAP_TIMEOUT_SECS", get("IMAP_TIMEOUT_SECS"), 30)?),
        };

        let oracle = match get("GEMINI_API_KEY") {
            Some(api_key) => Some(OracleConfig {
                api_key,
                model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                fallback_model: Some(
                    get("GEMINI_FALLBACK_MODEL")
                        .unwrap_or_else(|| DEFAULT_FALLBACK_MODEL.to_string()),
                ),
                endpoint: get("GEMINI_ENDPOINT").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                timeout: Duration::from_secs(parse_or(
                    "ORACLE_TIMEOUT_SECS",
                    get("ORACLE_TIMEOUT_SECS"),
                    30,
                )?),
            }),
            None => None,
        };

        let defaults = TriageConfig::default();
        let triage = TriageConfig {
            source_folder: get("MAILFOLD_SOURCE_FOLDER").unwrap_or(defaults.source_folder),
            search: get("MAILFOLD_SEARCH").unwrap_or(defaults.search),
            root: get("MAILFOLD_ROOT").unwrap_or(defaults.root),
            snippet_chars: parse_or(
                "MAILFOLD_SNIPPET_CHARS",
                get("MAILFOLD_SNIPPET_CHARS"),
                defaults.snippet_chars,
            )?,
            interval: Duration::from_secs(parse_or(
                "MAILFOLD_INTERVAL_SECS",
                get("MAILFOLD_INTERVAL_SECS"),
                defaults.interval.as_secs(),
            )?),
            rate_limit_backoff: Duration::from_secs(parse_or(
                "MAILFOLD_RATE_LIMIT_BACKOFF_SECS",
                get("MAILFOLD_RATE_LIMIT_BACKOFF_SECS"),
                0,
            )?),
            fetch_batch: parse_or(
                "MAILFOLD_FETCH_BATCH",
                get("MAILFOLD_FETCH_BATCH"),
                defaults.fetch_batch,
            )?,
        };

        let config = Self {
            imap,
            oracle,
            triage,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let root = self.triage.root.as_str();
        if root.is_empty() || root.contains('/') || root.chars().any(char::is_control) {
            return Err(Error::Config(format!(
                "root folder must be a single non-empty segment, got {root:?}"
            )));
        }
        let source = self.triage.source_folder.as_str();
        if source.eq_ignore_ascii_case(root)
            || source
                .get(..=root.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&format!("{root}/")))
        {
            return Err(Error::Config(format!(
                "source folder {source:?} must not live under the managed root {root:?}"
            )));
        }
        if self.triage.snippet_chars == 0 {
            return Err(Error::Config("snippet length must be positive".to_string()));
        }
        if self.triage.fetch_batch == 0 {
            return Err(Error::Config("fetch batch must be positive".to_string()));
        }
        if self.imap.timeout.is_zero() {
            return Err(Error::Config("IMAP timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns the oracle settings, or an error naming the missing key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `GEMINI_API_KEY` was not provided.
    pub fn require_oracle(&self) -> Result<&OracleConfig> {
        self.oracle
            .as_ref()
            .ok_or_else(|| Error::Config("missing required variables: GEMINI_API_KEY".to_string()))
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    value.map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .map_err(|e| Error::Config(format!("{key}={v:?}: {e}")))
    })
}

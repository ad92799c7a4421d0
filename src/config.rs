//! Cluster configuration file and settings resolution
//!
//! `config.toml` describes named clusters:
//!
//! ```toml
//! default_cluster = "prod"
//!
//! [clusters.prod]
//! uri = "http://marathon.prod.example.com:8080"
//! username = "deployer"
//! password = "secret"
//! timeout = "5m"
//! poll_interval = "5s"
//! ```
//!
//! Settings resolve as command-line flag (or its environment variable),
//! then the selected cluster, then built-in defaults.

use anyhow::{Context, Result, bail};
use marathon::{
    ClusterConfig, Credentials, DEFAULT_POLL_INTERVAL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_TIMEOUT,
    WaitConfig,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cli::ClusterArgs;
use crate::paths;

// ============================================================================
// Config File
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Cluster used when `--cluster` is not given
    pub default_cluster: Option<String>,
    #[serde(default)]
    pub clusters: BTreeMap<String, ClusterEntry>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ClusterEntry {
    pub uri: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub token: Option<String>,
    pub request_timeout: Option<String>,
    pub timeout: Option<String>,
    pub poll_interval: Option<String>,
}

impl Config {
    /// Load config.toml from the config directory (empty if missing)
    pub fn load() -> Result<Self> {
        let path = paths::config_file()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config in {}", path.display()))
    }

    /// Look up the requested cluster, falling back to `default_cluster`
    pub fn cluster(&self, name: Option<&str>) -> Result<Option<&ClusterEntry>> {
        let Some(name) = name.or(self.default_cluster.as_deref()) else {
            return Ok(None);
        };
        match self.clusters.get(name) {
            Some(entry) => {
                log::debug!("Using cluster '{name}' from config");
                Ok(Some(entry))
            }
            None => {
                let known: Vec<&str> = self.clusters.keys().map(String::as_str).collect();
                bail!(
                    "Unknown cluster '{}' (configured: {})",
                    name,
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                )
            }
        }
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Everything needed to build a reconciler
#[derive(Debug)]
pub struct Settings {
    pub cluster: ClusterConfig,
    pub wait: WaitConfig,
}

/// Merge command-line options over the selected cluster and defaults
pub fn resolve(
    config: &Config,
    args: &ClusterArgs,
    timeout: Option<Duration>,
    poll_interval: Option<Duration>,
) -> Result<Settings> {
    let entry = config.cluster(args.cluster.as_deref())?.cloned().unwrap_or_default();

    let Some(uri) = args.uri.clone().or(entry.uri) else {
        bail!("No Marathon URI: pass --uri, set MARATHON_URI or configure a cluster in config.toml");
    };

    // Credentials come from one layer as a whole
    let from_args = args.token.is_some() || args.username.is_some() || args.password.is_some();
    let credentials = if from_args {
        log::debug!("Using credentials from flags or environment");
        credentials(
            args.token.clone(),
            args.username.clone(),
            args.password.clone(),
        )?
    } else {
        credentials(entry.token, entry.username, entry.password)?
    };

    let request_timeout = pick(
        args.request_timeout,
        entry.request_timeout.as_deref(),
        "request_timeout",
        DEFAULT_REQUEST_TIMEOUT,
    )?;
    let timeout = pick(timeout, entry.timeout.as_deref(), "timeout", DEFAULT_TIMEOUT)?;
    let poll_interval = pick(
        poll_interval,
        entry.poll_interval.as_deref(),
        "poll_interval",
        DEFAULT_POLL_INTERVAL,
    )?;

    let mut cluster = ClusterConfig::new(uri).with_request_timeout(request_timeout);
    if let Some(credentials) = credentials {
        cluster = cluster.with_credentials(credentials);
    }

    Ok(Settings {
        cluster,
        wait: WaitConfig::new(timeout, poll_interval),
    })
}

fn credentials(
    token: Option<String>,
    username: Option<String>,
    password: Option<String>,
) -> Result<Option<Credentials>> {
    Ok(match (token, username, password) {
        (Some(token), _, _) => Some(Credentials::Token(token)),
        (None, Some(username), password) => Some(Credentials::Basic {
            username,
            password: password.unwrap_or_default(),
        }),
        (None, None, Some(_)) => bail!("A password was given without a username"),
        (None, None, None) => None,
    })
}

fn pick(
    flag: Option<Duration>,
    configured: Option<&str>,
    key: &str,
    default: Duration,
) -> Result<Duration> {
    if let Some(value) = flag {
        return Ok(value);
    }
    match configured {
        Some(raw) => parse_duration(raw).map_err(|e| anyhow::anyhow!("Invalid {key}: {e}")),
        None => Ok(default),
    }
}

/// Parse a duration like `90`, `90s`, `500ms`, `3m` or `1h`
///
/// A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input.is_empty() {
        return Err("empty duration".to_string());
    }

    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{input}'"))?;

    let secs = |factor: u64| {
        value
            .checked_mul(factor)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{input}' is out of range"))
    };
    match unit.trim() {
        "" | "s" => Ok(Duration::from_secs(value)),
        "ms" => Ok(Duration::from_millis(value)),
        "m" => secs(60),
        "h" => secs(3600),
        other => Err(format!(
            "unknown unit '{other}' in '{input}' (use ms, s, m or h)"
        )),
    }
}

use reqwest::Url;
use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

const DEFAULT_REFRESH_SECS: u64 = 3600;
const DEFAULT_ISSUER_BASE: &str = "https://securetoken.google.com";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub file_server: Url,
    /// `None` serves `/api` without the bearer token check.
    pub identity: Option<IdentityConfig>,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub issuer: String,
    pub audience: String,
    pub refresh_interval: Duration,
}

impl IdentityConfig {
    pub fn discovery_uri(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.issuer.trim_end_matches('/')
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} env variable is not set")]
    Missing(&'static str),
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error("cannot read {}: {source}", .path.display())]
    KeyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{} is not a service account key: {source}", .path.display())]
    ServiceAccount {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct ServiceAccount {
    #[serde(default)]
    project_id: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = required(&lookup, "PORT")?
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
            })?;
        let file_server = parse_file_server(&required(&lookup, "FILE_SERVER")?)?;
        let identity = if flag(&lookup, "AUTH_DISABLED")? {
            None
        } else {
            Some(identity(&lookup)?)
        };

        Ok(Config {
            port,
            file_server,
            identity,
        })
    }
}

/// Base URL of the static file host. Must be an absolute http(s) URL.
pub fn parse_file_server(value: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        key: "FILE_SERVER",
        reason,
    };
    let url = Url::parse(value).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {}", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_owned()));
    }
    Ok(url)
}

fn identity<F>(lookup: &F) -> Result<IdentityConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = PathBuf::from(required(lookup, "FIREBASE_KEY_FILE")?);
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::KeyFile {
        path: path.clone(),
        source,
    })?;
    let account: ServiceAccount =
        serde_json::from_str(&contents).map_err(|source| ConfigError::ServiceAccount {
            path: path.clone(),
            source,
        })?;
    if account.project_id.is_empty() {
        return Err(ConfigError::Invalid {
            key: "FIREBASE_KEY_FILE",
            reason: "project_id is missing".to_owned(),
        });
    }

    let issuer = lookup("AUTH_ISSUER")
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| format!("{DEFAULT_ISSUER_BASE}/{}", account.project_id));
    let refresh_secs = match lookup("JWKS_REFRESH_SECS").filter(|v| !v.is_empty()) {
        Some(v) => v.parse::<u64>().map_err(|e| ConfigError::Invalid {
            key: "JWKS_REFRESH_SECS",
            reason: e.to_string(),
        })?,
        None => DEFAULT_REFRESH_SECS,
    };

    Ok(IdentityConfig {
        issuer,
        audience: account.project_id,
        refresh_interval: Duration::from_secs(refresh_secs),
    })
}

fn required<F>(lookup: &F, key: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn flag<F>(lookup: &F, key: &'static str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None | Some("") | Some("0") | Some("false") => Ok(false),
        Some("1") | Some("true") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected true or false, got {other}"),
        }),
    }
}

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_API_URL: &str = "https://a-updates-alpha.vercel.app";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: Url,
    /// Where the session token and theme preference live.
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// `UPDATES_API_URL`, `UPDATES_DATA_DIR`, `UPDATES_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = lookup("UPDATES_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let data_dir = match lookup("UPDATES_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let timeout = match lookup("UPDATES_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            api_url: parse_api_url(&api_url)?,
            data_dir,
            request_timeout: timeout,
        })
    }
}

pub fn parse_api_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl(raw.to_string(), e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidValue {
            name: "UPDATES_API_URL",
            value: raw.to_string(),
        });
    }
    Ok(url)
}

fn parse_timeout(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            name: "UPDATES_TIMEOUT_SECS",
            value: raw.to_string(),
        }),
    }
}

fn default_data_dir() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|d| d.join("updates"))
        .ok_or(ConfigError::NoDataDir)
}

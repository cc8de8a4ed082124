//! Application configuration parsed from environment variables.
//!
//! Required:
//! - `SUPABASE_URL`: base URL of the hosted platform project
//! - `SUPABASE_ANON_KEY`: public (anon) API key; not a secret
//!
//! Optional:
//! - `PORT`: listen port, default 3000
//! - `PUBLIC_ORIGIN`: externally visible origin, default `http://localhost:{PORT}`
//! - `OAUTH_PROVIDER`: identity provider name, default `google`
//! - `COOKIE_SECURE`: bool; defaults to whether `PUBLIC_ORIGIN` is https
//! - `PLATFORM_REQUEST_TIMEOUT_SECS`: default 10
//! - `REALTIME_HEARTBEAT_SECS`: default 25

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_OAUTH_PROVIDER: &str = "google";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required env var {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Platform base URL without trailing slash.
    pub supabase_url: String,
    pub anon_key: String,
    pub port: u16,
    /// Origin used to build absolute redirect URLs, without trailing slash.
    pub public_origin: String,
    pub oauth_provider: String,
    pub cookie_secure: bool,
    pub request_timeout_secs: u64,
    pub heartbeat_secs: u64,
}

impl AppConfig {
    /// Build typed config from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build typed config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url = required(&lookup, "SUPABASE_URL")?;
        let parsed = reqwest::Url::parse(&supabase_url)
            .map_err(|_| ConfigError::Invalid { key: "SUPABASE_URL", value: supabase_url.clone() })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid { key: "SUPABASE_URL", value: supabase_url });
        }
        let anon_key = required(&lookup, "SUPABASE_ANON_KEY")?;

        let port = parse_or(&lookup, "PORT", DEFAULT_PORT)?;
        let public_origin = lookup("PUBLIC_ORIGIN")
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| format!("http://localhost:{port}"));
        let oauth_provider = lookup("OAUTH_PROVIDER")
            .map(|v| v.trim().to_ascii_lowercase())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_OAUTH_PROVIDER.to_string());

        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "COOKIE_SECURE", value: raw })?,
            None => public_origin.starts_with("https://"),
        };

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            anon_key,
            port,
            public_origin,
            oauth_provider,
            cookie_secure,
            request_timeout_secs: parse_or(&lookup, "PLATFORM_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
            heartbeat_secs: parse_or(&lookup, "REALTIME_HEARTBEAT_SECS", DEFAULT_HEARTBEAT_SECS)?,
        })
    }

    /// Absolute URL the identity provider redirects back to.
    #[must_use]
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.public_origin)
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(key))
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

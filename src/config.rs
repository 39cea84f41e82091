//! Runtime configuration parsed from environment variables.
//!
//! Every knob has a default so the static server starts with no environment
//! at all. Remote-service credentials are optional: when absent, the
//! corresponding client is simply not constructed.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DIST_DIR: &str = "dist";
pub const DEFAULT_TOKEN_REFRESH_THRESHOLD_SECS: u64 = 300;
pub const DEFAULT_TOKEN_REFRESH_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUERY_STALE_TIME_MS: u64 = 30_000;
pub const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CONSENT_FILE: &str = ".infrajet/storage.json";

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

/// Static file server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub dist_dir: PathBuf,
}

impl ServerConfig {
    /// Load from `PORT` (default 8080) and `DIST_DIR` (default `dist`).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            dist_dir: env_non_empty("DIST_DIR").map_or_else(|| PathBuf::from(DEFAULT_DIST_DIR), PathBuf::from),
        }
    }
}

/// Timeouts applied to outbound `reqwest` clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_HTTP_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS }
    }
}

/// Identity provider (Firebase) credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
}

/// Database service (Supabase) endpoint and anonymous key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupabaseConfig {
    pub url: String,
    pub anon_key: String,
}

/// Session and cache tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Refresh when the token has less than this much lifetime left.
    pub refresh_threshold: Duration,
    /// How often the refresh loop checks the token.
    pub refresh_interval: Duration,
    /// Default freshness window for cached queries.
    pub stale_time: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: Duration::from_secs(DEFAULT_TOKEN_REFRESH_THRESHOLD_SECS),
            refresh_interval: Duration::from_secs(DEFAULT_TOKEN_REFRESH_INTERVAL_SECS),
            stale_time: Duration::from_millis(DEFAULT_QUERY_STALE_TIME_MS),
        }
    }
}

/// Full client-core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub timeouts: HttpTimeouts,
    /// End-user realm.
    pub firebase: Option<FirebaseConfig>,
    /// Back-office realm. Falls back to the end-user key when unset.
    pub admin_firebase: Option<FirebaseConfig>,
    pub supabase: Option<SupabaseConfig>,
    pub consent_file: PathBuf,
}

impl Config {
    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `PORT`, `DIST_DIR`
    /// - `FIREBASE_API_KEY`, `ADMIN_FIREBASE_API_KEY`
    /// - `SUPABASE_URL` + `SUPABASE_ANON_KEY` (both or neither)
    /// - `TOKEN_REFRESH_THRESHOLD_SECS` (default 300)
    /// - `TOKEN_REFRESH_INTERVAL_SECS` (default 60)
    /// - `QUERY_STALE_TIME_MS` (default 30000)
    /// - `HTTP_REQUEST_TIMEOUT_SECS` (default 30), `HTTP_CONNECT_TIMEOUT_SECS` (default 10)
    /// - `CONSENT_FILE` (default `.infrajet/storage.json`)
    #[must_use]
    pub fn from_env() -> Self {
        let firebase = env_non_empty("FIREBASE_API_KEY").map(|api_key| FirebaseConfig { api_key });
        let admin_firebase = env_non_empty("ADMIN_FIREBASE_API_KEY")
            .map(|api_key| FirebaseConfig { api_key })
            .or_else(|| firebase.clone());
        let supabase = match (env_non_empty("SUPABASE_URL"), env_non_empty("SUPABASE_ANON_KEY")) {
            (Some(url), Some(anon_key)) => Some(SupabaseConfig { url: url.trim_end_matches('/').to_owned(), anon_key }),
            _ => None,
        };

        Self {
            server: ServerConfig::from_env(),
            session: SessionConfig {
                refresh_threshold: Duration::from_secs(env_parse(
                    "TOKEN_REFRESH_THRESHOLD_SECS",
                    DEFAULT_TOKEN_REFRESH_THRESHOLD_SECS,
                )),
                refresh_interval: Duration::from_secs(env_parse(
                    "TOKEN_REFRESH_INTERVAL_SECS",
                    DEFAULT_TOKEN_REFRESH_INTERVAL_SECS,
                )),
                stale_time: Duration::from_millis(env_parse("QUERY_STALE_TIME_MS", DEFAULT_QUERY_STALE_TIME_MS)),
            },
            timeouts: HttpTimeouts {
                request_secs: env_parse("HTTP_REQUEST_TIMEOUT_SECS", DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
                connect_secs: env_parse("HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            },
            firebase,
            admin_firebase,
            supabase,
            consent_file: env_non_empty("CONSENT_FILE")
                .map_or_else(|| PathBuf::from(DEFAULT_CONSENT_FILE), PathBuf::from),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

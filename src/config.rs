// Runtime configuration, read once from the process environment

use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_VVS_TRIP_URL: &str = "https://www3.vvs.de/mngvvs/XML_TRIP_REQUEST2";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub vvs_trip_url: String,
    pub http_timeout: Duration,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads the configuration from environment variables.
    ///
    /// - BIND_ADDR (default "0.0.0.0")
    /// - PORT (default 8080)
    /// - GEMINI_API_KEY (optional; checked per request, not at startup)
    /// - GEMINI_MODEL (default "gemini-2.5-flash")
    /// - GEMINI_BASE_URL
    /// - VVS_TRIP_URL
    /// - HTTP_TIMEOUT_SECS (default 30)
    /// - LOG_FORMAT ("text" or "json", default "text")
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = non_empty("PORT")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(8080);
        let timeout_secs = non_empty("HTTP_TIMEOUT_SECS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(30);
        let log_format = match non_empty("LOG_FORMAT").map(|v| v.to_ascii_lowercase()) {
            Some(v) if v == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Self {
            bind_addr: non_empty("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            gemini_api_key: non_empty("GEMINI_API_KEY"),
            gemini_model: non_empty("GEMINI_MODEL")
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_base_url: non_empty("GEMINI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            vvs_trip_url: non_empty("VVS_TRIP_URL")
                .unwrap_or_else(|| DEFAULT_VVS_TRIP_URL.to_string()),
            http_timeout: Duration::from_secs(timeout_secs),
            log_format,
        }
    }
}

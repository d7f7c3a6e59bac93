use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    /// Seed credentials for the initial admin account
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    pub admin_password: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_days: default_session_days(),
            admin_email: default_admin_email(),
            admin_password: None,
        }
    }
}

fn default_session_days() -> i64 {
    7
}

fn default_admin_email() -> String {
    "admin@nestify.local".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Allowed origin for browser clients; "*" allows any origin
    #[serde(default = "default_cors_origin")]
    pub origin: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origin: default_cors_origin(),
        }
    }
}

fn default_cors_origin() -> String {
    "http://localhost:5173".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Directory where uploaded images are persisted
    #[serde(default = "default_upload_dir")]
    pub dir: PathBuf,
    /// Maximum accepted file size in megabytes
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: default_upload_dir(),
            max_size_mb: default_max_size_mb(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./data/uploads")
}

fn default_max_size_mb() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// General API requests allowed per window
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Auth requests allowed per window (login/register)
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
    /// Window duration in seconds
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Interval between expired-entry sweeps in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
            window_seconds: default_window_seconds(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_api_requests() -> u32 {
    100
}

fn default_auth_requests() -> u32 {
    20
}

fn default_window_seconds() -> u64 {
    60
}

fn default_cleanup_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = Config::default();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.session_days, 7);
        assert_eq!(config.uploads.max_size_mb, 5);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 8080

            [rate_limit]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.window_seconds, 60);
        assert_eq!(config.cors.origin, "http://localhost:5173");
    }
}

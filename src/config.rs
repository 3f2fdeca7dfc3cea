use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_SUBMISSION_THROTTLE_SECS: u64 = 30;
const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 10;

/// Outbound email configuration
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    /// HTTP endpoint that accepts `{to, subject, html, template, data}`; sending is disabled when unset
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Request timeout for the email endpoint
    #[serde(default = "default_email_timeout_secs")]
    pub timeout_secs: u64,

    /// Mailbox that receives the internal copy of new quote requests
    #[serde(default = "default_admin_recipient")]
    pub admin_recipient: String,

    /// Business name shown in email headers and footers
    #[serde(default = "default_business_name")]
    pub business_name: String,

    #[serde(default = "default_support_email")]
    pub support_email: String,

    #[serde(default)]
    pub support_phone: Option<String>,

    #[serde(default)]
    pub website: Option<String>,

    /// Queue the confirmation emails after a successful public submission
    #[serde(default)]
    pub notify_on_submission: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            timeout_secs: default_email_timeout_secs(),
            admin_recipient: default_admin_recipient(),
            business_name: default_business_name(),
            support_email: default_support_email(),
            support_phone: None,
            website: None,
            notify_on_submission: false,
        }
    }
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint_url
            .as_deref()
            .map(|url| !url.trim().is_empty())
            .unwrap_or(false)
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// Allow permissive CORS fallback
    #[serde(default)]
    pub cors_allow_any_origin: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Minimum seconds between two successful submissions from the same client
    #[serde(default = "default_submission_throttle_secs")]
    #[validate(range(min = 1))]
    pub submission_throttle_secs: u64,

    /// Directory for the JSON-file client state store; in-memory when unset
    #[serde(default)]
    pub client_state_dir: Option<String>,

    /// Shared key required in `X-Admin-Key` for admin routes; admin routes are open when unset
    #[serde(default)]
    pub admin_api_key: Option<String>,

    /// Public URL of the backoffice, used for links in internal emails
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Outbound email settings
    #[serde(default)]
    pub email: EmailConfig,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            submission_throttle_secs: default_submission_throttle_secs(),
            client_state_dir: None,
            admin_api_key: None,
            public_base_url: default_public_base_url(),
            email: EmailConfig::default(),
        }
    }

    /// Gets database URL reference
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Checks if running in development environment
    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    /// Whether we should fall back to permissive CORS
    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn submission_throttle(&self) -> Duration {
        Duration::from_secs(self.submission_throttle_secs)
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if let Some(url) = self.email.endpoint_url.as_deref() {
            let trimmed = url.trim();
            if !trimmed.is_empty()
                && !(trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            {
                let mut err = ValidationError::new("email_endpoint_url");
                err.message = Some("email.endpoint_url must be an http(s) URL".into());
                errors.add("email", err);
            }
        }

        if let Some(key) = self.admin_api_key.as_deref() {
            if key.trim().len() < 16 {
                let mut err = ValidationError::new("admin_api_key");
                err.message = Some("admin_api_key must be at least 16 characters".into());
                errors.add("admin_api_key", err);
            }
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_submission_throttle_secs() -> u64 {
    DEFAULT_SUBMISSION_THROTTLE_SECS
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_email_timeout_secs() -> u64 {
    DEFAULT_EMAIL_TIMEOUT_SECS
}

fn default_admin_recipient() -> String {
    "ventas@example.com".to_string()
}

fn default_business_name() -> String {
    "Cortinas a Medida".to_string()
}

fn default_support_email() -> String {
    "contacto@example.com".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("curtain_quotes_api={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://curtain_quotes.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration constraint validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".into(),
            "127.0.0.1".into(),
            8080,
            "production".into(),
        )
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://cortinas.example.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn development_allows_permissive_by_default() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn email_endpoint_must_be_http() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.email.endpoint_url = Some("ftp://mail.example.com".into());
        assert!(cfg.validate_additional_constraints().is_err());

        cfg.email.endpoint_url = Some("https://mail.example.com/send".into());
        assert!(cfg.validate_additional_constraints().is_ok());
        assert!(cfg.email.is_enabled());
    }

    #[test]
    fn short_admin_key_is_rejected() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.admin_api_key = Some("short".into());
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn defaults_match_thirty_second_throttle() {
        let cfg = base_config();
        assert_eq!(cfg.submission_throttle(), Duration::from_secs(30));
        assert!(cfg.validate().is_ok());
        assert!(!cfg.email.is_enabled());
    }

    #[test]
    fn zero_throttle_fails_validation() {
        let mut cfg = base_config();
        cfg.submission_throttle_secs = 0;
        assert!(cfg.validate().is_err());
    }
}

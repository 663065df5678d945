//! Configuration for BotSentry

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_PATH_ENV: &str = "BOTSENTRY_CONFIG";

/// Prefix for environment overrides, e.g. `BOTSENTRY__DATABASE__URL`
pub const ENV_PREFIX: &str = "BOTSENTRY";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment ("development", "staging", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound email configuration
    #[serde(default)]
    pub email: EmailConfig,

    /// AI content classifier configuration
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Daily review configuration
    #[serde(default)]
    pub review: ReviewConfig,

    /// Bulk signup detection configuration
    #[serde(default)]
    pub bulk_signup: BulkSignupConfig,

    /// Links embedded in emails
    #[serde(default)]
    pub links: LinksConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            api: ApiConfig::default(),
            logging: LoggingConfig::default(),
            email: EmailConfig::default(),
            classifier: ClassifierConfig::default(),
            review: ReviewConfig::default(),
            bulk_signup: BulkSignupConfig::default(),
            links: LinksConfig::default(),
        }
    }
}

fn default_environment() -> String {
    "development".to_string()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            bind_address: default_bind_address(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database backend (only "postgres" is supported)
    #[serde(default = "default_db_backend")]
    pub backend: String,

    /// Database URL
    pub url: Option<String>,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: default_db_backend(),
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_db_backend() -> String {
    "postgres".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// API port
    #[serde(default = "default_api_port")]
    pub port: u16,

    /// Serve the OpenAPI document and docs page
    #[serde(default = "default_enable_docs")]
    pub enable_docs: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: default_api_port(),
            enable_docs: default_enable_docs(),
        }
    }
}

fn default_api_port() -> u16 {
    8080
}

fn default_enable_docs() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Outbound email (SMTP) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host; when unset, sending is disabled and reported as such
    pub smtp_host: Option<String>,

    /// SMTP port
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// SMTP username
    pub smtp_username: Option<String>,

    /// SMTP password
    pub smtp_password: Option<String>,

    /// Use implicit TLS instead of STARTTLS
    #[serde(default)]
    pub use_tls: bool,

    /// Use STARTTLS
    #[serde(default = "default_use_starttls")]
    pub use_starttls: bool,

    /// Default sender address
    #[serde(default = "default_from_email")]
    pub from_email: String,

    /// Default sender display name
    #[serde(default = "default_from_name")]
    pub from_name: String,

    /// Optional Reply-To address
    pub reply_to: Option<String>,

    /// Recipients of the daily summary and bulk signup alerts
    #[serde(default)]
    pub admin_recipients: Vec<String>,

    /// Send timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            use_tls: false,
            use_starttls: default_use_starttls(),
            from_email: default_from_email(),
            from_name: default_from_name(),
            reply_to: None,
            admin_recipients: Vec::new(),
            timeout_secs: default_smtp_timeout(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_use_starttls() -> bool {
    true
}

fn default_from_email() -> String {
    "security@localhost".to_string()
}

fn default_from_name() -> String {
    "Bot Security".to_string()
}

fn default_smtp_timeout() -> u64 {
    30
}

/// AI content classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// API key; falls back to `ANTHROPIC_API_KEY`
    pub api_key: Option<String>,

    /// API base URL
    #[serde(default = "default_classifier_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_classifier_model")]
    pub model: String,

    /// Maximum tokens in the model reply
    #[serde(default = "default_classifier_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    /// Message bodies are truncated to this many characters
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_classifier_url(),
            model: default_classifier_model(),
            max_tokens: default_classifier_max_tokens(),
            timeout_secs: default_classifier_timeout(),
            max_body_chars: default_max_body_chars(),
        }
    }
}

fn default_classifier_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_classifier_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_classifier_max_tokens() -> u32 {
    4096
}

fn default_classifier_timeout() -> u64 {
    120
}

fn default_max_body_chars() -> usize {
    1000
}

/// Daily review configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Enable the scheduled daily review
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Poll interval in seconds
    #[serde(default = "default_review_poll_interval")]
    pub poll_interval_secs: u64,

    /// The review for "yesterday" runs once the UTC hour reaches this value
    #[serde(default = "default_review_run_hour")]
    pub run_hour_utc: u32,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_review_poll_interval(),
            run_hour_utc: default_review_run_hour(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_review_poll_interval() -> u64 {
    3600
}

fn default_review_run_hour() -> u32 {
    1
}

/// Bulk signup detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkSignupConfig {
    /// Enable the scheduled detector
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hours between detector runs
    #[serde(default = "default_bulk_interval_hours")]
    pub interval_hours: u64,

    /// Delay before the first run after startup
    #[serde(default = "default_bulk_initial_delay")]
    pub initial_delay_secs: u64,

    /// Registrations older than this are not considered
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: i64,

    /// Minimum number of bots in a cluster
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    /// Minimum number of distinct registration IPs in a cluster
    #[serde(default = "default_min_distinct_ips")]
    pub min_distinct_ips: usize,

    /// Minimum length of a candidate name prefix
    #[serde(default = "default_min_prefix_len")]
    pub min_prefix_len: usize,

    /// Maximum spread of registration timestamps within a cluster
    #[serde(default = "default_max_window_minutes")]
    pub max_window_minutes: i64,

    /// Duration of IP blocks installed on approval
    #[serde(default = "default_ip_block_days")]
    pub ip_block_days: i64,
}

impl Default for BulkSignupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_bulk_interval_hours(),
            initial_delay_secs: default_bulk_initial_delay(),
            lookback_hours: default_lookback_hours(),
            min_cluster_size: default_min_cluster_size(),
            min_distinct_ips: default_min_distinct_ips(),
            min_prefix_len: default_min_prefix_len(),
            max_window_minutes: default_max_window_minutes(),
            ip_block_days: default_ip_block_days(),
        }
    }
}

fn default_bulk_interval_hours() -> u64 {
    12
}

fn default_bulk_initial_delay() -> u64 {
    30
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_min_cluster_size() -> usize {
    5
}

fn default_min_distinct_ips() -> usize {
    2
}

fn default_min_prefix_len() -> usize {
    4
}

fn default_max_window_minutes() -> i64 {
    60
}

fn default_ip_block_days() -> i64 {
    14
}

/// Base URLs used to build links in notification emails
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    /// Public base URL of this service (approve deep links)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Base URL of the admin panel
    #[serde(default = "default_admin_panel_url")]
    pub admin_panel_url: String,

    /// Support page linked from owner notices
    #[serde(default = "default_support_url")]
    pub support_url: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            admin_panel_url: default_admin_panel_url(),
            support_url: default_support_url(),
        }
    }
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_admin_panel_url() -> String {
    "http://localhost:3000/admin/security".to_string()
}

fn default_support_url() -> String {
    "http://localhost:3000/support".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from the first config file found, overlaid with
    /// `BOTSENTRY__SECTION__KEY` environment variables
    pub fn load() -> crate::Result<Self> {
        let mut builder = config::Config::builder();

        match Self::locate_file() {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(config::File::from(path));
            }
            None => {
                tracing::warn!("No configuration file found, using defaults and environment");
            }
        }

        let mut config: Config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::Config(format!("Failed to load config: {}", e)))?;

        if config.classifier.api_key.is_none() {
            config.classifier.api_key = std::env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|k| !k.is_empty());
        }

        Ok(config)
    }

    fn locate_file() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(path));
        }

        [
            PathBuf::from("./botsentry.toml"),
            PathBuf::from("/etc/botsentry/config.toml"),
        ]
        .into_iter()
        .find(|p| p.exists())
    }

    /// Whether this is a production deployment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

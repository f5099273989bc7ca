use anyhow::bail;
use serde::Deserialize;
use std::time::Duration;

/// Smallest part S3 accepts in a multipart upload, other than the last
pub const MIN_MULTIPART_PART_BYTES: usize = 5 * 1024 * 1024;

/// Main configuration for the gallery service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// S3 configuration
    pub s3: S3Config,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Admin authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Public gallery configuration
    pub gallery: GalleryConfig,
    /// API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// S3 storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Bucket holding event covers and photos
    pub bucket: String,
    /// AWS region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for MinIO, LocalStack, etc.)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO)
    #[serde(default)]
    pub force_path_style: bool,
    /// Prefix for public object URLs, e.g. a CDN in front of the bucket
    pub public_url: Option<String>,
    /// Presigned download URL expiration in seconds
    #[serde(default = "default_presigned_url_expiry_secs")]
    pub presigned_url_expiry_secs: u64,
    /// Multipart upload threshold in bytes (5MB default)
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold_bytes: usize,
    /// Part size for multipart uploads in bytes (5MB default)
    #[serde(default = "default_part_size")]
    pub part_size_bytes: usize,
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Run migrations on startup
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

/// Admin session configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Session lifetime in seconds
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Interval between sweeps of expired sessions, in seconds
    #[serde(default = "default_session_sweep_interval_secs")]
    pub session_sweep_interval_secs: u64,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Mark the session cookie `Secure` (HTTPS only)
    #[serde(default)]
    pub secure_cookie: bool,
    /// Admin account created or reset on startup
    pub bootstrap_email: Option<String>,
    /// Password for the bootstrap admin account
    pub bootstrap_password: Option<String>,
}

/// Public gallery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GalleryConfig {
    /// Base URL embedded in QR codes, e.g. `https://photos.example.com`
    pub base_url: String,
    /// Maximum request body size for uploads in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

// Default value functions
fn default_service_name() -> String {
    "gallery-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_presigned_url_expiry_secs() -> u64 {
    3600
}

fn default_multipart_threshold() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_part_size() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_idle_timeout_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_session_ttl_secs() -> u64 {
    7 * 24 * 3600 // one week
}

fn default_session_sweep_interval_secs() -> u64 {
    3600
}

fn default_cookie_name() -> String {
    "gallery_session".to_string()
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024 // 256MB
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "gallery-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/gallery").required(false))
            .add_source(config::File::with_name("/etc/gallery/gallery").required(false))
            // Override with environment variables
            // GALLERY__DATABASE__URL -> database.url
            .add_source(
                config::Environment::with_prefix("GALLERY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make uploads or the session sweep misbehave
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.s3.part_size_bytes < MIN_MULTIPART_PART_BYTES {
            bail!(
                "s3.part_size_bytes must be at least {} bytes, got {}",
                MIN_MULTIPART_PART_BYTES,
                self.s3.part_size_bytes
            );
        }
        if self.auth.session_sweep_interval_secs == 0 {
            bail!("auth.session_sweep_interval_secs must be greater than zero");
        }
        Ok(())
    }

    /// Get admin session lifetime as Duration
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.session_ttl_secs)
    }

    /// Get expired-session sweep interval as Duration
    pub fn session_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.auth.session_sweep_interval_secs)
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: default_session_ttl_secs(),
            session_sweep_interval_secs: default_session_sweep_interval_secs(),
            cookie_name: default_cookie_name(),
            secure_cookie: false,
            bootstrap_email: None,
            bootstrap_password: None,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        assert_eq!(default_presigned_url_expiry_secs(), 3600);
        assert_eq!(default_session_ttl_secs(), 604_800);
        assert_eq!(default_cookie_name(), "gallery_session");
    }

    fn minimal_config() -> Config {
        config::Config::builder()
            .set_override("s3.bucket", "wedding-events")
            .unwrap()
            .set_override("database.url", "postgres://localhost/gallery")
            .unwrap()
            .set_override("gallery.base_url", "https://photos.example.com")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_validate_accepts_defaults() {
        let config = minimal_config();
        assert_eq!(config.s3.part_size_bytes, MIN_MULTIPART_PART_BYTES);
        assert!(config.validate().is_ok());
        assert_eq!(config.session_sweep_interval(), Duration::from_secs(3600));
    }

    #[test]
    fn test_validate_rejects_small_part_size() {
        let mut config = minimal_config();
        config.s3.part_size_bytes = 0;
        assert!(config.validate().is_err());

        config.s3.part_size_bytes = MIN_MULTIPART_PART_BYTES - 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_sweep_interval() {
        let mut config = minimal_config();
        config.auth.session_sweep_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_minimal_config() {
        let config: Config = config::Config::builder()
            .set_default("service.name", "gallery-service")
            .unwrap()
            .set_override("s3.bucket", "wedding-events")
            .unwrap()
            .set_override("database.url", "postgres://localhost/gallery")
            .unwrap()
            .set_override("gallery.base_url", "https://photos.example.com")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.s3.bucket, "wedding-events");
        assert_eq!(config.s3.region, "us-east-1");
        assert!(config.database.run_migrations);
        assert_eq!(config.auth.cookie_name, "gallery_session");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.session_ttl(), Duration::from_secs(604_800));
    }
}

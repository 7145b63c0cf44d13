//! Configuration module
//!
//! Everything is read from the environment (after loading `.env` through dotenvy).
//! Missing required settings are a fatal startup error.

use std::env;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::constants::VISION_MEDIA_TYPES;
use crate::storage_types::StorageBackend;

const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 120;
const MAX_FILE_SIZE_MB: usize = 10;
const EXTRACTION_TIMEOUT_SECS: u64 = 60;
const EXTRACTION_MAX_RETRIES: u32 = 1;
/// At most one automatic retry per extraction.
const EXTRACTION_RETRY_LIMIT: u32 = 1;
const EXTRACTION_MAX_TOKENS: u32 = 1024;
const CATEGORY_CACHE_TTL_SECS: u64 = 300;
const INVITE_CODE_TTL_DAYS: i64 = 7;
const DEFAULT_VISION_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const DEFAULT_CURRENCY_FORMAT: &str = "#,##0.00";

/// Settings shared by every binary (server port, database pool, auth, CORS).
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub cors_origins: Vec<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub request_timeout_secs: u64,
    pub environment: String,
    pub log_format: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub base: BaseConfig,
    pub database_url: String,
    // Receipt storage
    pub storage_backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
    pub receipt_max_file_size_bytes: usize,
    pub receipt_allowed_content_types: Vec<String>,
    // Extraction
    pub anthropic_api_key: String,
    pub anthropic_api_base: String,
    pub anthropic_vision_model: String,
    pub extraction_max_tokens: u32,
    pub extraction_timeout_secs: u64,
    pub extraction_max_retries: u32,
    // Workflow
    pub category_cache_ttl_secs: u64,
    /// Expenses above this amount are written as FLAGGED instead of DRAFT.
    pub flag_amount_threshold: Option<Decimal>,
    pub invite_code_ttl_days: i64,
    pub export_currency_format: String,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<AppConfig>);

impl Config {
    pub fn new(inner: AppConfig) -> Self {
        Config(Box::new(inner))
    }

    fn inner(&self) -> &AppConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        let config = AppConfig::from_lookup(|key| env::var(key).ok())?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().base.request_timeout_secs)
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn database_url(&self) -> &str {
        &self.inner().database_url
    }

    pub fn storage_backend(&self) -> StorageBackend {
        self.inner().storage_backend
    }

    pub fn s3_bucket(&self) -> Option<&str> {
        self.inner().s3_bucket.as_deref()
    }

    pub fn s3_region(&self) -> Option<&str> {
        self.inner().s3_region.as_deref()
    }

    pub fn s3_endpoint(&self) -> Option<&str> {
        self.inner().s3_endpoint.as_deref()
    }

    pub fn local_storage_path(&self) -> Option<&str> {
        self.inner().local_storage_path.as_deref()
    }

    pub fn local_storage_base_url(&self) -> Option<&str> {
        self.inner().local_storage_base_url.as_deref()
    }

    pub fn receipt_max_file_size_bytes(&self) -> usize {
        self.inner().receipt_max_file_size_bytes
    }

    pub fn receipt_allowed_content_types(&self) -> &[String] {
        &self.inner().receipt_allowed_content_types
    }

    pub fn anthropic_api_key(&self) -> &str {
        &self.inner().anthropic_api_key
    }

    pub fn anthropic_api_base(&self) -> &str {
        &self.inner().anthropic_api_base
    }

    pub fn anthropic_vision_model(&self) -> &str {
        &self.inner().anthropic_vision_model
    }

    pub fn extraction_max_tokens(&self) -> u32 {
        self.inner().extraction_max_tokens
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.inner().extraction_timeout_secs)
    }

    pub fn extraction_max_retries(&self) -> u32 {
        self.inner().extraction_max_retries
    }

    pub fn category_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.inner().category_cache_ttl_secs)
    }

    pub fn flag_amount_threshold(&self) -> Option<Decimal> {
        self.inner().flag_amount_threshold
    }

    pub fn invite_code_ttl_days(&self) -> i64 {
        self.inner().invite_code_ttl_days
    }

    pub fn export_currency_format(&self) -> &str {
        &self.inner().export_currency_format
    }
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn csv_lowercase(value: Option<String>, default: &str) -> Vec<String> {
    value
        .unwrap_or_else(|| default.to_string())
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl AppConfig {
    /// Build the configuration from a key lookup. `Config::from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT")
            .or_else(|| lookup("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let cors_origins_str = lookup("CORS_ORIGINS").unwrap_or_else(|| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }

        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .collect();

        let base = BaseConfig {
            server_port: lookup("PORT")
                .unwrap_or_else(|| "4000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number"))?,
            cors_origins,
            db_max_connections: parse_or(lookup("DB_MAX_CONNECTIONS"), MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(lookup("DB_TIMEOUT_SECONDS"), CONNECTION_TIMEOUT_SECS),
            jwt_secret: non_empty(lookup("JWT_SECRET"))
                .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            request_timeout_secs: parse_or(lookup("REQUEST_TIMEOUT_SECS"), REQUEST_TIMEOUT_SECS),
            environment,
            log_format: lookup("LOG_FORMAT")
                .unwrap_or_else(|| "text".to_string())
                .to_lowercase(),
        };

        let storage_backend = match non_empty(lookup("STORAGE_BACKEND")) {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let flag_amount_threshold = match non_empty(lookup("FLAG_AMOUNT_THRESHOLD")) {
            Some(value) => Some(value.trim().parse::<Decimal>().map_err(|_| {
                anyhow::anyhow!("FLAG_AMOUNT_THRESHOLD must be a decimal number")
            })?),
            None => None,
        };

        let config = AppConfig {
            base,
            database_url: non_empty(lookup("DATABASE_URL"))
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?,
            storage_backend,
            s3_bucket: non_empty(lookup("S3_BUCKET")),
            s3_region: non_empty(lookup("S3_REGION")).or_else(|| non_empty(lookup("AWS_REGION"))),
            s3_endpoint: non_empty(lookup("S3_ENDPOINT")),
            local_storage_path: non_empty(lookup("LOCAL_STORAGE_PATH")),
            local_storage_base_url: non_empty(lookup("LOCAL_STORAGE_BASE_URL")),
            receipt_max_file_size_bytes: parse_or(
                lookup("RECEIPT_MAX_FILE_SIZE_MB"),
                MAX_FILE_SIZE_MB,
            ) * 1024
                * 1024,
            receipt_allowed_content_types: csv_lowercase(
                lookup("RECEIPT_ALLOWED_CONTENT_TYPES"),
                "image/jpeg,image/png,image/webp,image/gif",
            ),
            anthropic_api_key: non_empty(lookup("ANTHROPIC_API_KEY"))
                .ok_or_else(|| anyhow::anyhow!("ANTHROPIC_API_KEY must be set"))?,
            anthropic_api_base: lookup("ANTHROPIC_API_BASE")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            anthropic_vision_model: lookup("ANTHROPIC_VISION_MODEL")
                .unwrap_or_else(|| DEFAULT_VISION_MODEL.to_string()),
            extraction_max_tokens: parse_or(lookup("EXTRACTION_MAX_TOKENS"), EXTRACTION_MAX_TOKENS),
            extraction_timeout_secs: parse_or(
                lookup("EXTRACTION_TIMEOUT_SECS"),
                EXTRACTION_TIMEOUT_SECS,
            ),
            extraction_max_retries: parse_or(
                lookup("EXTRACTION_MAX_RETRIES"),
                EXTRACTION_MAX_RETRIES,
            ),
            category_cache_ttl_secs: parse_or(
                lookup("CATEGORY_CACHE_TTL_SECS"),
                CATEGORY_CACHE_TTL_SECS,
            ),
            flag_amount_threshold,
            invite_code_ttl_days: parse_or(lookup("INVITE_CODE_TTL_DAYS"), INVITE_CODE_TTL_DAYS),
            export_currency_format: lookup("EXPORT_CURRENCY_FORMAT")
                .unwrap_or_else(|| DEFAULT_CURRENCY_FORMAT.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if !self.database_url.starts_with("postgresql://")
            && !self.database_url.starts_with("postgres://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.extraction_timeout_secs == 0 {
            return Err(anyhow::anyhow!("EXTRACTION_TIMEOUT_SECS must be positive"));
        }

        if self.extraction_max_retries > EXTRACTION_RETRY_LIMIT {
            return Err(anyhow::anyhow!(
                "EXTRACTION_MAX_RETRIES must be at most {}",
                EXTRACTION_RETRY_LIMIT
            ));
        }

        if let Some(unsupported) = self
            .receipt_allowed_content_types
            .iter()
            .find(|ct| !VISION_MEDIA_TYPES.contains(&ct.as_str()))
        {
            return Err(anyhow::anyhow!(
                "RECEIPT_ALLOWED_CONTENT_TYPES contains {}, which receipt extraction cannot read (supported: {})",
                unsupported,
                VISION_MEDIA_TYPES.join(", ")
            ));
        }

        if self.invite_code_ttl_days <= 0 {
            return Err(anyhow::anyhow!("INVITE_CODE_TTL_DAYS must be positive"));
        }

        if let Some(threshold) = self.flag_amount_threshold {
            if threshold.is_sign_negative() {
                return Err(anyhow::anyhow!(
                    "FLAG_AMOUNT_THRESHOLD must not be negative"
                ));
            }
        }

        match self.storage_backend {
            StorageBackend::S3 => {
                if self.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

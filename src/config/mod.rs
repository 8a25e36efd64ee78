use crate::utils::retry::RetryPolicy;
use std::env;
use std::time::Duration;

pub const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Runtime configuration for the CMS server and tools.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Per-request deadline for backend calls (default: 8 s)
    pub request_timeout: Duration,

    /// Total attempts for retryable failures, first call included (default: 3)
    pub retry_max_attempts: u32,

    /// First backoff delay, doubled per retry (default: 200 ms)
    pub retry_base_delay: Duration,

    /// Backoff cap (default: 2 s)
    pub retry_max_delay: Duration,

    /// Largest accepted image upload in bytes (default: 20 MB)
    pub max_image_size: usize,

    /// Base URL objects are served from; keys are appended to it
    pub public_storage_url: String,

    /// Contact form submissions per sender per hour (default: 5)
    pub contact_limit_per_hour: usize,

    /// Where contact form messages are delivered
    pub contact_recipient: String,

    /// Shared secret the auth service signs session tokens with
    pub jwt_secret: String,

    /// Where browsers without a session are sent (default: "/login")
    pub login_path: String,

    /// CORS origins; empty allows any
    pub allowed_origins: Vec<String>,

    /// ffmpeg executable used for HEIC conversion
    pub ffmpeg_path: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(8),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(2),
            max_image_size: 20 * 1024 * 1024,
            public_storage_url: "http://127.0.0.1:9000/media".to_string(),
            contact_limit_per_hour: 5,
            contact_recipient: "studio@localhost".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            login_path: "/login".to_string(),
            allowed_origins: Vec::new(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            request_timeout: parse_env("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.request_timeout),

            retry_max_attempts: parse_env::<u32>("RETRY_MAX_ATTEMPTS")
                .map(|n| n.max(1))
                .unwrap_or(default.retry_max_attempts),

            retry_base_delay: parse_env("RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry_base_delay),

            retry_max_delay: parse_env("RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry_max_delay),

            max_image_size: parse_env("MAX_IMAGE_SIZE").unwrap_or(default.max_image_size),

            public_storage_url: env::var("PUBLIC_STORAGE_URL")
                .unwrap_or(default.public_storage_url),

            contact_limit_per_hour: parse_env("CONTACT_LIMIT_PER_HOUR")
                .unwrap_or(default.contact_limit_per_hour),

            contact_recipient: env::var("CONTACT_RECIPIENT").unwrap_or(default.contact_recipient),

            jwt_secret: env::var("JWT_SECRET").unwrap_or(default.jwt_secret),

            login_path: env::var("LOGIN_PATH").unwrap_or(default.login_path),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),

            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(default.ffmpeg_path),
        }
    }

    /// Create config for development (short timeouts, generous contact limit)
    pub fn development() -> Self {
        Self {
            request_timeout: Duration::from_secs(5),
            contact_limit_per_hour: 100,
            ..Self::default()
        }
    }

    /// Create config for production (environment overrides the defaults)
    pub fn production() -> Self {
        let config = Self::from_env();
        Self {
            retry_max_attempts: config.retry_max_attempts.max(2),
            ..config
        }
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            timeout: self.request_timeout,
            ..RetryPolicy::default()
        }
    }
}

use std::str::FromStr;
use std::time::Duration;

use stemsvc_storage::{RetryConfig, S3Config};

use crate::engine::{default_concurrency, EngineConfig};

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development except
/// the S3 bucket, which is required unless `STORAGE_BACKEND=memory`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 256 MiB).
    pub max_upload_bytes: usize,
    pub engine: EngineConfig,
    pub storage: StorageSettings,
    pub retention: RetentionConfig,
}

/// Which object store to talk to, plus retry tuning.
#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    /// In-process store. Contents are lost on restart.
    Memory,
    S3(S3Config),
}

/// How long finished jobs are kept and how often they are swept.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Terminal jobs untouched for longer than this are evicted (default: 24 h).
    pub retention: Duration,
    /// Sweep period (default: 5 min).
    pub sweep_interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(24 * 3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be set")]
    Missing { var: &'static str },

    #[error("{var} must be {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `8080`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `MAX_UPLOAD_BYTES`      | `268435456`                |
    /// | `THREAD_BUDGET`         | `1`                        |
    /// | `MAX_CONCURRENT_JOBS`   | number of CPU cores        |
    /// | `QUEUE_CAPACITY`        | `64`                       |
    /// | `JOB_TIMEOUT_SECS`      | `600`                      |
    /// | `JOB_RETENTION_HOURS`   | `24`                       |
    /// | `RETENTION_SWEEP_SECS`  | `300`                      |
    /// | `STORAGE_BACKEND`       | `s3` (or `memory`)         |
    /// | `S3_BUCKET`             | required for `s3`          |
    /// | `S3_REGION`             | `auto`                     |
    /// | `S3_ENDPOINT_URL`       | unset (AWS)                |
    /// | `S3_ACCESS_KEY_ID`      | unset (provider chain)     |
    /// | `S3_SECRET_ACCESS_KEY`  | unset (provider chain)     |
    /// | `STORAGE_MAX_ATTEMPTS`  | `3`                        |
    /// | `STORAGE_BASE_DELAY_MS` | `200`                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let host = env.string("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = env.parse("PORT", 8080, "a valid u16")?;

        let cors_origins: Vec<String> = env
            .string("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = env.positive("REQUEST_TIMEOUT_SECS", 30)?;
        let max_upload_bytes: usize = env.positive("MAX_UPLOAD_BYTES", 256 * 1024 * 1024)?;

        let engine = EngineConfig {
            thread_budget: env.positive("THREAD_BUDGET", 1)?,
            max_concurrent_jobs: env.positive("MAX_CONCURRENT_JOBS", default_concurrency())?,
            queue_capacity: env.positive("QUEUE_CAPACITY", 64)?,
            job_timeout: Duration::from_secs(env.positive("JOB_TIMEOUT_SECS", 600)?),
        };

        let retention_hours: u64 = env.positive("JOB_RETENTION_HOURS", 24)?;
        let retention_secs = retention_hours
            .checked_mul(3600)
            .ok_or_else(|| ConfigError::Invalid {
                var: "JOB_RETENTION_HOURS",
                expected: "a number of hours that fits in seconds",
                value: retention_hours.to_string(),
            })?;

        let retention = RetentionConfig {
            retention: Duration::from_secs(retention_secs),
            sweep_interval: Duration::from_secs(env.positive("RETENTION_SWEEP_SECS", 300)?),
        };

        let backend = match env.string("STORAGE_BACKEND").as_deref() {
            None | Some("s3") => StorageBackend::S3(S3Config {
                bucket: env
                    .string("S3_BUCKET")
                    .ok_or(ConfigError::Missing { var: "S3_BUCKET" })?,
                region: env.string("S3_REGION").unwrap_or_else(|| "auto".into()),
                endpoint_url: env.string("S3_ENDPOINT_URL"),
                access_key_id: env.string("S3_ACCESS_KEY_ID"),
                secret_access_key: env.string("S3_SECRET_ACCESS_KEY"),
            }),
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STORAGE_BACKEND",
                    expected: "'s3' or 'memory'",
                    value: other.to_string(),
                })
            }
        };

        let retry = RetryConfig {
            max_attempts: env.positive("STORAGE_MAX_ATTEMPTS", 3)?,
            initial_delay: Duration::from_millis(env.parse(
                "STORAGE_BASE_DELAY_MS",
                200,
                "a number of milliseconds",
            )?),
            ..RetryConfig::default()
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            engine,
            storage: StorageSettings { backend, retry },
            retention,
        })
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    /// Non-empty, trimmed value of `var`.
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr>(
        &self,
        var: &'static str,
        default: T,
        expected: &'static str,
    ) -> Result<T, ConfigError> {
        match self.string(var) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                var,
                expected,
                value,
            }),
        }
    }

    /// Like [`parse`](Self::parse), rejecting zero.
    fn positive<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialEq,
    {
        let value: T = self.parse(var, default, "a positive integer")?;
        if value == T::default() {
            return Err(ConfigError::Invalid {
                var,
                expected: "a positive integer",
                value: "0".into(),
            });
        }
        Ok(value)
    }
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use stemsplit_core::separation::DemucsConfig;

/// Allowed CORS origins.
#[derive(Debug, Clone, PartialEq)]
pub enum CorsOrigins {
    /// `CORS_ORIGINS=*`: any origin, without credentials.
    Any,
    /// Explicit origin list; credentials allowed.
    List(Vec<HeaderValue>),
}

/// Errors raised while reading configuration at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults matching the container deployment
/// (`0.0.0.0:8000`, Demucs through `python3 -m demucs.separate`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from `CORS_ORIGINS` (`*` or comma-separated).
    pub cors_origins: CorsOrigins,
    /// HTTP request timeout in seconds (default: `300`). Covers upload time.
    pub request_timeout_secs: u64,
    /// Largest accepted request body in bytes (default: 200 MiB).
    pub max_upload_bytes: usize,
    /// Where uploaded audio waits for its job.
    pub upload_dir: PathBuf,
    /// Scratch space for separator output, one sub-directory per job.
    pub work_dir: PathBuf,
    /// Root of published stems, served under `/files`.
    pub storage_dir: PathBuf,
    /// Public URL prefix for published stems.
    pub storage_base_url: String,
    /// How the Demucs subprocess is invoked.
    pub demucs: DemucsConfig,
    /// Separations allowed to run at the same time (default: `1`).
    pub max_concurrent_jobs: usize,
    /// Age after which finished jobs are forgotten (default: 24 h).
    pub job_retention_secs: u64,
    /// How often the retention sweep runs (default: 10 min).
    pub retention_interval_secs: u64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                          |
    /// |--------------------------|----------------------------------|
    /// | `HOST`                   | `0.0.0.0`                        |
    /// | `PORT`                   | `8000`                           |
    /// | `CORS_ORIGINS`           | `*`                              |
    /// | `REQUEST_TIMEOUT_SECS`   | `300`                            |
    /// | `MAX_UPLOAD_BYTES`       | `209715200`                      |
    /// | `UPLOAD_DIR`             | `$TMPDIR/stemsplit/uploads`      |
    /// | `WORK_DIR`               | `$TMPDIR/stemsplit/work`         |
    /// | `STORAGE_DIR`            | `storage/stems`                  |
    /// | `STORAGE_BASE_URL`       | `http://localhost:8000/files`    |
    /// | `DEMUCS_PROGRAM`         | `python3`                        |
    /// | `DEMUCS_ARGS`            | `-m demucs.separate`             |
    /// | `SEPARATION_TIMEOUT_SECS`| `3600`                           |
    /// | `MAX_CONCURRENT_JOBS`    | `1`                              |
    /// | `JOB_RETENTION_SECS`     | `86400`                          |
    /// | `RETENTION_INTERVAL_SECS`| `600`                            |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let temp_root = std::env::temp_dir().join("stemsplit");

        let host = var("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_or("PORT", var("PORT"), 8000u16)?;
        let cors_origins = parse_cors(var("CORS_ORIGINS").as_deref().unwrap_or("*"))?;
        let request_timeout_secs = parse_or("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"), 300u64)?;
        let max_upload_bytes =
            parse_or("MAX_UPLOAD_BYTES", var("MAX_UPLOAD_BYTES"), 200 * 1024 * 1024usize)?;

        let upload_dir = var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| temp_root.join("uploads"));
        let work_dir = var("WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| temp_root.join("work"));
        let storage_dir = var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("storage/stems"));
        let storage_base_url =
            var("STORAGE_BASE_URL").unwrap_or_else(|| "http://localhost:8000/files".into());

        let defaults = DemucsConfig::default();
        let demucs = DemucsConfig {
            program: var("DEMUCS_PROGRAM").unwrap_or(defaults.program),
            leading_args: var("DEMUCS_ARGS")
                .map(|a| a.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.leading_args),
            timeout: Duration::from_secs(parse_or(
                "SEPARATION_TIMEOUT_SECS",
                var("SEPARATION_TIMEOUT_SECS"),
                defaults.timeout.as_secs(),
            )?),
        };

        let max_concurrent_jobs = parse_or("MAX_CONCURRENT_JOBS", var("MAX_CONCURRENT_JOBS"), 1usize)?;
        if max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                name: "MAX_CONCURRENT_JOBS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let job_retention_secs =
            parse_or("JOB_RETENTION_SECS", var("JOB_RETENTION_SECS"), 86_400u64)?;
        let retention_interval_secs =
            parse_or("RETENTION_INTERVAL_SECS", var("RETENTION_INTERVAL_SECS"), 600u64)?;

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_upload_bytes,
            upload_dir,
            work_dir,
            storage_dir,
            storage_base_url,
            demucs,
            max_concurrent_jobs,
            job_retention_secs,
            retention_interval_secs,
        })
    }
}

fn parse_or<T>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_cors(raw: &str) -> Result<CorsOrigins, ConfigError> {
    if raw.trim() == "*" {
        return Ok(CorsOrigins::Any);
    }
    let origins = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| ConfigError::Invalid {
                name: "CORS_ORIGINS",
                value: o.to_string(),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CorsOrigins::List(origins))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

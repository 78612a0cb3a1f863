use std::net::SocketAddr;
use std::path::PathBuf;

use facerec_core::DEFAULT_MATCH_THRESHOLD;

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server listens on (default: 0.0.0.0:8000).
    pub bind_addr: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Maximum Euclidean distance accepted as a match.
    pub match_threshold: f32,
    /// Upper bound on a multipart request body, in megabytes.
    pub max_upload_mb: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = facerec_core::default_data_dir();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            model_dir: facerec_core::default_model_dir(),
            db_path: data_dir.join("faces.db"),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            max_upload_mb: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load configuration from `FACEREC_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("FACEREC_BIND", defaults.bind_addr),
            model_dir: std::env::var("FACEREC_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.model_dir),
            db_path: std::env::var("FACEREC_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            match_threshold: env_parse("FACEREC_MATCH_THRESHOLD", defaults.match_threshold),
            max_upload_mb: env_parse("FACEREC_MAX_UPLOAD_MB", defaults.max_upload_mb),
            request_timeout_secs: env_parse(
                "FACEREC_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout_secs,
            ),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

/// Parse `key`, falling back to `default` when unset or malformed.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

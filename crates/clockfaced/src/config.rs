use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid bind address {0:?}")]
    BindAddr(String),
    #[error("invalid config file {path}: {key} must be a finite number above zero, got {value}")]
    NotPositive {
        path: PathBuf,
        key: &'static str,
        value: f32,
    },
}

/// Daemon configuration: optional TOML file, then `CLOCKFACE_*` overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:3000).
    pub bind_addr: String,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Face detector file name inside `model_dir`.
    pub detector_model: String,
    /// Descriptor network file name inside `model_dir`.
    pub recognizer_model: String,
    /// Maximum Euclidean distance, exclusive, for a positive match.
    pub match_threshold: f32,
    /// Length of the descriptor the model produces.
    pub embedding_dim: usize,
    /// Minimum detector confidence for a face to count.
    pub min_face_confidence: f32,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Upload size limit in MiB.
    pub max_upload_mb: usize,
    /// Defer model loading to the first face request instead of startup.
    pub lazy_model_load: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            db_path: data_dir.join("clockface.db"),
            model_dir: data_dir.join("models"),
            detector_model: "det_10g.onnx".to_string(),
            recognizer_model: "face_descriptor.onnx".to_string(),
            match_threshold: clockface_core::DEFAULT_THRESHOLD,
            embedding_dim: clockface_core::DEFAULT_EMBEDDING_DIM,
            min_face_confidence: 0.5,
            request_timeout_secs: 30,
            max_upload_mb: 10,
            lazy_model_load: false,
        }
    }
}

impl Config {
    /// Load from the file named by `CLOCKFACE_CONFIG` (if any), then apply
    /// `CLOCKFACE_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = match std::env::var_os("CLOCKFACE_CONFIG") {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        for (key, value) in [
            ("match_threshold", config.match_threshold),
            ("min_face_confidence", config.min_face_confidence),
        ] {
            if !is_positive(value) {
                return Err(ConfigError::NotPositive {
                    path: path.to_path_buf(),
                    key,
                    value,
                });
            }
        }
        Ok(config)
    }

    /// Apply overrides from `lookup`; unparsable values are ignored with a warning.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("CLOCKFACE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("CLOCKFACE_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLOCKFACE_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CLOCKFACE_DETECTOR_MODEL") {
            self.detector_model = v;
        }
        if let Some(v) = lookup("CLOCKFACE_RECOGNIZER_MODEL") {
            self.recognizer_model = v;
        }
        override_positive(&lookup, "CLOCKFACE_MATCH_THRESHOLD", &mut self.match_threshold);
        override_parsed(&lookup, "CLOCKFACE_EMBEDDING_DIM", &mut self.embedding_dim);
        override_positive(&lookup, "CLOCKFACE_MIN_FACE_CONFIDENCE", &mut self.min_face_confidence);
        override_parsed(&lookup, "CLOCKFACE_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs);
        override_parsed(&lookup, "CLOCKFACE_MAX_UPLOAD_MB", &mut self.max_upload_mb);
        if let Some(v) = lookup("CLOCKFACE_LAZY_MODEL_LOAD") {
            self.lazy_model_load = v != "0" && !v.eq_ignore_ascii_case("false");
        }
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr
            .parse()
            .map_err(|_| ConfigError::BindAddr(self.bind_addr.clone()))
    }

    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    pub fn recognizer_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb * 1024 * 1024
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("clockface")
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable setting"),
        }
    }
}

fn is_positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

fn override_positive(lookup: &impl Fn(&str) -> Option<String>, key: &str, slot: &mut f32) {
    let mut value = *slot;
    override_parsed(lookup, key, &mut value);
    if is_positive(value) {
        *slot = value;
    } else {
        tracing::warn!(key, value, "ignoring setting that is not a finite number above zero");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.match_threshold, 0.6);
        assert_eq!(config.embedding_dim, 128);
        assert!(!config.lazy_model_load);
        assert_eq!(config.socket_addr().unwrap().port(), 3000);
        assert_eq!(config.max_upload_bytes(), 10 * 1024 * 1024);
        assert!(config.detector_path().ends_with("models/det_10g.onnx"));
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::default().with_overrides(lookup(&[
            ("CLOCKFACE_BIND_ADDR", "127.0.0.1:8088"),
            ("CLOCKFACE_MODEL_DIR", "/opt/models"),
            ("CLOCKFACE_MATCH_THRESHOLD", "0.45"),
            ("CLOCKFACE_EMBEDDING_DIM", "512"),
            ("CLOCKFACE_LAZY_MODEL_LOAD", "1"),
        ]));
        assert_eq!(config.socket_addr().unwrap().port(), 8088);
        assert_eq!(config.recognizer_path(), PathBuf::from("/opt/models/face_descriptor.onnx"));
        assert_eq!(config.match_threshold, 0.45);
        assert_eq!(config.embedding_dim, 512);
        assert!(config.lazy_model_load);
    }

    #[test]
    fn test_bad_override_keeps_default() {
        let config = Config::default().with_overrides(lookup(&[("CLOCKFACE_EMBEDDING_DIM", "lots")]));
        assert_eq!(config.embedding_dim, 128);
    }

    #[test]
    fn test_threshold_overrides_must_be_positive() {
        for bad in ["NaN", "inf", "-0.4", "0"] {
            let config = Config::default().with_overrides(lookup(&[
                ("CLOCKFACE_MATCH_THRESHOLD", bad),
                ("CLOCKFACE_MIN_FACE_CONFIDENCE", bad),
            ]));
            assert_eq!(config.match_threshold, 0.6, "threshold {bad}");
            assert_eq!(config.min_face_confidence, 0.5, "confidence {bad}");
        }
    }

    #[test]
    fn test_toml_file_rejects_nan_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clockface.toml");
        std::fs::write(&path, "match_threshold = nan\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::NotPositive { key: "match_threshold", .. })
        ));

        std::fs::write(&path, "min_face_confidence = -1.0\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::NotPositive { key: "min_face_confidence", .. })
        ));
    }

    #[test]
    fn test_toml_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clockface.toml");
        std::fs::write(&path, "match_threshold = 0.5\nlazy_model_load = true\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.match_threshold, 0.5);
        assert!(config.lazy_model_load);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_toml_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(Config::from_file(&missing), Err(ConfigError::Read { .. })));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "match_threshold = \"high\"").unwrap();
        assert!(matches!(Config::from_file(&bad), Err(ConfigError::Parse { .. })));
    }
}

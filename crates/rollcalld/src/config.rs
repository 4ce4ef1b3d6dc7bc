use rollcall_core::{DeclinePolicy, SessionConfig, SessionTimeouts};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Where person IDs are resolved to names.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectorySource {
    /// Realtime-database REST endpoint; records live under `/Students/{id}`.
    Remote { database_url: String },
    /// Local JSON object mapping IDs to `{firstname, lastname}`.
    File { path: PathBuf },
}

/// Daemon configuration: defaults, then the TOML file, then environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Known-faces store produced by `rollcall encode`.
    pub known_faces_path: PathBuf,
    /// Attendance CSV ledger.
    pub ledger_path: PathBuf,
    pub directory: DirectorySource,
    /// Maximum Euclidean descriptor distance for a match (`ROLLCALL_MATCH_TOLERANCE`).
    /// Descriptors are unit length, so this is a minimum cosine similarity of
    /// `1 - t²/2`: 0.5 means cosine ≥ 0.875. Loosen it toward 1.0 for webcam galleries.
    pub match_tolerance: f32,
    pub recognition_window_secs: u64,
    pub marked_hold_secs: u64,
    pub already_marked_hold_secs: u64,
    pub decline_policy: DeclinePolicy,
    /// Frames discarded after the camera opens (auto-exposure settling).
    pub warmup_frames: usize,
    /// Exit once the session terminates instead of serving the final status.
    pub exit_on_complete: bool,
}

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub camera_device: Option<String>,
    pub model_dir: Option<PathBuf>,
    pub known_faces: Option<PathBuf>,
    pub ledger: Option<PathBuf>,
    pub database_url: Option<String>,
    pub students_file: Option<PathBuf>,
    pub match_tolerance: Option<f32>,
    pub recognition_window_secs: Option<u64>,
    pub marked_hold_secs: Option<u64>,
    pub already_marked_hold_secs: Option<u64>,
    pub decline_policy: Option<DeclinePolicy>,
    pub warmup_frames: Option<usize>,
    pub exit_on_complete: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}

impl Config {
    /// Load from `ROLLCALL_CONFIG` (or the default config path, if present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("ROLLCALL_CONFIG") {
            Ok(path) => Some(FileConfig::read(Path::new(&path))?),
            Err(_) => {
                let default = default_config_path();
                if default.exists() {
                    Some(FileConfig::read(&default)?)
                } else {
                    None
                }
            }
        };
        Ok(Self::from_sources(file.unwrap_or_default(), |k| std::env::var(k).ok()))
    }

    /// Merge a parsed file with environment lookups; the environment wins.
    pub fn from_sources(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = env("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let path_var = |key: &str, from_file: Option<PathBuf>, default: PathBuf| {
            env(key).map(PathBuf::from).or(from_file).unwrap_or(default)
        };

        let database_url = env("ROLLCALL_DATABASE_URL")
            .or_else(|| env("DATABASE_URL"))
            .or(file.database_url)
            .filter(|u| !u.trim().is_empty());
        let directory = match database_url {
            Some(database_url) => DirectorySource::Remote { database_url },
            None => DirectorySource::File {
                path: path_var(
                    "ROLLCALL_STUDENTS_FILE",
                    file.students_file,
                    data_dir.join("students.json"),
                ),
            },
        };

        let decline_policy = env("ROLLCALL_DECLINE_POLICY")
            .and_then(|v| parse_policy(&v))
            .or(file.decline_policy)
            .unwrap_or_default();

        Self {
            camera_device: env("ROLLCALL_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            model_dir: path_var(
                "ROLLCALL_MODEL_DIR",
                file.model_dir,
                rollcall_core::default_model_dir(),
            ),
            known_faces_path: path_var(
                "ROLLCALL_KNOWN_FACES",
                file.known_faces,
                data_dir.join("known_faces.json"),
            ),
            ledger_path: path_var("ROLLCALL_LEDGER", file.ledger, data_dir.join("attendance.csv")),
            directory,
            match_tolerance: parsed(&env, "ROLLCALL_MATCH_TOLERANCE")
                .or(file.match_tolerance)
                .unwrap_or(rollcall_core::DEFAULT_TOLERANCE),
            recognition_window_secs: parsed(&env, "ROLLCALL_RECOGNITION_WINDOW_SECS")
                .or(file.recognition_window_secs)
                .unwrap_or(30),
            marked_hold_secs: parsed(&env, "ROLLCALL_MARKED_HOLD_SECS")
                .or(file.marked_hold_secs)
                .unwrap_or(10),
            already_marked_hold_secs: parsed(&env, "ROLLCALL_ALREADY_MARKED_HOLD_SECS")
                .or(file.already_marked_hold_secs)
                .unwrap_or(5),
            decline_policy,
            warmup_frames: parsed(&env, "ROLLCALL_WARMUP_FRAMES")
                .or(file.warmup_frames)
                .unwrap_or(4),
            exit_on_complete: env("ROLLCALL_EXIT_ON_COMPLETE")
                .map(|v| v != "0")
                .or(file.exit_on_complete)
                .unwrap_or(false),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeouts: SessionTimeouts {
                recognition_window: Duration::from_secs(self.recognition_window_secs),
                marked_hold: Duration::from_secs(self.marked_hold_secs),
                already_marked_hold: Duration::from_secs(self.already_marked_hold_secs),
            },
            decline_policy: self.decline_policy,
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        })
        .join("rollcall/rollcall.toml")
}

fn parsed<T: std::str::FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment value");
            None
        }
    }
}

fn parse_policy(raw: &str) -> Option<DeclinePolicy> {
    match raw.trim() {
        "rearm" => Some(DeclinePolicy::Rearm),
        "hold_until_timeout" | "hold" => Some(DeclinePolicy::HoldUntilTimeout),
        other => {
            tracing::warn!(value = other, "unknown decline policy; using file/default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_sources(FileConfig::default(), env_of(&[("HOME", "/home/kiosk")]));
        assert_eq!(cfg.camera_device, "/dev/video0");
        assert_eq!(
            cfg.ledger_path,
            PathBuf::from("/home/kiosk/.local/share/rollcall/attendance.csv")
        );
        assert_eq!(
            cfg.directory,
            DirectorySource::File {
                path: PathBuf::from("/home/kiosk/.local/share/rollcall/students.json")
            }
        );
        assert_eq!(cfg.match_tolerance, 0.5);
        assert_eq!(cfg.session_config(), SessionConfig::default());
        assert!(!cfg.exit_on_complete);
    }

    #[test]
    fn test_database_url_selects_remote_directory() {
        let cfg = Config::from_sources(
            FileConfig::default(),
            env_of(&[("DATABASE_URL", "https://school.example.firebaseio.com")]),
        );
        assert_eq!(
            cfg.directory,
            DirectorySource::Remote {
                database_url: "https://school.example.firebaseio.com".into()
            }
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            camera_device = "/dev/video4"
            marked_hold_secs = 3
            decline_policy = "hold_until_timeout"
            match_tolerance = 0.6
            "#,
        )
        .unwrap();
        let cfg = Config::from_sources(
            file,
            env_of(&[
                ("ROLLCALL_CAMERA_DEVICE", "/dev/video2"),
                ("ROLLCALL_MATCH_TOLERANCE", "not-a-number"),
            ]),
        );
        assert_eq!(cfg.camera_device, "/dev/video2");
        assert_eq!(cfg.marked_hold_secs, 3);
        assert_eq!(cfg.match_tolerance, 0.6);
        assert_eq!(cfg.decline_policy, DeclinePolicy::HoldUntilTimeout);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(&path, "camera = \"/dev/video1\"\n").unwrap();
        assert!(matches!(FileConfig::read(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_policy_env_values() {
        assert_eq!(parse_policy("rearm"), Some(DeclinePolicy::Rearm));
        assert_eq!(parse_policy("hold"), Some(DeclinePolicy::HoldUntilTimeout));
        assert_eq!(parse_policy("sometimes"), None);
    }
}

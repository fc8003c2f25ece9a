//! Configuration file – reads/writes `~/.rpsu/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rpsu_runtime::settings::{DEFAULT_INTERVAL_MINUTES, PollSettings, interval_from_minutes};
use rpsu_types::{ProfileKind, RpsuError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Persisted operator configuration stored in `~/.rpsu/config.toml`.
///
/// Every key is optional; a missing file means all defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Minutes between polling cycles: 1, 5, 10, 15, 30 or 60.
    #[serde(default = "default_interval")]
    pub poll_interval_minutes: u64,

    /// `full` (with temperature, up to 5 devices) or `reduced`.
    #[serde(default)]
    pub profile: ProfileKind,

    /// Also write `<name>_utc_data.csv`.
    #[serde(default)]
    pub shifted_journal: bool,

    /// Directory holding the journal files.
    #[serde(default = "default_journal_dir")]
    pub journal_dir: PathBuf,

    /// The device list (`devices.json`).
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}
fn default_journal_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_registry_path() -> PathBuf {
    PathBuf::from("devices.json")
}
fn default_connect_timeout() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_minutes: default_interval(),
            profile: ProfileKind::default(),
            shifted_journal: false,
            journal_dir: default_journal_dir(),
            registry_path: default_registry_path(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Config {
    /// Settings for the supervisor. An interval outside the allowed set
    /// falls back to the default.
    pub fn poll_settings(&self) -> PollSettings {
        match PollSettings::from_minutes(self.poll_interval_minutes, self.shifted_journal) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "using default polling interval");
                PollSettings {
                    shifted_journal: self.shifted_journal,
                    ..PollSettings::default()
                }
            }
        }
    }
}

/// Return the path to `~/.rpsu/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rpsu").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, RpsuError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RpsuError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RpsuError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| RpsuError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `RPSU_*` environment variable overrides to `cfg`.
///
/// Invalid values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `RPSU_POLL_INTERVAL` | `poll_interval_minutes` |
/// | `RPSU_JOURNAL_DIR` | `journal_dir` |
/// | `RPSU_REGISTRY` | `registry_path` |
/// | `RPSU_PROFILE` | `profile` (`full` or `reduced`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RPSU_POLL_INTERVAL")
        && let Ok(minutes) = v.trim().parse::<u64>()
        && interval_from_minutes(minutes).is_ok()
    {
        cfg.poll_interval_minutes = minutes;
    }
    if let Ok(v) = std::env::var("RPSU_JOURNAL_DIR")
        && !v.trim().is_empty()
    {
        cfg.journal_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RPSU_REGISTRY")
        && !v.trim().is_empty()
    {
        cfg.registry_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RPSU_PROFILE") {
        match v.trim().to_ascii_lowercase().as_str() {
            "full" => cfg.profile = ProfileKind::Full,
            "reduced" => cfg.profile = ProfileKind::Reduced,
            _ => {}
        }
    }
}

/// Save the config to disk, creating `~/.rpsu/` if necessary.
pub fn save(cfg: &Config) -> Result<(), RpsuError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RpsuError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| RpsuError::Config(format!("failed to create config directory: {e}")))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RpsuError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| RpsuError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.poll_interval_minutes, 60);
        assert_eq!(loaded.profile, ProfileKind::Full);
        assert_eq!(loaded.registry_path, PathBuf::from("devices.json"));
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "profile = \"reduced\"\nshifted_journal = true\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.profile, ProfileKind::Reduced);
        assert!(cfg.shifted_journal);
        assert_eq!(cfg.poll_interval_minutes, 60);
        assert_eq!(cfg.connect_timeout_secs, 5);
    }

    #[test]
    fn unparsable_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "poll_interval_minutes = \"soon\"").unwrap();
        assert!(matches!(load_from(&path), Err(RpsuError::Config(_))));
    }

    #[test]
    fn config_path_points_to_rpsu_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".rpsu"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn invalid_interval_falls_back_to_default_settings() {
        let cfg = Config {
            poll_interval_minutes: 7,
            shifted_journal: true,
            ..Config::default()
        };
        let settings = cfg.poll_settings();
        assert_eq!(settings.interval, Duration::from_secs(3600));
        assert!(settings.shifted_journal);
    }

    #[test]
    fn apply_env_overrides_changes_interval_and_ignores_invalid() {
        // SAFETY: single-threaded test; no other test touches this variable.
        unsafe { std::env::set_var("RPSU_POLL_INTERVAL", "15") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.poll_interval_minutes, 15);

        unsafe { std::env::set_var("RPSU_POLL_INTERVAL", "7") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.poll_interval_minutes, 60);
        unsafe { std::env::remove_var("RPSU_POLL_INTERVAL") };
    }

    #[test]
    fn apply_env_overrides_changes_profile() {
        // SAFETY: single-threaded test; no other test touches this variable.
        unsafe { std::env::set_var("RPSU_PROFILE", "Reduced") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.profile, ProfileKind::Reduced);
        unsafe { std::env::remove_var("RPSU_PROFILE") };
    }

    #[test]
    fn apply_env_overrides_changes_paths() {
        // SAFETY: single-threaded test; no other test touches these variables.
        unsafe { std::env::set_var("RPSU_JOURNAL_DIR", "/var/lib/rpsu") };
        unsafe { std::env::set_var("RPSU_REGISTRY", "/etc/rpsu/devices.json") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.journal_dir, PathBuf::from("/var/lib/rpsu"));
        assert_eq!(cfg.registry_path, PathBuf::from("/etc/rpsu/devices.json"));
        unsafe { std::env::remove_var("RPSU_JOURNAL_DIR") };
        unsafe { std::env::remove_var("RPSU_REGISTRY") };
    }
}

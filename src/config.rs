use std::env;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const STORE_FILE: &str = "store.json";
const CONFIG_FILE: &str = "config.toml";
const APP_DIR: &str = "time_tracker";
const DEFAULT_TICK_MILLIS: u64 = 1000;
const DEFAULT_OFF_DUTY_TYPES: [&str; 2] = ["昼休憩", "中断"];

#[derive(Debug)]
pub enum ConfigError {
	Io(PathBuf, std::io::Error),
	TomlDecode(PathBuf, toml::de::Error),
}

impl Display for ConfigError {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			ConfigError::Io(path, err) => write!(f, "failed to read {}: {err}", path.display()),
			ConfigError::TomlDecode(path, err) => {
				write!(f, "failed to parse {}: {err}", path.display())
			}
		}
	}
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
	/// Type names shown in summaries but left out of the percentage base.
	pub off_duty_types: Vec<String>,
	pub tick_millis: u64,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			off_duty_types: DEFAULT_OFF_DUTY_TYPES.map(String::from).to_vec(),
			tick_millis: DEFAULT_TICK_MILLIS,
		}
	}
}

impl TrackerConfig {
	pub fn is_off_duty(&self, type_name: &str) -> bool {
		self.off_duty_types.iter().any(|name| name == type_name)
	}
}

/// Reads `path` (or `<state dir>/config.toml`); a missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<TrackerConfig, ConfigError> {
	let path = path.map(Path::to_path_buf).unwrap_or_else(|| state_dir().join(CONFIG_FILE));
	let raw = match fs::read_to_string(&path) {
		Ok(raw) => raw,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(TrackerConfig::default()),
		Err(err) => return Err(ConfigError::Io(path, err)),
	};

	toml::from_str(&raw).map_err(|err| ConfigError::TomlDecode(path, err))
}

pub fn resolve_store_path(cli_path: Option<PathBuf>) -> PathBuf {
	if let Some(path) = cli_path {
		return absolutize(path);
	}

	if let Some(path) = env::var_os("TIME_TRACKER_STORE") {
		let path = PathBuf::from(path);
		if !path.as_os_str().is_empty() {
			return absolutize(path);
		}
	}

	state_dir().join(STORE_FILE)
}

pub fn state_dir() -> PathBuf {
	if let Some(path) = env::var_os("TIME_TRACKER_STATE_DIR") {
		return PathBuf::from(path);
	}

	#[cfg(target_os = "windows")]
	{
		if let Some(path) = env::var_os("LOCALAPPDATA") {
			return PathBuf::from(path).join(APP_DIR);
		}
	}

	if let Some(path) = env::var_os("XDG_STATE_HOME") {
		return PathBuf::from(path).join(APP_DIR);
	}

	if let Some(path) = env::var_os("HOME") {
		return PathBuf::from(path).join(".local").join("state").join(APP_DIR);
	}

	PathBuf::from(".time_tracker")
}

fn absolutize(path: PathBuf) -> PathBuf {
	if path.is_absolute() {
		path
	} else if let Ok(cwd) = env::current_dir() {
		cwd.join(path)
	} else {
		path
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_config_file_uses_defaults() {
		let dir = tempfile::tempdir().expect("temp dir");
		let config = load_config(Some(&dir.path().join("absent.toml"))).expect("defaults");
		assert_eq!(config, TrackerConfig::default());
		assert!(config.is_off_duty("昼休憩"));
		assert!(config.is_off_duty("中断"));
		assert!(!config.is_off_duty("昼休憩 "));
	}

	#[test]
	fn partial_config_keeps_remaining_defaults() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("config.toml");
		fs::write(&path, "off_duty_types = [\"lunch\"]\n").unwrap();
		let config = load_config(Some(&path)).expect("parse");
		assert_eq!(config.off_duty_types, vec!["lunch".to_string()]);
		assert_eq!(config.tick_millis, DEFAULT_TICK_MILLIS);
	}

	#[test]
	fn malformed_config_is_an_error() {
		let dir = tempfile::tempdir().expect("temp dir");
		let path = dir.path().join("config.toml");
		fs::write(&path, "off_duty_types = 3\n").unwrap();
		assert!(matches!(load_config(Some(&path)), Err(ConfigError::TomlDecode(..))));
	}

	#[test]
	fn explicit_store_path_wins() {
		let path = resolve_store_path(Some(PathBuf::from("/tmp/explicit.json")));
		assert_eq!(path, PathBuf::from("/tmp/explicit.json"));
	}
}

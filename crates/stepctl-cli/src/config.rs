//! Configuration – reads/writes `~/.stepctl/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use stepctl_hal::sim::DEFAULT_MAX_VELOCITY;
use stepctl_types::MicroStepResolution;

use crate::notifier::DEFAULT_LISTENER_STACK_SIZE;

const CONFIG_DIR: &str = ".stepctl";
const CONFIG_FILE: &str = "config.toml";

/// One simulated stepper bound at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device name used on the command line, e.g. `"stepper0"`.
    pub name: String,

    /// Initial maximum velocity in micro-steps per second.
    #[serde(default = "default_max_velocity")]
    pub max_velocity: u32,

    /// Initial micro-step resolution (1, 2, 4 … 256).
    #[serde(default = "default_micro_step_res")]
    pub micro_step_res: MicroStepResolution,
}

impl DeviceConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_velocity: default_max_velocity(),
            micro_step_res: default_micro_step_res(),
        }
    }
}

/// Persisted shell configuration stored in `~/.stepctl/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Report motion completion asynchronously.  When off, motion commands
    /// neither start the listener nor hand a completion channel to the
    /// driver.
    #[serde(default = "default_async_notifications")]
    pub async_notifications: bool,

    /// Stack size of the completion listener thread, in bytes.
    #[serde(default = "default_listener_stack_size")]
    pub listener_stack_size: usize,

    /// Simulated devices to bind.
    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceConfig>,
}

fn default_async_notifications() -> bool {
    true
}
fn default_listener_stack_size() -> usize {
    DEFAULT_LISTENER_STACK_SIZE
}
fn default_max_velocity() -> u32 {
    DEFAULT_MAX_VELOCITY
}
fn default_micro_step_res() -> MicroStepResolution {
    MicroStepResolution::Sixteenth
}
fn default_devices() -> Vec<DeviceConfig> {
    vec![DeviceConfig::named("stepper0"), DeviceConfig::named("stepper1")]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            async_notifications: default_async_notifications(),
            listener_stack_size: default_listener_stack_size(),
            devices: default_devices(),
        }
    }
}

/// Failure to read or write the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to write config at {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// `~/.stepctl/config.toml`, falling back to the working directory when no
/// home directory is set.
pub fn config_path() -> PathBuf {
    let home = ["HOME", "USERPROFILE"]
        .into_iter()
        .find_map(|var| std::env::var_os(var))
        .unwrap_or_else(|| ".".into());
    config_path_for_home(Path::new(&home))
}

pub(crate) fn config_path_for_home(home: &Path) -> PathBuf {
    home.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load the config from disk.  Returns `None` if the file does not exist.
/// Environment overrides are not applied; see [`apply_env_overrides`].
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    Ok(Some(toml::from_str(&raw)?))
}

/// Apply `STEPCTL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `STEPCTL_ASYNC` | `async_notifications` (`1`/`0`/`true`/`false`/`on`/`off`) |
/// | `STEPCTL_LISTENER_STACK_SIZE` | `listener_stack_size` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STEPCTL_ASYNC") {
        match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" => cfg.async_notifications = true,
            "0" | "false" | "off" => cfg.async_notifications = false,
            _ => {}
        }
    }
    if let Ok(v) = std::env::var("STEPCTL_LISTENER_STACK_SIZE")
        && let Ok(size) = v.trim().parse::<usize>()
    {
        cfg.listener_stack_size = size;
    }
}

/// Save the config to disk, creating `~/.stepctl/` if necessary.  On unix the
/// directory is made private (0700) and the file owner-only (0600).
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let raw = toml::to_string_pretty(cfg)?;
    let write_err = |source: io::Error| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(dir) = path.parent() {
        create_private_dir(dir).map_err(write_err)?;
    }
    write_private_file(path, raw.as_bytes()).map_err(write_err)
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?
        .write_all(contents)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, contents: &[u8]) -> io::Result<()> {
    fs::write(path, contents)
}

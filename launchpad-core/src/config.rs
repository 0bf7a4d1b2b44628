//! Launch configuration stored at `~/.launchpad/config.yaml`.
//!
//! # API pattern
//!
//! Every function touching disk has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! A missing config file is not an error: [`load_at`] returns the defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::paths::{config_path, launchpad_root};

/// A program plus its arguments, spawned inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Effective settings for one `launchpad up` session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchConfig {
    /// Dependency install step; must exit 0 before the server starts.
    pub install: CommandSpec,
    /// Long-running server step; never awaited.
    pub run: CommandSpec,
    /// Translate bare `\n` to `\r\n` before writing to the terminal.
    pub convert_eol: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boot_timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_timeout_secs: Option<u64>,
    /// Sandbox root. A fresh temporary directory is used when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_dir: Option<PathBuf>,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            install: CommandSpec::new("npm", ["install"]),
            run: CommandSpec::new("npm", ["run", "start"]),
            convert_eol: true,
            boot_timeout_secs: None,
            install_timeout_secs: None,
            workspace_dir: None,
        }
    }
}

impl LaunchConfig {
    pub fn boot_timeout(&self) -> Option<Duration> {
        self.boot_timeout_secs.map(Duration::from_secs)
    }

    pub fn install_timeout(&self) -> Option<Duration> {
        self.install_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.install.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "install.program",
                reason: "must not be empty".to_string(),
            });
        }
        if self.run.program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "run.program",
                reason: "must not be empty".to_string(),
            });
        }
        if self.boot_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "boot_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.install_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "install_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Load `<home>/.launchpad/config.yaml`, or the defaults when absent.
pub fn load_at(home: &Path) -> Result<LaunchConfig, ConfigError> {
    let path = config_path(home);
    if !path.exists() {
        return Ok(LaunchConfig::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: LaunchConfig =
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<LaunchConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &LaunchConfig) -> Result<PathBuf, ConfigError> {
    config.validate()?;
    let root = launchpad_root(home);
    std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;

    let path = config_path(home);
    let tmp = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// Write the default config. Refuses to overwrite unless `force` is set.
pub fn init_at(home: &Path, force: bool) -> Result<PathBuf, ConfigError> {
    let path = config_path(home);
    if path.exists() && !force {
        return Err(ConfigError::AlreadyExists { path });
    }
    save_at(home, &LaunchConfig::default())
}

/// `init_at` convenience wrapper.
pub fn init(force: bool) -> Result<PathBuf, ConfigError> {
    init_at(&home()?, force)
}

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

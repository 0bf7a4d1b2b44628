use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.yaml";

pub fn launchpad_root(home: &Path) -> PathBuf {
    home.join(".launchpad")
}

pub fn config_path(home: &Path) -> PathBuf {
    launchpad_root(home).join(CONFIG_FILE)
}

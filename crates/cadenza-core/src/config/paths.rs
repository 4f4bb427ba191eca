//! Standard locations for cadenza configuration files

use std::path::PathBuf;

/// Directory holding cadenza configuration
///
/// Returns: `<platform config dir>/cadenza` (for example
/// `~/.config/cadenza` on Linux), or `./cadenza` when the platform has no
/// config directory.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadenza")
}

/// Path of a config file inside [`default_config_dir`]
pub fn default_config_path(filename: &str) -> PathBuf {
    default_config_dir().join(filename)
}

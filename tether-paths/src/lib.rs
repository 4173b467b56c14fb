//! XDG Base Directory paths for tether.
//!
//! CLI tools should use XDG paths for cross-platform consistency,
//! not platform-native paths.

use std::path::PathBuf;

/// Name of the user configuration file inside [`config_dir`].
pub const CONFIG_FILE: &str = "config.toml";

/// Get the tether config directory.
///
/// Returns `$XDG_CONFIG_HOME/tether` if set, otherwise `~/.config/tether`.
///
/// # Examples
///
/// ```
/// use tether_paths::config_dir;
///
/// let config = config_dir();
/// assert!(config.ends_with("tether"));
/// ```
pub fn config_dir() -> PathBuf {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join("tether")
    } else if let Some(home) = dirs::home_dir() {
        home.join(".config/tether")
    } else {
        PathBuf::from(".config/tether")
    }
}

/// Path of the user configuration file.
pub fn user_config_file() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_config_dir_ends_with_tether() {
        let path = config_dir();
        assert!(
            path.ends_with("tether"),
            "config_dir should end with 'tether'"
        );
    }

    #[test]
    #[serial]
    fn test_config_dir_respects_xdg_env() {
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", "/tmp/test-config");
        }
        let path = config_dir();
        let file = user_config_file();
        unsafe {
            std::env::remove_var("XDG_CONFIG_HOME");
        }
        assert_eq!(path, PathBuf::from("/tmp/test-config/tether"));
        assert_eq!(file, PathBuf::from("/tmp/test-config/tether/config.toml"));
    }
}

//! Bridge configuration from environment variables.

use std::path::PathBuf;

/// Where the bridge finds the music library and keeps its state files.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    /// Root directory scripts may browse and queue from.
    pub library_root: PathBuf,
    /// Directory holding `playlist.json` and `settings.toml`.
    pub data_dir: PathBuf,
    /// Reported by `system.getRockboxVersion`.
    pub version: String,
    /// Upper bound on start/resume turns of one script session.
    pub max_turns: usize,
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            library_root: home_dir().join("Music"),
            data_dir: rockbox_library::data_dir(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            max_turns: 10_000,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            library_root: std::env::var("ROCKBOX_LIBRARY")
                .map(PathBuf::from)
                .unwrap_or(defaults.library_root),
            data_dir: defaults.data_dir,
            version: std::env::var("ROCKBOX_VERSION").unwrap_or(defaults.version),
            max_turns: std::env::var("SCRIPT_MAX_TURNS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.max_turns),
        }
    }

    /// Rooted at `library_root`, with state files under `data_dir`.
    pub fn new(library_root: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_root: library_root.into(),
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn playlist_file(&self) -> PathBuf {
        self.data_dir.join("playlist.json")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.data_dir.join("settings.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_files() {
        let config = BridgeConfig::new("/music", "/var/lib/rockbox");
        assert_eq!(config.playlist_file(), PathBuf::from("/var/lib/rockbox/playlist.json"));
        assert_eq!(config.settings_file(), PathBuf::from("/var/lib/rockbox/settings.toml"));
        assert_eq!(config.max_turns, 10_000);
        assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("ROCKBOX_LIBRARY", "/srv/music");
        std::env::set_var("ROCKBOX_VERSION", "4.0-custom");
        std::env::set_var("SCRIPT_MAX_TURNS", "0");

        let config = BridgeConfig::from_env();
        assert_eq!(config.library_root, PathBuf::from("/srv/music"));
        assert_eq!(config.version, "4.0-custom");
        assert_eq!(config.max_turns, 10_000);

        std::env::remove_var("ROCKBOX_LIBRARY");
        std::env::remove_var("ROCKBOX_VERSION");
        std::env::remove_var("SCRIPT_MAX_TURNS");
    }
}

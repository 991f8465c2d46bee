// Environment configuration for the switcher CLI
// Handles the state directory, the host auto-save file and the snapshot extension

use std::path::PathBuf;

/// Default snapshot file extension
pub const DEFAULT_EXTENSION: &str = "settings";

/// Configuration for switcher paths and settings
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for switcher state (preferences, live file, project marker)
    pub state_dir: PathBuf,
    /// File the host auto-saves its configuration to; its parent is the
    /// snapshot directory
    pub auto_save_file: PathBuf,
    /// Snapshot file extension, without the leading dot
    pub extension: String,
}

impl Config {
    /// Create configuration using default paths
    pub fn default_paths() -> Self {
        let extension = DEFAULT_EXTENSION.to_string();
        Self {
            state_dir: Self::default_state_dir(),
            auto_save_file: Self::default_auto_save_file(&extension),
            extension,
        }
    }

    /// Create configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default_paths();

        if let Ok(ext) = std::env::var("SNAPSHOT_SWITCHER_EXT") {
            let ext = ext.trim().trim_start_matches('.');
            if !ext.is_empty() {
                config.extension = ext.to_string();
                config.auto_save_file = Self::default_auto_save_file(&config.extension);
            }
        }
        if let Ok(dir) = std::env::var("SNAPSHOT_SWITCHER_DIR") {
            config.state_dir = PathBuf::from(dir);
        }
        if let Ok(file) = std::env::var("SNAPSHOT_SWITCHER_AUTO_SAVE") {
            config.auto_save_file = PathBuf::from(file);
        }

        config
    }

    /// Get the default state directory
    fn default_state_dir() -> PathBuf {
        // All platforms: ~/.snapshot-switcher/ (or /tmp/snapshot-switcher if home unavailable)
        dirs::home_dir()
            .map(|h| h.join(".snapshot-switcher"))
            .unwrap_or_else(|| PathBuf::from("/tmp/snapshot-switcher"))
    }

    /// `<documents>/Settings/CurrentSettings.<ext>`
    fn default_auto_save_file(extension: &str) -> PathBuf {
        dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("Settings")
            .join(format!("CurrentSettings.{}", extension))
    }

    /// Get the state directory
    pub fn state_dir(&self) -> &PathBuf {
        &self.state_dir
    }

    /// Get the preferences.json file path
    pub fn preferences_file(&self) -> PathBuf {
        self.state_dir.join("preferences.json")
    }

    /// The file snapshots are applied to and exported from
    pub fn live_settings_file(&self) -> PathBuf {
        self.state_dir.join(format!("live.{}", self.extension))
    }

    /// Ensure the state directory exists
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.state_dir)
    }

    /// Path to the current project marker file
    pub fn current_project_file(&self) -> PathBuf {
        self.state_dir.join("current_project.txt")
    }

    /// Persist the current project path
    pub fn write_current_project(&self, path: &str) -> std::io::Result<()> {
        self.ensure_dirs()?;
        std::fs::write(self.current_project_file(), path)
    }

    /// Read the last recorded current project path
    pub fn read_current_project(&self) -> Option<PathBuf> {
        std::fs::read_to_string(self.current_project_file())
            .ok()
            .map(|s| PathBuf::from(s.trim()))
            .filter(|p| !p.as_os_str().is_empty() && p.is_absolute())
    }

    /// Clear the current project marker
    pub fn clear_current_project(&self) -> std::io::Result<()> {
        let marker = self.current_project_file();
        if marker.exists() {
            std::fs::remove_file(marker)
        } else {
            Ok(())
        }
    }
}

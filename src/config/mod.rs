use crate::error::{BrowseError, Result};
use config::{Config, Environment, File, FileFormat};
use dirs::home_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the table cursor highlights: whole rows or single cells.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    #[default]
    Row,
    Cell,
}

impl CursorMode {
    pub fn toggle(self) -> CursorMode {
        match self {
            CursorMode::Row => CursorMode::Cell,
            CursorMode::Cell => CursorMode::Row,
        }
    }
}

/// User settings. Read from `~/.liteadmin-cli/config.json` and `LITEADMIN_*`
/// environment variables; never written back.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub page_size: usize,
    pub dark_theme: bool,
    pub cursor_mode: CursorMode,
    pub busy_timeout_ms: u64,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            page_size: 50,
            dark_theme: true,
            cursor_mode: CursorMode::Row,
            busy_timeout_ms: 5000,
            log_dir: Settings::get_app_dir().join("logs"),
        }
    }
}

impl Settings {
    /// Reads the default config file, which may be absent.
    pub fn load() -> Result<Self> {
        Self::build(&Self::get_config_file_path(), false)
    }

    /// Reads a config file the user named explicitly; a missing file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(path, true)
    }

    /// Layers defaults, the JSON file at `path` and the environment.
    fn build(path: &Path, required: bool) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Json)
                    .required(required),
            )
            .add_source(Environment::with_prefix("LITEADMIN").try_parsing(true))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| BrowseError::Config(format!("{}: {}", path.display(), e)))?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(BrowseError::Config(
                "page_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn get_config_file_path() -> PathBuf {
        Self::get_app_dir().join("config.json")
    }

    fn get_app_dir() -> PathBuf {
        // Fall back to the current directory when no home directory is known
        home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".liteadmin-cli")
    }
}

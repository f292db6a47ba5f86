use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::pdf::PDFIUM_LIBRARY_ENV;

pub const STORE_PATH_ENV: &str = "RESUME_STORE_PATH";
pub const OUTPUT_DIR_ENV: &str = "RESUME_OUTPUT_DIR";

const DEFAULT_STORE_PATH: &str = "resume-store.json";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// PDFium library file, or the directory holding it
    pub pdfium_library_path: Option<PathBuf>,
    /// JSON file backing the analysis store
    pub store_path: PathBuf,
    /// Where previews are written; next to each input when unset
    pub output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            pdfium_library_path: None,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            output_dir: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppConfig {
    /// Read `path` (a missing file means defaults), then apply environment
    /// overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => {
                let raw = fs::read_to_string(path)?;
                serde_json::from_str(&raw)?
            }
            _ => AppConfig::default(),
        };
        config.apply_overrides(|name| env::var(name).ok());
        Ok(config)
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(path) = var(PDFIUM_LIBRARY_ENV) {
            self.pdfium_library_path = Some(PathBuf::from(path));
        }
        if let Some(path) = var(STORE_PATH_ENV) {
            self.store_path = PathBuf::from(path);
        }
        if let Some(dir) = var(OUTPUT_DIR_ENV) {
            self.output_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(path, raw)?;
        Ok(())
    }
}

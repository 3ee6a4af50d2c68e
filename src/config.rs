use crate::metadata::Language;
use anyhow::{Context, Result};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

const APP_DIR_NAME: &str = "modorder";
const SETTINGS_FILE: &str = "settings.json";
const PRESET_DIR_NAME: &str = "presets";
const DEFAULT_FONT_SIZE: u32 = 10;

/// Persisted user settings. Paths are stored as given and validated only when
/// a load is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub config_path: String,
    #[serde(default)]
    pub mod_root_path: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default)]
    pub lang: Language,
    #[serde(skip)]
    path: PathBuf,
}

impl AppSettings {
    pub fn load_or_create() -> Result<Self> {
        let base_dir = base_data_dir()?;
        Self::load_or_create_at(&base_dir.join(SETTINGS_FILE))
    }

    pub fn load_or_create_at(path: &Path) -> Result<Self> {
        if path.exists() {
            let raw = fs::read_to_string(path).context("read settings")?;
            let mut settings: AppSettings =
                serde_json::from_str(&raw).context("parse settings")?;
            settings.path = path.to_path_buf();
            return Ok(settings);
        }

        let settings = AppSettings {
            config_path: String::new(),
            mod_root_path: String::new(),
            font_size: DEFAULT_FONT_SIZE,
            lang: Language::default(),
            path: path.to_path_buf(),
        };
        settings.save()?;
        Ok(settings)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("create app data dir")?;
        }
        let raw = serde_json::to_string_pretty(self).context("serialize settings")?;
        fs::write(&self.path, raw).context("write settings")?;
        Ok(())
    }

    pub fn data_dir(&self) -> &Path {
        self.path.parent().unwrap_or(Path::new("."))
    }

    pub fn preset_dir(&self) -> PathBuf {
        self.data_dir().join(PRESET_DIR_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir().join("modorder.log")
    }
}

fn default_font_size() -> u32 {
    DEFAULT_FONT_SIZE
}

fn base_data_dir() -> Result<PathBuf> {
    let base = BaseDirs::new().context("resolve home dir")?;
    Ok(base.data_local_dir().join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn creates_defaults_on_first_run() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("app").join(SETTINGS_FILE);
        let settings = AppSettings::load_or_create_at(&path).unwrap();

        assert!(path.exists());
        assert_eq!(settings.font_size, 10);
        assert_eq!(settings.lang, Language::Cn);
        assert!(settings.config_path.is_empty());
        assert_eq!(settings.preset_dir(), temp.path().join("app").join("presets"));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"config_path": "/g/Config.ini", "lang": "en"}"#).unwrap();

        let settings = AppSettings::load_or_create_at(&path).unwrap();
        assert_eq!(settings.config_path, "/g/Config.ini");
        assert_eq!(settings.lang, Language::En);
        assert_eq!(settings.font_size, 10);
        assert!(settings.mod_root_path.is_empty());
    }

    #[test]
    fn save_round_trips() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        let mut settings = AppSettings::load_or_create_at(&path).unwrap();
        settings.mod_root_path = "/g/workshop".to_string();
        settings.font_size = 14;
        settings.save().unwrap();

        let reloaded = AppSettings::load_or_create_at(&path).unwrap();
        assert_eq!(reloaded, settings);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"mod_root_path\": \"/g/workshop\""));
        assert!(!raw.contains("\"path\""));
    }
}

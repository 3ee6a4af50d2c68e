use crate::{
    backup::{BackupStatus, SaveOutcome},
    config::AppSettings,
    error::CoreError,
    metadata::Language,
    preset::{self, MissingRef},
    session::Session,
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use time::OffsetDateTime;

const LOG_CAPACITY: usize = 200;
const MISSING_PREVIEW: usize = 10;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Paths given on the command line for a single run.
#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub config_path: Option<PathBuf>,
    pub mod_root: Option<PathBuf>,
}

pub struct App {
    pub settings: AppSettings,
    pub lang: Language,
    session: Option<Session>,
    logs: Vec<LogEntry>,
    log_path: PathBuf,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let settings = AppSettings::load_or_create()?;
        Ok(Self::with_settings(settings))
    }

    pub fn with_settings(settings: AppSettings) -> Self {
        let log_path = settings.log_path();
        Self {
            lang: settings.lang,
            settings,
            session: None,
            logs: Vec::new(),
            log_path,
        }
    }

    /// Opens the config file named by the settings (or the overrides) and
    /// loads its load order.
    pub fn open_session(&mut self, overrides: &PathOverrides) -> Result<()> {
        let config_path = overrides
            .config_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.settings.config_path));
        let mod_root = overrides
            .mod_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(&self.settings.mod_root_path));

        let (session, summary) = match Session::open(config_path, mod_root) {
            Ok(opened) => opened,
            Err(err) => {
                self.log_error(format!("Load failed: {err:#}"));
                return Err(err);
            }
        };

        for degraded in &summary.degraded {
            self.log_warn(format!("Metadata skipped: {degraded}"));
        }
        if !summary.section_found {
            self.log_warn(format!(
                "No [LoadOrder] section in {}",
                session.config_path().display()
            ));
        }
        if let Some(declared) = summary
            .declared_count
            .filter(|declared| *declared != summary.count)
        {
            self.log_warn(format!(
                "NumberOfModFiles says {declared}, found {} usable entries",
                summary.count
            ));
        }
        self.log_info(format!(
            "Loaded {} mod(s) from {} (mods in {})",
            summary.count,
            session.config_path().display(),
            session.mod_root().display()
        ));
        self.session = Some(session);
        Ok(())
    }

    pub fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or_else(|| CoreError::NotLoaded.into())
    }

    pub fn session_mut(&mut self) -> Result<&mut Session> {
        self.session.as_mut().ok_or_else(|| CoreError::NotLoaded.into())
    }

    /// Saves the live order. `confirm_without_backup` is asked only when the
    /// backup copy fails.
    pub fn save_config<F>(&mut self, confirm_without_backup: F) -> Result<SaveOutcome>
    where
        F: FnOnce(&CoreError) -> bool,
    {
        let outcome = self.session_mut()?.save(confirm_without_backup);
        match &outcome {
            Ok(SaveOutcome::Saved { backup }) => {
                match backup {
                    BackupStatus::Created(path) => {
                        self.log_info(format!("Backup written: {}", path.display()))
                    }
                    BackupStatus::Skipped(err) => {
                        self.log_warn(format!("Saved without backup: {err}"))
                    }
                }
                self.log_info("Config saved".to_string());
            }
            Ok(SaveOutcome::Aborted { reason }) => {
                self.log_warn(format!("Save aborted: {reason}"));
            }
            Ok(SaveOutcome::NothingToSave) => {
                self.log_info("Save skipped: no mods loaded".to_string());
            }
            Err(err) => self.log_error(format!("Save failed: {err:#}")),
        }
        outcome
    }

    pub fn save_preset(&mut self, name: Option<&str>) -> Result<PathBuf> {
        let name = name.map(str::to_string).unwrap_or_else(default_preset_name);
        let path = preset::resolve_preset_path(&self.settings.preset_dir(), &name);
        let entries = self.session()?.export_preset();
        preset::write_preset(&path, &entries)?;
        self.log_info(format!(
            "Preset saved: {} ({} mod(s))",
            path.display(),
            entries.len()
        ));
        Ok(path)
    }

    /// Reconciles the live order against a preset file. Missing references are
    /// logged and returned; they never fail the load.
    pub fn load_preset(&mut self, name: &str) -> Result<Vec<MissingRef>> {
        let path = preset::resolve_preset_path(&self.settings.preset_dir(), name);
        let entries = preset::read_preset(&path)?;
        let missing = self.session_mut()?.apply_preset(&entries);
        self.log_info(format!("Preset loaded: {}", path.display()));
        if !missing.is_empty() {
            let preview: Vec<String> = missing
                .iter()
                .take(MISSING_PREVIEW)
                .map(MissingRef::to_string)
                .collect();
            self.log_warn(format!(
                "Preset references {} mod(s) not installed: {}",
                missing.len(),
                preview.join(", ")
            ));
        }
        Ok(missing)
    }

    pub fn list_presets(&self) -> Result<Vec<PathBuf>> {
        preset::list_presets(&self.settings.preset_dir())
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    pub fn log_tail_text(&self, lines: usize) -> Result<String> {
        if lines == 0 {
            return Ok(String::new());
        }
        let raw = self.log_text()?;
        let mut entries: Vec<&str> = raw.lines().collect();
        if entries.len() > lines {
            entries = entries[entries.len() - lines..].to_vec();
        }
        Ok(entries.join("\n"))
    }

    fn log_text(&self) -> Result<String> {
        if self.log_path.exists() {
            return fs::read_to_string(&self.log_path).context("read log file");
        }
        Ok(self
            .logs
            .iter()
            .map(|entry| format!("[{}] {}", log_level_label(entry.level), entry.message))
            .collect::<Vec<String>>()
            .join("\n"))
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        self.logs.push(LogEntry {
            level,
            message: message.clone(),
        });
        if self.logs.len() > LOG_CAPACITY {
            let overflow = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(0..overflow);
        }

        let _ = append_log_file(&self.log_path, level, &message);
    }
}

fn default_preset_name() -> String {
    let format = time::macros::format_description!("[year][month][day]-[hour][minute][second]");
    let stamp = OffsetDateTime::now_utc()
        .format(&format)
        .unwrap_or_else(|_| "latest".to_string());
    format!("preset-{stamp}")
}

fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        app: App,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("Config.ini");
        let mods = temp.path().join("mods");
        fs::create_dir_all(&mods).unwrap();
        fs::write(
            &config,
            "[LoadOrder]\nMod1Directory=A,True\nMod2Directory=B,False\nNumberOfModFiles=2\n",
        )
        .unwrap();

        let mut settings =
            AppSettings::load_or_create_at(&temp.path().join("data").join("settings.json"))
                .unwrap();
        settings.config_path = config.display().to_string();
        settings.mod_root_path = mods.display().to_string();
        Fixture {
            app: App::with_settings(settings),
            temp,
        }
    }

    #[test]
    fn open_session_logs_to_file() {
        let mut fx = fixture();
        fx.app.open_session(&PathOverrides::default()).unwrap();
        assert_eq!(fx.app.session().unwrap().registry().len(), 2);

        let tail = fx.app.log_tail_text(5).unwrap();
        assert!(tail.contains("[INFO] Loaded 2 mod(s)"));
        assert!(fx.temp.path().join("data").join("modorder.log").exists());
    }

    #[test]
    fn bad_override_is_logged_and_returned() {
        let mut fx = fixture();
        let overrides = PathOverrides {
            config_path: Some(fx.temp.path().join("absent.ini")),
            mod_root: None,
        };
        assert!(fx.app.open_session(&overrides).is_err());
        assert!(fx.app.session().is_err());
        assert_eq!(fx.app.logs.last().unwrap().level, LogLevel::Error);
    }

    #[test]
    fn preset_save_then_load_reports_missing() {
        let mut fx = fixture();
        fx.app.open_session(&PathOverrides::default()).unwrap();
        let path = fx.app.save_preset(Some("daily")).unwrap();
        assert_eq!(path, fx.temp.path().join("data").join("presets").join("daily.json"));
        assert_eq!(fx.app.list_presets().unwrap(), vec![path.clone()]);

        fs::write(
            fx.temp.path().join("other.json"),
            r#"[{"id": "B", "n": "Bee", "e": true}, {"id": "Z", "n": "Zed", "e": true}]"#,
        )
        .unwrap();
        let other = fx.temp.path().join("other.json");
        let missing = fx.app.load_preset(other.to_str().unwrap()).unwrap();
        assert_eq!(missing.len(), 1);
        assert_eq!(fx.app.logs.last().unwrap().level, LogLevel::Warn);

        let ids: Vec<&str> = fx
            .app
            .session()
            .unwrap()
            .registry()
            .iter()
            .map(|record| record.id())
            .collect();
        assert_eq!(ids, vec!["B", "A"]);
    }

    #[test]
    fn save_config_writes_backup() {
        let mut fx = fixture();
        fx.app.open_session(&PathOverrides::default()).unwrap();
        fx.app.session_mut().unwrap().registry_mut().toggle(1).unwrap();
        let outcome = fx.app.save_config(|_| false).unwrap();
        assert!(matches!(outcome, SaveOutcome::Saved { .. }));
        let written = fs::read_to_string(fx.temp.path().join("Config.ini")).unwrap();
        assert!(written.contains("Mod2Directory=B,True"));
        assert!(fx.temp.path().join("Config.ini.bak").exists());
    }

    #[test]
    fn log_ring_is_bounded() {
        let mut fx = fixture();
        for index in 0..(LOG_CAPACITY + 5) {
            fx.app.log_info(format!("entry {index}"));
        }
        assert_eq!(fx.app.logs.len(), LOG_CAPACITY);
        assert_eq!(fx.app.logs[0].message, "entry 5");
    }

    #[test]
    fn default_preset_names_are_stamped() {
        assert!(default_preset_name().starts_with("preset-"));
    }
}

use crate::error::CoreError;
use anyhow::{Context, Result};
use filetime::FileTime;
use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

pub const BACKUP_SUFFIX: &str = ".bak";

#[derive(Debug)]
pub enum BackupStatus {
    Created(PathBuf),
    /// The copy failed and the caller chose to write anyway.
    Skipped(CoreError),
}

#[derive(Debug)]
pub enum SaveOutcome {
    Saved { backup: BackupStatus },
    Aborted { reason: CoreError },
    /// The load order was empty, so the file was left alone.
    NothingToSave,
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Copies `path` next to itself with the backup suffix, overwriting an older
/// backup. Timestamps are carried over.
pub fn create_backup(path: &Path) -> Result<PathBuf, CoreError> {
    let target = backup_path(path);
    fs::copy(path, &target).map_err(|source| CoreError::BackupFailure {
        path: path.to_path_buf(),
        source,
    })?;
    if let Ok(meta) = fs::metadata(path) {
        let _ = filetime::set_file_times(
            &target,
            FileTime::from_last_access_time(&meta),
            FileTime::from_last_modification_time(&meta),
        );
    }
    Ok(target)
}

/// Backs up `path` and replaces it with `contents`. When the backup fails,
/// `confirm_without_backup` decides whether the write goes ahead.
pub fn persist<F>(path: &Path, contents: &str, confirm_without_backup: F) -> Result<SaveOutcome>
where
    F: FnOnce(&CoreError) -> bool,
{
    let backup = match create_backup(path) {
        Ok(target) => BackupStatus::Created(target),
        Err(err) => {
            if !confirm_without_backup(&err) {
                return Ok(SaveOutcome::Aborted { reason: err });
            }
            BackupStatus::Skipped(err)
        }
    };

    write_atomic_text(path, contents)?;
    Ok(SaveOutcome::Saved { backup })
}

pub fn write_atomic_text(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path.file_name().context("config filename")?;
    let mut temp_name = OsString::from(file_name);
    temp_name.push(".tmp");
    let mut temp_path = parent.join(temp_name);
    if temp_path.exists() {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut temp_name = OsString::from(file_name);
        temp_name.push(format!(".{stamp}.tmp"));
        temp_path = parent.join(temp_name);
    }
    fs::write(&temp_path, contents).context("write config temp")?;
    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err).context("finalize config write");
    }
    Ok(())
}

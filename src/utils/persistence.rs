//! File helpers shared by the JSON store and the config manager.

use std::{
    cmp::Reverse,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant, SystemTime},
};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::core::{
    errors::{ObligationError, Result},
    utils::ensure_dir,
};

pub const BACKUP_EXTENSION: &str = "json";
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = "tmp";
const LOCK_POLL: Duration = Duration::from_millis(2);
/// Lock files older than this are assumed to belong to a crashed writer.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(30);

/// Writes `data` to a sibling temp file and renames it over `path`.
pub fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let tmp = tmp_path(path);
    {
        let mut file = File::create(&tmp)?;
        file.write_all(data.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

pub fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{}.{}", existing, TMP_SUFFIX),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

/// Exclusive lock over a file shared by several handles or processes.
///
/// Held as a `create_new` marker file next to the guarded path and removed on drop.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Waits up to `timeout` for the lock on `path`.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = lock_path(path);
        if let Some(parent) = lock_path.parent() {
            ensure_dir(parent)?;
        }
        let started = Instant::now();
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
            {
                Ok(mut file) => {
                    let _ = write!(file, "{}", std::process::id());
                    return Ok(Self { path: lock_path });
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    evict_stale_lock(&lock_path);
                    if started.elapsed() > timeout {
                        return Err(ObligationError::StorageError(format!(
                            "timed out waiting for lock {}",
                            lock_path.display()
                        )));
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// `{path}.lock`, next to the guarded file.
pub fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn evict_stale_lock(lock_path: &Path) {
    let age = fs::metadata(lock_path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok());
    if matches!(age, Some(age) if age > STALE_LOCK_AGE) {
        warn!(lock = %lock_path.display(), "removing stale lock file");
        let _ = fs::remove_file(lock_path);
    }
}

/// Builds `{prefix}_{timestamp}[_{note}].json`.
pub fn backup_file_name(prefix: &str, at: DateTime<Utc>, note: Option<&str>) -> String {
    let mut name = format!("{}_{}", prefix, at.format(BACKUP_TIMESTAMP_FORMAT));
    if let Some(label) = sanitize_note(note) {
        name.push('_');
        name.push_str(&label);
    }
    name.push('.');
    name.push_str(BACKUP_EXTENSION);
    name
}

/// Lists backup file names in `dir`, newest first.
pub fn list_backup_files(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            entries.push(name.to_string());
        }
    }
    entries.sort_by(|a, b| {
        Reverse(parse_backup_timestamp(a))
            .cmp(&Reverse(parse_backup_timestamp(b)))
            .then_with(|| b.cmp(a))
    });
    Ok(entries)
}

/// Deletes all but the `retention` newest backups in `dir`.
pub fn prune_backups(dir: &Path, retention: usize) -> Result<usize> {
    let backups = list_backup_files(dir)?;
    let mut removed = 0;
    for name in backups.iter().skip(retention.max(1)) {
        if fs::remove_file(dir.join(name)).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

pub fn sanitize_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    if raw.is_empty() {
        return None;
    }
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || matches!(ch, '-' | '.' | '_'))
            && !sanitized.is_empty()
            && !last_dash
        {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-').to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Reads the `YYYYMMDD_HHMMSS` stamp that follows the prefix segment.
pub fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let trimmed = name.strip_suffix(&format!(".{}", BACKUP_EXTENSION))?;
    let segments: Vec<&str> = trimmed.split('_').collect();
    let position = segments
        .windows(2)
        .position(|pair| is_digits(pair[0], 8) && is_digits(pair[1], 6))?;
    let raw = format!("{}{}", segments[position], segments[position + 1]);
    NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn note_is_slugged() {
        assert_eq!(
            sanitize_note(Some("  Before CAS fix. ")),
            Some("before-cas-fix".into())
        );
        assert_eq!(sanitize_note(Some("!!!")), None);
    }

    #[test]
    fn backup_name_round_trips_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 33).unwrap();
        let name = backup_file_name("household", at, Some("monthly close"));
        assert_eq!(name, "household_20240309_140533_monthly-close.json");
        assert_eq!(parse_backup_timestamp(&name), Some(at));
    }

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("store.json");
        write_atomic(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn prune_keeps_newest() {
        let temp = TempDir::new().unwrap();
        for minute in 0..4 {
            let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, minute, 0).unwrap();
            fs::write(temp.path().join(backup_file_name("s", at, None)), "{}").unwrap();
        }
        assert_eq!(prune_backups(temp.path(), 2).unwrap(), 2);
        let left = list_backup_files(temp.path()).unwrap();
        assert_eq!(left, vec!["s_20240101_100300.json", "s_20240101_100200.json"]);
    }

    #[test]
    fn file_lock_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let guarded = temp.path().join("store.json");
        let held = FileLock::acquire(&guarded, Duration::from_millis(50)).unwrap();
        assert!(held.path().ends_with("store.json.lock"));

        let err = FileLock::acquire(&guarded, Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, ObligationError::StorageError(ref msg) if msg.contains("timed out")));

        drop(held);
        assert!(!lock_path(&guarded).exists());
        assert!(FileLock::acquire(&guarded, Duration::from_millis(20)).is_ok());
    }
}

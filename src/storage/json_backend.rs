use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    core::{
        errors::{ObligationError, Result},
        utils::{ensure_dir, PathResolver},
    },
    ledger::RecurringObligation,
    utils::persistence::{
        backup_file_name, list_backup_files, prune_backups, write_atomic, FileLock,
    },
};

use super::{check_expected, sort_for_listing, ObligationRepository};

const DEFAULT_RETENTION: usize = 5;
const DEFAULT_STORE_NAME: &str = "obligations";
const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

pub const STORE_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default = "StoreDocument::schema_version")]
    schema_version: u32,
    #[serde(default)]
    obligations: Vec<RecurringObligation>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            schema_version: STORE_SCHEMA_VERSION,
            obligations: Vec::new(),
        }
    }
}

impl StoreDocument {
    fn schema_version() -> u32 {
        STORE_SCHEMA_VERSION
    }
}

/// Repository that keeps every obligation in one JSON document.
///
/// Each write replaces the file atomically after copying the previous version into the
/// backup directory. Read-modify-write cycles hold the handle's mutex plus a `.lock` file
/// beside the document, so separate handles and processes serialize their CAS checks.
pub struct JsonObligationStore {
    path: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
    guard: Mutex<()>,
}

impl JsonObligationStore {
    pub fn new(root: Option<PathBuf>, retention: Option<usize>) -> Result<Self> {
        Self::named(root, DEFAULT_STORE_NAME, retention)
    }

    /// Opens (or prepares) the store called `name` under `root`.
    pub fn named(root: Option<PathBuf>, name: &str, retention: Option<usize>) -> Result<Self> {
        let base = PathResolver::resolve_base(root);
        let store_dir = PathResolver::store_dir_in(&base);
        ensure_dir(&store_dir)?;
        let canonical = canonical_name(name);
        let backups_dir = PathResolver::backup_dir_in(&base).join(&canonical);
        ensure_dir(&backups_dir)?;
        Ok(Self {
            path: store_dir.join(format!("{canonical}.json")),
            backups_dir,
            retention: retention.unwrap_or(DEFAULT_RETENTION).max(1),
            guard: Mutex::new(()),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.data_dir.clone(), Some(config.backup_retention))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Snapshots the current document with an optional note and returns the file name.
    pub fn backup(&self, note: Option<&str>) -> Result<String> {
        let _lock = self.lock_for_write()?;
        let document = self.read_document()?;
        let name = backup_file_name(&self.prefix(), Utc::now(), note);
        let json = serde_json::to_string_pretty(&document)?;
        write_atomic(&self.backups_dir.join(&name), &json)?;
        prune_backups(&self.backups_dir, self.retention)?;
        Ok(name)
    }

    pub fn list_backups(&self) -> Result<Vec<String>> {
        list_backup_files(&self.backups_dir)
    }

    /// Replaces the live document with a backup. The backup must parse as a valid store.
    pub fn restore(&self, backup_name: &str) -> Result<usize> {
        let _lock = self.lock_for_write()?;
        let backup_path = self.backups_dir.join(backup_name);
        if !backup_path.exists() {
            return Err(ObligationError::StorageError(format!(
                "backup `{}` not found",
                backup_name
            )));
        }
        let data = fs::read_to_string(&backup_path)?;
        let document: StoreDocument = serde_json::from_str(&data)?;
        let count = document.obligations.len();
        write_atomic(&self.path, &data)?;
        debug!(backup = backup_name, count, "restored obligation store");
        Ok(count)
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|_| ObligationError::StorageError("store lock poisoned".into()))
    }

    /// Takes the lock file first so a waiting writer never blocks readers of this handle.
    fn lock_for_write(&self) -> Result<WriteGuard<'_>> {
        let file = FileLock::acquire(&self.path, LOCK_TIMEOUT)?;
        let local = self.lock()?;
        Ok(WriteGuard {
            _local: local,
            _file: file,
        })
    }

    fn prefix(&self) -> String {
        self.path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(DEFAULT_STORE_NAME)
            .to_string()
    }

    fn read_document(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let document: StoreDocument = serde_json::from_str(&data)?;
        if document.schema_version > STORE_SCHEMA_VERSION {
            return Err(ObligationError::StorageError(format!(
                "store `{}` was written by a newer schema version ({})",
                self.path.display(),
                document.schema_version
            )));
        }
        Ok(document)
    }

    fn write_document(&self, document: &StoreDocument) -> Result<()> {
        self.backup_existing_file()?;
        let json = serde_json::to_string_pretty(document)?;
        write_atomic(&self.path, &json)
    }

    fn backup_existing_file(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let name = backup_file_name(&self.prefix(), Utc::now(), None);
        fs::copy(&self.path, self.backups_dir.join(name))?;
        let pruned = prune_backups(&self.backups_dir, self.retention)?;
        if pruned > 0 {
            debug!(pruned, "pruned old store backups");
        }
        Ok(())
    }
}

/// Fields drop in order: the handle's mutex, then the lock file.
struct WriteGuard<'a> {
    _local: MutexGuard<'a, ()>,
    _file: FileLock,
}

impl ObligationRepository for JsonObligationStore {
    fn list_by_owner(&self, owner_id: Uuid) -> Result<Vec<RecurringObligation>> {
        let _lock = self.lock()?;
        let mut owned: Vec<_> = self
            .read_document()?
            .obligations
            .into_iter()
            .filter(|obligation| obligation.owner_id == owner_id)
            .collect();
        sort_for_listing(&mut owned);
        Ok(owned)
    }

    fn get(&self, id: Uuid) -> Result<Option<RecurringObligation>> {
        let _lock = self.lock()?;
        Ok(self
            .read_document()?
            .obligations
            .into_iter()
            .find(|obligation| obligation.id == id))
    }

    fn insert(&self, obligation: &RecurringObligation) -> Result<()> {
        let _lock = self.lock_for_write()?;
        let mut document = self.read_document()?;
        if document.obligations.iter().any(|item| item.id == obligation.id) {
            return Err(ObligationError::Validation(format!(
                "obligation {} already exists",
                obligation.id
            )));
        }
        document.obligations.push(obligation.clone());
        self.write_document(&document)
    }

    fn persist(
        &self,
        obligation: &RecurringObligation,
        expected_next_trigger: NaiveDate,
    ) -> Result<()> {
        let _lock = self.lock_for_write()?;
        let mut document = self.read_document()?;
        let slot = document
            .obligations
            .iter_mut()
            .find(|item| item.id == obligation.id)
            .ok_or(ObligationError::NotFound(obligation.id))?;
        if let Err(err) = check_expected(slot, expected_next_trigger) {
            warn!(obligation = %obligation.id, "stale write rejected by store");
            return Err(err);
        }
        *slot = obligation.clone();
        self.write_document(&document)
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let _lock = self.lock_for_write()?;
        let mut document = self.read_document()?;
        let before = document.obligations.len();
        document.obligations.retain(|item| item.id != id);
        if document.obligations.len() == before {
            return Ok(false);
        }
        self.write_document(&document)?;
        Ok(true)
    }
}

fn canonical_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' => c,
            _ => '_',
        })
        .collect();
    if sanitized.trim_matches('_').is_empty() {
        DEFAULT_STORE_NAME.into()
    } else {
        sanitized
    }
}

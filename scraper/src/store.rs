use std::{
    collections::{hash_map::Entry, HashMap},
    fs::{self, File, OpenOptions},
    hash::Hash,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, SecondsFormat, Utc};
use fs2::FileExt;
use serde::{de::DeserializeOwned, Serialize};
use shared::{ActivityRecord, ProcessData};
use tracing::{debug, info, instrument, warn};

use crate::error::PersistError;

pub const ACTIVITY_FILE: &str = "github_activity.json";
pub const LOCK_FILE: &str = ".scraper.lock";

/// Exclusive advisory lock on a data directory, released on drop.
#[derive(Debug)]
pub struct DataDirLock {
    file: File,
    path: PathBuf,
}

impl DataDirLock {
    /// Creates the directory if needed and blocks until no other run holds it.
    pub async fn acquire(data_dir: &Path) -> Result<Self, PersistError> {
        fs::create_dir_all(data_dir).map_err(|source| PersistError::CreateDir {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let path = data_dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| PersistError::Lock {
                path: path.clone(),
                source,
            })?;

        let file = tokio::task::spawn_blocking(move || file.lock_exclusive().map(|_| file))
            .await
            .map_err(|e| PersistError::Lock {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?
            .map_err(|source| PersistError::Lock {
                path: path.clone(),
                source,
            })?;

        debug!("Acquired lock {}", path.display());
        Ok(Self { file, path })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock {}: {e}", self.path.display());
        }
    }
}

/// A missing file reads as the default value.
pub fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T, PersistError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(PersistError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|source| PersistError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes next to `path` and renames over it, so readers never see a half written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let body = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = File::create(&tmp)
        .and_then(|mut file| {
            file.write_all(&body)?;
            file.sync_all()
        })
        .map_err(|source| PersistError::Write {
            path: tmp.clone(),
            source,
        })
        .and_then(|()| {
            fs::rename(&tmp, path).map_err(|source| PersistError::Write {
                path: path.to_path_buf(),
                source,
            })
        });

    if written.is_err() {
        if let Err(e) = fs::remove_file(&tmp) {
            debug!("Failed to remove {}: {e}", tmp.display());
        }
    }
    written
}

fn merge_by_key<K, F>(stored: &mut Vec<ActivityRecord>, fresh: Vec<ActivityRecord>, key: F)
where
    K: Hash + Eq,
    F: Fn(&ActivityRecord) -> K,
{
    let mut positions: HashMap<K, usize> = HashMap::new();
    let mut merged: Vec<ActivityRecord> = Vec::with_capacity(stored.len() + fresh.len());

    for record in stored.drain(..).chain(fresh) {
        match positions.entry(key(&record)) {
            // Fresh data wins but keeps the position of what was stored
            Entry::Occupied(entry) => merged[*entry.get()] = record,
            Entry::Vacant(entry) => {
                entry.insert(merged.len());
                merged.push(record);
            }
        }
    }

    *stored = merged;
}

/// Reconciles a fresh run with the persisted state.
///
/// Authored items and activity are unioned by their natural keys, open pull
/// requests are replaced by the fresh snapshot and every user touched by the
/// run gets `now` as `last_updated`. Users absent from `fresh` stay as they were.
pub fn merge_process_data(
    mut existing: ProcessData,
    fresh: ProcessData,
    now: DateTime<Utc>,
) -> ProcessData {
    let last_updated = now.to_rfc3339_opts(SecondsFormat::Secs, true);

    for (user, aggregate) in fresh {
        let stored = existing.entry(user).or_default();
        merge_by_key(
            &mut stored.authored_issue_and_pr,
            aggregate.authored_issue_and_pr,
            ActivityRecord::authored_key,
        );
        merge_by_key(
            &mut stored.activity,
            aggregate.activity,
            ActivityRecord::activity_key,
        );
        stored.activity.sort_by_key(|record| record.timestamp);
        stored.open_prs = aggregate.open_prs;
        stored.last_updated = last_updated.clone();
    }

    existing
}

/// Load, merge and write back the activity file of `data_dir` under the directory lock.
#[instrument(skip(fresh), fields(users = fresh.len()))]
pub async fn merged_data(
    data_dir: &Path,
    fresh: ProcessData,
    now: DateTime<Utc>,
) -> Result<ProcessData, PersistError> {
    let _lock = DataDirLock::acquire(data_dir).await?;
    let path = data_dir.join(ACTIVITY_FILE);

    let existing: ProcessData = read_json_or_default(&path)?;
    let previous_users = existing.len();
    let merged = merge_process_data(existing, fresh, now);
    write_json_atomic(&path, &merged)?;

    info!(
        "Saved {} users to {} ({} new)",
        merged.len(),
        path.display(),
        merged.len() - previous_users
    );
    Ok(merged)
}

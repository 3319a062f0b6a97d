//! Filesystem storage for the token pair.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use quire_core::error::{Error, StorageError};
use quire_core::{Result, TokenPair, TokenStore};
use quire_core::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

fn map_io(path: &Path, err: std::io::Error) -> Error {
    Error::Storage(StorageError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// On-disk layout of the token file.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredTokens {
    #[serde(default)]
    values: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// A [`TokenStore`] backed by a single JSON file.
///
/// Writes go to a temporary sibling file that is renamed over the target, so
/// a crash never leaves a half-written token file. Concurrent processes are
/// serialized through an exclusive lock on `<file>.lock`. On Unix the file is
/// created with mode `0600`.
///
/// Every call blocks the calling thread while it waits for that lock, and
/// writes also wait for the data to reach disk. If another process holds
/// the lock, an async session using this store stalls its runtime worker
/// until the lock is released (see the blocking notes on [`TokenStore`]).
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Create a store at the given file path. Nothing is touched on disk
    /// until the first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the token file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns when the file was last written, if it records it.
    pub fn updated_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.read()?.updated_at)
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    fn lock(&self, exclusive: bool) -> Result<File> {
        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| map_io(parent, e))?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| map_io(&lock_path, e))?;

        if exclusive {
            FileExt::lock_exclusive(&lock_file)
        } else {
            FileExt::lock_shared(&lock_file)
        }
        .map_err(|e| map_io(&lock_path, e))?;

        Ok(lock_file)
    }

    fn read_unlocked(&self) -> Result<StoredTokens> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoredTokens::default()),
            Err(e) => return Err(map_io(&self.path, e)),
        };

        if json.trim().is_empty() {
            return Ok(StoredTokens::default());
        }

        serde_json::from_str(&json).map_err(|e| {
            Error::Storage(StorageError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
        })
    }

    fn read(&self) -> Result<StoredTokens> {
        let lock = self.lock(false)?;
        let stored = self.read_unlocked();
        let _ = FileExt::unlock(&lock);
        stored
    }

    fn write_unlocked(&self, stored: &mut StoredTokens) -> Result<()> {
        stored.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(stored).map_err(|e| {
            Error::Storage(StorageError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })
        })?;

        let tmp_path = self
            .path
            .with_file_name(format!(".tokens-{}.tmp", Uuid::new_v4().simple()));

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)
            .map_err(|e| map_io(&tmp_path, e))?;

        #[cfg(unix)]
        {
            let mut perms = file
                .metadata()
                .map_err(|e| map_io(&tmp_path, e))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&tmp_path, perms).map_err(|e| map_io(&tmp_path, e))?;
        }

        file.write_all(json.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| map_io(&tmp_path, e))?;
        drop(file);

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            map_io(&self.path, e)
        })?;

        trace!(path = %self.path.display(), "Token file written");
        Ok(())
    }

    /// Apply `f` to the stored values under an exclusive lock and write the
    /// result back.
    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut BTreeMap<String, String>),
    {
        let lock = self.lock(true)?;
        let result = self.read_unlocked().and_then(|mut stored| {
            f(&mut stored.values);
            self.write_unlocked(&mut stored)
        });
        let _ = FileExt::unlock(&lock);
        result
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.values.remove(key))
    }

    #[instrument(skip(self, value), fields(path = %self.path.display()))]
    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self, key: &str) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        self.update(|values| {
            values.remove(key);
        })
    }

    // Both tokens go down in one write so a reader never sees a mixed pair.
    #[instrument(skip(self, pair), fields(path = %self.path.display()))]
    fn save(&self, pair: &TokenPair) -> Result<()> {
        debug!("Persisting token pair");
        self.update(|values| {
            values.insert(
                ACCESS_TOKEN_KEY.to_string(),
                pair.access_token.as_str().to_string(),
            );
            values.insert(
                REFRESH_TOKEN_KEY.to_string(),
                pair.refresh_token.as_str().to_string(),
            );
        })
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn clear(&self) -> Result<()> {
        if !self.exists() {
            return Ok(());
        }
        debug!("Clearing stored tokens");
        self.update(|values| {
            values.remove(ACCESS_TOKEN_KEY);
            values.remove(REFRESH_TOKEN_KEY);
        })
    }
}

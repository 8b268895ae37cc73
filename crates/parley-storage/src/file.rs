// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File-backed credential store.
//!
//! Values live in a flat JSON object (`{"token": "..."}`). Every write goes to
//! a sibling `.tmp` file which is then renamed over the original, so a crash
//! mid-write never leaves a truncated file behind. On Unix the `.tmp` file is
//! created owner-readable only, before any secret is written to it.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use parley_core::{CredentialStore, ParleyError};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

type Entries = BTreeMap<String, String>;

/// Credential store persisted to a JSON file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Create a store at `path`. The file and its parent directory are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<Entries, ParleyError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }
        serde_json::from_str(&raw).map_err(|e| ParleyError::Storage {
            source: Box::new(e),
        })
    }

    fn write_entries(&self, entries: &Entries) -> Result<(), ParleyError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec_pretty(entries).map_err(|e| ParleyError::Storage {
            source: Box::new(e),
        })?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = create_private(&tmp)?;
        file.write_all(&body)?;
        file.sync_all()?;
        drop(file);
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "credential file written");
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut Entries) -> bool) -> Result<(), ParleyError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.read_entries()?;
        if f(&mut entries) {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

/// Open `path` for writing, truncated and owner-only.
///
/// A leftover file from an interrupted write keeps its old mode on open, so
/// the mode is also set on the handle.
fn create_private(path: &Path) -> Result<File, ParleyError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    restrict_permissions(&file)?;
    Ok(file)
}

#[cfg(unix)]
fn restrict_permissions(file: &File) -> Result<(), ParleyError> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &File) -> Result<(), ParleyError> {
    Ok(())
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, key: &str) -> Result<Option<SecretString>, ParleyError> {
        Ok(self.read_entries()?.remove(key).map(SecretString::from))
    }

    fn save(&self, key: &str, value: &SecretString) -> Result<(), ParleyError> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.expose_secret().to_string());
            true
        })
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.modify(|entries| entries.remove(key).is_some())
    }
}

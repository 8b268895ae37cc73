// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory credential store.

use std::collections::HashMap;
use std::sync::Mutex;

use parley_core::{CredentialStore, ParleyError};
use secrecy::{ExposeSecret, SecretString};

/// Credential store that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-seeded with one value.
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.lock().insert(key.to_string(), value.to_string());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map is still a valid map.
        self.values.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, key: &str) -> Result<Option<SecretString>, ParleyError> {
        Ok(self.lock().get(key).cloned().map(SecretString::from))
    }

    fn save(&self, key: &str, value: &SecretString) -> Result<(), ParleyError> {
        self.lock()
            .insert(key.to_string(), value.expose_secret().to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ParleyError> {
        self.lock().remove(key);
        Ok(())
    }
}

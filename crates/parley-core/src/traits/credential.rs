// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential persistence and live lookup.

use secrecy::SecretString;

use crate::error::ParleyError;

/// Durable key/value storage for the bearer credential, surviving restarts.
pub trait CredentialStore: Send + Sync {
    /// Load a stored value, `None` when absent.
    fn load(&self, key: &str) -> Result<Option<SecretString>, ParleyError>;

    /// Store a value, replacing any previous one.
    fn save(&self, key: &str, value: &SecretString) -> Result<(), ParleyError>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), ParleyError>;
}

/// Live view of the current credential.
///
/// Transports call [`current`](CredentialSource::current) per use rather than
/// capturing the token once.
pub trait CredentialSource: Send + Sync {
    fn current(&self) -> Option<SecretString>;
}

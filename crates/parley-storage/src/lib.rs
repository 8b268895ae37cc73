// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable credential storage for the Parley delivery client.
//!
//! - [`FileCredentialStore`]: a small JSON map on disk, replaced atomically on write
//! - [`MemoryCredentialStore`]: process-local, for ephemeral sessions and tests

pub mod file;
pub mod memory;

pub use file::FileCredentialStore;
pub use memory::MemoryCredentialStore;

// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley delivery client.
//!
//! This crate provides the error type, message types, identifier utilities,
//! and the adapter traits at the client's I/O seams (fallback API, credential
//! storage, socket transport). Every other crate in the workspace builds on it.

pub mod error;
pub mod ids;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ParleyError;
pub use types::{Message, MessageStatus, SendReceipt, Sender};

// Re-export all adapter traits at crate root.
pub use traits::{ChatApi, Connector, CredentialSource, CredentialStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parley_error_variants_render() {
        let cases = [
            ParleyError::Config("bad".into()),
            ParleyError::transport("reset"),
            ParleyError::Api {
                message: "boom".into(),
                status: Some(500),
                source: None,
            },
            ParleyError::Unauthorized {
                message: "expired".into(),
            },
            ParleyError::Storage {
                source: Box::new(std::io::Error::other("disk")),
            },
            ParleyError::Protocol("frame".into()),
            ParleyError::ChannelClosed,
            ParleyError::Timeout {
                duration: std::time::Duration::from_secs(10),
            },
            ParleyError::Internal("oops".into()),
        ];
        for err in &cases {
            assert!(!err.to_string().is_empty());
        }
        assert!(cases[3].is_unauthorized());
        assert!(!cases[2].is_unauthorized());
    }

    #[test]
    fn status_parses_from_wire_names() {
        use std::str::FromStr;

        for (name, status) in [
            ("sent", MessageStatus::Sent),
            ("acknowledged", MessageStatus::Acknowledged),
            ("received", MessageStatus::Received),
            ("failed", MessageStatus::Failed),
        ] {
            assert_eq!(MessageStatus::from_str(name).unwrap(), status);
            assert_eq!(status.to_string(), name);
        }
        assert!(MessageStatus::from_str("delivered").is_err());
    }

    #[test]
    fn all_traits_are_object_safe() {
        fn _api(_: &dyn ChatApi) {}
        fn _connector(_: &dyn Connector) {}
        fn _store(_: &dyn CredentialStore) {}
        fn _source(_: &dyn CredentialSource) {}
    }
}

//! Encrypted persistence for Rewind.
//! AES-GCM with a single installation key kept in an owner-only key file;
//! version snapshots live in a local directory or a remote bucket.

mod atomic;
pub mod backend;
pub mod credentials;
pub mod key_manager;
pub mod ledger;
pub mod vault;
pub mod version_store;

pub use ledger::{Ledger, StorePaths};

//! Core abstractions for Rewind: the error taxonomy, the version/credential
//! data model, resource normalization, and the storage contracts that the
//! local and remote backends implement.
//! This crate is intentionally free of I/O so it can be shared by every layer.

pub mod error;
pub mod model;
pub mod normalize;
pub mod storage;

pub use error::{ProviderError, StoreError};

//! Local directory and remote bucket implementations of [`Backend`].
//!
//! [`Backend`]: rewind_core::storage::Backend

pub mod local;
pub mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

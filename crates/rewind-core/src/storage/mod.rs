//! Storage contracts shared by the local and remote backends.

pub mod backend;
pub mod object_store;

pub use backend::{parse_record_name, record_name, Backend, RECORD_EXTENSION};
pub use object_store::{InMemoryObjectStore, ObjectInfo, ObjectStore};

//! Cloud provider clients for Rewind.
//! Currently an S3-compatible object store signed with AWS SigV4.

pub mod presign;
pub mod s3;

pub use s3::{S3ObjectStore, S3Settings};

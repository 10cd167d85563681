//! CLI command implementations.

pub mod checksum;
pub mod get;
pub mod upload;
pub mod validate;

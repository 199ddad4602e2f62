//! Shared foundational types used across the Trellis web framework crates.
//!
//! This crate provides the build identifier that binds cached artifacts to
//! the compiled units they were produced from.

#![warn(missing_docs)]

pub mod build_id;

pub use build_id::{BuildId, ParseBuildIdError};

//! Core types and trait definitions for the attrix attribution store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod dao;
pub mod deletion;
pub mod error;
pub mod registration;
pub mod report;
pub mod rollback;
pub mod source;
pub mod trigger;

pub use error::{DatastoreError, Result};

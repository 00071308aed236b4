//! bear-sync - Bidirectional sync between Bear and a Markdown folder
//!
//! This crate provides the core functionality for the `bearsync` CLI tool.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Note type and database timestamp conversion
//! - [`storage`] - Read-only SQLite snapshot reader
//! - [`tags`] - Tag grammar, folder placement and tag visibility
//! - [`sync`] - Export, change detection, reconciliation and publishing
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod tags;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{Error, Result};

//! Engine-agnostic core for versioned file datasets.
//!
//! This crate provides the foundational pieces for `versioned-file-dataset`:
//!
//! - A declarative connection configuration with a precisely specified
//!   normalization algorithm, so logically equal configurations always
//!   produce identical cache keys (`config` module).
//! - A `ConnectionRegistry` that caches one live backend handle per
//!   distinct configuration for the lifetime of the registry
//!   (`connection` module).
//! - Timestamp-token versioning with separate load-path and save-path
//!   resolution over a file path template (`version` module).
//! - Local filesystem helpers for existence checks, parent-directory
//!   creation, and version listing (`storage` module).
//! - A `FileDataset` adapter tying the above together into
//!   load/save/exists/describe operations (`dataset` module).
//!
//! Query-engine integration crates (for example, DataFusion) are expected
//! to depend on this core crate and implement its `Backend` and
//! `Connector` traits rather than re-implementing the caching and
//! resolution logic.
#![deny(missing_docs)]
pub mod config;
pub mod connection;
pub mod dataset;
pub mod format;
pub mod storage;
pub mod version;

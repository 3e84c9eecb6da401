//! Storage layer for reduce-viewer
//!
//! This crate provides:
//! - SQLite database operations for instruments, experiments, users and runs
//! - Run listings with filtering, ordering and pagination
//! - Reduction arguments stored ahead of runs
//! - Migrations

mod arguments;
pub mod db;
pub mod error;
pub mod models;
mod runs;

pub use db::Storage;
pub use error::{Result, StorageError};
pub use models::{
    ArgumentsRecord, ArgumentsScope, DescriptionMatch, NewRun, RunDetail, RunFilters,
    RunLinkTarget, RunNavigation, RunOrder,
};

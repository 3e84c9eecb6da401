//! Core domain models and logic for reduce-viewer
//!
//! This crate contains:
//! - Domain models (Instrument, Experiment, ReductionRun, RunIdentity)
//! - Run-number query parsing and matching
//! - Page-window pagination
//! - Reduction argument helpers

pub mod arguments;
pub mod error;
pub mod pagination;
pub mod run;
pub mod run_query;
pub mod view_utils;

pub use arguments::{
    CombinedArgument, ReductionArguments, RenderedArguments, combine_arguments,
    convert_argument_value, merge_arguments, read_variables_from_form,
};
pub use error::{Error, Result, ValidationError};
pub use pagination::{
    Page, PageRequest, PageResult, PageSize, PaginationConfig, paginate, parse_requested_page,
};
pub use run::{Experiment, Instrument, ReductionRun, RunIdentity, RunSort, Status};
pub use run_query::{RunQuery, RunQueryKind, RunTerm, apply_run_filter, parse_run_query};
pub use view_utils::{PathType, StartedBy};

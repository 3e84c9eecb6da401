//! Reduction run domain model

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, Result};

/// A laboratory instrument runs belong to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub name: String,
    pub is_active: bool,
    pub is_paused: bool,
}

/// An experiment, identified by its RB number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    pub id: i64,
    pub reference_number: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Queued,
    Processing,
    Completed,
    Error,
    Skipped,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Queued,
        Status::Processing,
        Status::Completed,
        Status::Error,
        Status::Skipped,
    ];

    /// Single-letter code used in the database
    pub fn code(self) -> &'static str {
        match self {
            Status::Queued => "q",
            Status::Processing => "p",
            Status::Completed => "c",
            Status::Error => "e",
            Status::Skipped => "s",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.code() == code)
            .ok_or_else(|| Error::UnknownStatus(code.to_string()))
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Queued => "Queued",
            Status::Processing => "Processing",
            Status::Completed => "Completed",
            Status::Error => "Error",
            Status::Skipped => "Skipped",
        }
    }

    /// Bootstrap contextual class for a table row showing this status
    pub fn css_class(self) -> &'static str {
        match self {
            Status::Error => "danger",
            Status::Processing => "warning",
            Status::Queued => "info",
            Status::Completed => "success",
            Status::Skipped => "dark",
        }
    }

    /// Accepts either the database code or the label, case-insensitively.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        Status::ALL
            .into_iter()
            .find(|status| {
                status.code().eq_ignore_ascii_case(value)
                    || status.label().eq_ignore_ascii_case(value)
            })
            .ok_or_else(|| Error::UnknownStatus(value.to_string()))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The run number(s) a reduction run covers.
///
/// Ordinary runs reduce one run number; batch runs reduce a set of them in a
/// single job. Filtering treats both the same way through [`RunIdentity::run_numbers`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunIdentity {
    Single { run_number: u64 },
    Batch { run_numbers: BTreeSet<u64> },
}

impl RunIdentity {
    pub fn single(run_number: u64) -> Self {
        RunIdentity::Single { run_number }
    }

    pub fn batch(run_numbers: impl IntoIterator<Item = u64>) -> Self {
        RunIdentity::Batch {
            run_numbers: run_numbers.into_iter().collect(),
        }
    }

    pub fn run_numbers(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            RunIdentity::Single { run_number } => Box::new(std::iter::once(*run_number)),
            RunIdentity::Batch { run_numbers } => Box::new(run_numbers.iter().copied()),
        }
    }

    /// The run number shown for this run: itself, or the lowest of a batch.
    pub fn primary(&self) -> Option<u64> {
        self.run_numbers().next()
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, RunIdentity::Batch { .. })
    }

    /// Comma-joined run numbers, as shown on the run summary page
    pub fn joined(&self) -> String {
        self.run_numbers()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Sort orders offered on run listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunSort {
    /// Run number descending, then version ascending
    #[default]
    Run,
    /// Last update, newest first
    Date,
}

impl RunSort {
    /// Unknown values fall back to [`RunSort::Run`].
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("date") | Some("-last_updated") => RunSort::Date,
            _ => RunSort::Run,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunSort::Run => "run",
            RunSort::Date => "date",
        }
    }
}

/// One version of a reduction job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReductionRun {
    pub id: i64,
    pub instrument: String,
    pub experiment_reference: u64,
    pub identity: RunIdentity,
    pub run_version: u32,
    pub run_description: String,
    pub status: Status,
    pub hidden_in_failviewer: bool,
    pub started_by: Option<i64>,
    pub message: Option<String>,
    #[serde(with = "time::serde::timestamp")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub last_updated: OffsetDateTime,
}

impl ReductionRun {
    pub fn is_batch(&self) -> bool {
        self.identity.is_batch()
    }

    pub fn run_number(&self) -> Option<u64> {
        self.identity.primary()
    }

    /// Batch runs are addressed by primary key, ordinary runs by run number.
    pub fn unique_id(&self) -> u64 {
        match self.identity {
            RunIdentity::Single { run_number } => run_number,
            RunIdentity::Batch { .. } => self.id as u64,
        }
    }

    pub fn is_skipped(&self) -> bool {
        self.status == Status::Skipped
    }

    /// Path of this run's summary view
    pub fn link(&self) -> String {
        if self.is_batch() {
            format!(
                "/runs/{}/batch/{}/{}/",
                self.instrument, self.id, self.run_version
            )
        } else {
            format!(
                "/runs/{}/{}/{}/",
                self.instrument,
                self.unique_id(),
                self.run_version
            )
        }
    }
}

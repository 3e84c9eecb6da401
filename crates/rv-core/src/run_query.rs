//! Run-number query parsing
//!
//! Users type run numbers into search boxes and batch forms in four shapes:
//!
//! - `60200` (single run)
//! - `60200,60201` (list)
//! - `60200-60202` (inclusive range)
//! - `60190-60200,60180-60185` (list of ranges)
//!
//! [`parse_run_query`] checks the text against these shapes in that priority
//! order and turns it into a [`RunQuery`] that can be matched against run
//! numbers or handed to the storage layer as a filter.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::run::RunIdentity;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());

const MISSING_AROUND_COMMA: &str = "There must be a run number before and after the comma.";
const MISSING_AROUND_HYPHEN: &str = "There must be a run number before and after the hyphen.";
const NOT_NUMERIC: &str = "Run number must be numeric.";

/// Upper bound on the number of runs a query may expand into.
pub const MAX_EXPANDED_RUNS: usize = 10_000;

/// Which of the accepted shapes the query text had.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunQueryKind {
    Single,
    List,
    Range,
    MixedList,
}

/// One parsed component of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunTerm {
    Exact { run_number: u64 },
    /// Inclusive on both ends. `low > high` is kept as written and matches nothing.
    Between { low: u64, high: u64 },
}

impl RunTerm {
    pub fn matches(&self, run_number: u64) -> bool {
        match *self {
            RunTerm::Exact { run_number: n } => n == run_number,
            RunTerm::Between { low, high } => low <= run_number && run_number <= high,
        }
    }
}

/// A validated run-number query. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunQuery {
    pub raw_text: String,
    pub kind: RunQueryKind,
    pub terms: Vec<RunTerm>,
}

/// Parse user input into a run query.
///
/// Empty (or whitespace-only) input means "no filtering" and yields `Ok(None)`.
pub fn parse_run_query(raw: &str) -> Result<Option<RunQuery>, ValidationError> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let has_comma = text.contains(',');
    let has_hyphen = text.contains('-');

    let (kind, terms) = match (has_comma, has_hyphen) {
        (true, false) => {
            let terms = comma_pieces(text)?
                .into_iter()
                .map(|piece| parse_number(piece).map(|run_number| RunTerm::Exact { run_number }))
                .collect::<Result<Vec<_>, _>>()?;
            (RunQueryKind::List, terms)
        }
        (false, true) => (RunQueryKind::Range, vec![parse_span(text)?]),
        (true, true) => {
            let terms = comma_pieces(text)?
                .into_iter()
                .map(parse_span)
                .collect::<Result<Vec<_>, _>>()?;
            (RunQueryKind::MixedList, terms)
        }
        (false, false) => (
            RunQueryKind::Single,
            vec![RunTerm::Exact {
                run_number: parse_number(text)?,
            }],
        ),
    };

    Ok(Some(RunQuery {
        raw_text: raw.to_string(),
        kind,
        terms,
    }))
}

/// Check the syntax of a run query without keeping the result.
pub fn validate_run_query(raw: &str) -> Result<(), ValidationError> {
    parse_run_query(raw).map(|_| ())
}

fn comma_pieces(text: &str) -> Result<Vec<&str>, ValidationError> {
    let pieces: Vec<&str> = text.split(',').map(str::trim).collect();
    if pieces.iter().any(|piece| piece.is_empty()) {
        return Err(ValidationError::new(MISSING_AROUND_COMMA));
    }
    Ok(pieces)
}

fn parse_span(piece: &str) -> Result<RunTerm, ValidationError> {
    let Some((low, high)) = piece.split_once('-') else {
        return Err(ValidationError::new(MISSING_AROUND_HYPHEN));
    };
    let (low, high) = (low.trim(), high.trim());
    if low.is_empty() || high.is_empty() {
        return Err(ValidationError::new(MISSING_AROUND_HYPHEN));
    }
    Ok(RunTerm::Between {
        low: parse_number(low)?,
        high: parse_number(high)?,
    })
}

fn parse_number(piece: &str) -> Result<u64, ValidationError> {
    if !NUMBER.is_match(piece) {
        return Err(ValidationError::new(NOT_NUMERIC));
    }
    piece
        .parse::<u64>()
        .map_err(|_| ValidationError::new(NOT_NUMERIC))
}

impl RunQuery {
    /// Does this run number satisfy the query?
    pub fn matches(&self, run_number: u64) -> bool {
        self.terms.iter().any(|term| term.matches(run_number))
    }

    /// A batch identity matches when any of its run numbers does.
    pub fn matches_identity(&self, identity: &RunIdentity) -> bool {
        identity.run_numbers().any(|n| self.matches(n))
    }

    /// Keep the items whose identity satisfies the query, preserving order.
    pub fn filter<'a, T, F>(&self, items: &'a [T], identity: F) -> Vec<&'a T>
    where
        F: Fn(&T) -> &RunIdentity,
    {
        items
            .iter()
            .filter(|item| self.matches_identity(identity(item)))
            .collect()
    }

    /// Concrete run numbers named by the query, in the order written, without duplicates.
    ///
    /// Reversed ranges contribute nothing.
    pub fn expand(&self) -> Result<Vec<u64>, ValidationError> {
        let mut runs = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for term in &self.terms {
            let (low, high) = match *term {
                RunTerm::Exact { run_number } => (run_number, run_number),
                RunTerm::Between { low, high } => (low, high),
            };
            if low > high {
                continue;
            }
            if (high - low) as usize >= MAX_EXPANDED_RUNS || runs.len() >= MAX_EXPANDED_RUNS {
                return Err(ValidationError::new(format!(
                    "A query may name at most {} runs.",
                    MAX_EXPANDED_RUNS
                )));
            }
            for run_number in low..=high {
                if seen.insert(run_number) {
                    runs.push(run_number);
                }
            }
        }

        if runs.len() > MAX_EXPANDED_RUNS {
            return Err(ValidationError::new(format!(
                "A query may name at most {} runs.",
                MAX_EXPANDED_RUNS
            )));
        }
        Ok(runs)
    }
}

/// Apply an optional query to an in-memory collection.
///
/// `None` leaves the collection unfiltered.
pub fn apply_run_filter<'a, T, F>(
    items: &'a [T],
    query: Option<&RunQuery>,
    identity: F,
) -> Vec<&'a T>
where
    F: Fn(&T) -> &RunIdentity,
{
    match query {
        Some(query) => query.filter(items, identity),
        None => items.iter().collect(),
    }
}

use rv_core::{ReductionArguments, ReductionRun, RunQuery, Status};
use serde::Serialize;
use time::OffsetDateTime;

/// Everything needed to record a new reduction run
#[derive(Debug, Clone)]
pub struct NewRun {
    pub instrument: String,
    pub experiment_reference: u64,
    /// One entry for an ordinary run, several for a batch run
    pub run_numbers: Vec<u64>,
    pub batch_run: bool,
    pub run_version: u32,
    pub run_description: String,
    pub status: Status,
    pub started_by: Option<i64>,
    pub message: Option<String>,
    pub arguments: ReductionArguments,
    pub data_locations: Vec<String>,
    pub reduction_locations: Vec<String>,
    pub created: OffsetDateTime,
    pub last_updated: OffsetDateTime,
}

impl NewRun {
    pub fn new(instrument: impl Into<String>, experiment_reference: u64, run_number: u64) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            instrument: instrument.into(),
            experiment_reference,
            run_numbers: vec![run_number],
            batch_run: false,
            run_version: 0,
            run_description: String::new(),
            status: Status::Queued,
            started_by: None,
            message: None,
            arguments: ReductionArguments::default(),
            data_locations: Vec::new(),
            reduction_locations: Vec::new(),
            created: now,
            last_updated: now,
        }
    }

    pub fn batch(
        instrument: impl Into<String>,
        experiment_reference: u64,
        run_numbers: Vec<u64>,
    ) -> Self {
        Self {
            run_numbers,
            batch_run: true,
            ..Self::new(instrument, experiment_reference, 0)
        }
    }

    pub fn with_version(mut self, run_version: u32) -> Self {
        self.run_version = run_version;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.run_description = description.into();
        self
    }

    pub fn with_times(mut self, created: OffsetDateTime, last_updated: OffsetDateTime) -> Self {
        self.created = created;
        self.last_updated = last_updated;
        self
    }

    pub fn with_arguments(mut self, arguments: ReductionArguments) -> Self {
        self.arguments = arguments;
        self
    }
}

/// How a run description is compared in search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptionMatch {
    Exact(String),
    Contains(String),
}

impl DescriptionMatch {
    /// `qualifier` is `exact` or `contains`; anything else means `contains`.
    pub fn new(value: impl Into<String>, qualifier: Option<&str>) -> Self {
        match qualifier {
            Some("exact") => DescriptionMatch::Exact(value.into()),
            _ => DescriptionMatch::Contains(value.into()),
        }
    }
}

/// Conditions a run listing is restricted to. Unset fields do not filter.
#[derive(Debug, Clone, Default)]
pub struct RunFilters {
    pub instrument: Option<String>,
    pub experiment_reference: Option<u64>,
    pub batch_run: Option<bool>,
    pub run_query: Option<RunQuery>,
    pub description: Option<DescriptionMatch>,
    pub created_from: Option<OffsetDateTime>,
    pub created_to: Option<OffsetDateTime>,
    pub statuses: Vec<Status>,
    pub hidden_in_failviewer: Option<bool>,
}

impl RunFilters {
    pub fn for_instrument(instrument: impl Into<String>) -> Self {
        Self {
            instrument: Some(instrument.into()),
            ..Default::default()
        }
    }

    pub fn batch(mut self, batch_run: bool) -> Self {
        self.batch_run = Some(batch_run);
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_run_query(mut self, query: Option<RunQuery>) -> Self {
        self.run_query = query;
        self
    }
}

/// Orderings used by the listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrder {
    /// Run number descending, then version ascending
    RunNumberDesc,
    LastUpdatedDesc,
    CreatedDesc,
    CreatedAsc,
    /// Newest version first; used for run histories
    VersionDesc,
}

impl From<rv_core::RunSort> for RunOrder {
    fn from(sort: rv_core::RunSort) -> Self {
        match sort {
            rv_core::RunSort::Run => RunOrder::RunNumberDesc,
            rv_core::RunSort::Date => RunOrder::LastUpdatedDesc,
        }
    }
}

/// A run plus the data attached to it that listings do not need
#[derive(Debug, Clone, Serialize)]
pub struct RunDetail {
    #[serde(flatten)]
    pub run: ReductionRun,
    pub data_locations: Vec<String>,
    pub reduction_locations: Vec<String>,
    pub arguments: ReductionArguments,
}

/// Where a navigation control on the run summary page points
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLinkTarget {
    pub id: i64,
    pub run_number: Option<u64>,
    pub run_version: u32,
    pub link: String,
}

impl From<&ReductionRun> for RunLinkTarget {
    fn from(run: &ReductionRun) -> Self {
        Self {
            id: run.id,
            run_number: run.run_number(),
            run_version: run.run_version,
            link: run.link(),
        }
    }
}

/// Neighbours of a run in an instrument listing.
///
/// `None` means there is no such run (for example no newer run after the
/// newest one); lookup failures are reported as errors instead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunNavigation {
    pub next: Option<RunLinkTarget>,
    pub previous: Option<RunLinkTarget>,
    pub newest: Option<RunLinkTarget>,
    pub oldest: Option<RunLinkTarget>,
}

/// Which runs a set of stored arguments applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ArgumentsScope {
    /// Every run from `start_run` until the next by-run record takes over
    FromRun { start_run: u64 },
    /// Every run of one experiment, whatever its run number
    Experiment { reference_number: u64 },
}

/// Reduction arguments stored for an instrument ahead of its runs
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArgumentsRecord {
    pub id: i64,
    pub instrument: String,
    pub scope: ArgumentsScope,
    pub arguments: ReductionArguments,
}

impl ArgumentsRecord {
    pub fn start_run(&self) -> Option<u64> {
        match self.scope {
            ArgumentsScope::FromRun { start_run } => Some(start_run),
            ArgumentsScope::Experiment { .. } => None,
        }
    }

    pub fn experiment_reference(&self) -> Option<u64> {
        match self.scope {
            ArgumentsScope::FromRun { .. } => None,
            ArgumentsScope::Experiment { reference_number } => Some(reference_number),
        }
    }
}

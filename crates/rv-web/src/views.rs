//! Page contexts
//!
//! Each view gathers everything one page of the viewer shows into a
//! serialisable context. The HTTP layer hands these out as JSON.

use rv_core::view_utils::data_analysis_url;
use rv_core::{
    Experiment, Instrument, Page, PageRequest, PageSize, PathType, ReductionRun,
    RenderedArguments, RunSort, StartedBy, Status, merge_arguments, parse_run_query,
    read_variables_from_form,
};
use rv_storage::{DescriptionMatch, RunFilters, RunNavigation, RunOrder, Storage};
use serde::{Deserialize, Serialize};
use time::macros::{format_description, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::{info, warn};

use crate::defaults::{defaults_for_display, load_default_arguments, InstrumentActivity};
use crate::error::{Result, WebError};
use crate::server::AppState;
use crate::submission::BatchSubmission;

const NO_RUNS_MESSAGE: &str = "No runs found for instrument.";
const EMPTY_RUNS_MESSAGE: &str = "Run field was invalid or empty";
const END_OF_DAY: Time = time!(23:59:59);

/// Which grouping the instrument run list shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunListFilter {
    #[default]
    Run,
    Experiment,
    BatchRuns,
}

impl RunListFilter {
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("experiment") => RunListFilter::Experiment,
            Some("batch_runs") => RunListFilter::BatchRuns,
            _ => RunListFilter::Run,
        }
    }
}

/// A run as shown in a table row
#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    #[serde(flatten)]
    pub run: ReductionRun,
    pub run_numbers: String,
    pub link: String,
    pub css_class: &'static str,
}

impl From<ReductionRun> for RunRow {
    fn from(run: ReductionRun) -> Self {
        Self {
            run_numbers: run.identity.joined(),
            link: run.link(),
            css_class: run.status.css_class(),
            run,
        }
    }
}

/// Query parameters shared by paginated pages
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<String>,
    #[serde(alias = "pagination")]
    pub per_page: Option<String>,
}

impl PageParams {
    fn request(&self, state: &AppState) -> PageRequest {
        PageRequest::from_query(
            self.page.as_deref(),
            self.per_page.as_deref(),
            &state.pagination(),
        )
    }
}

// ============================================================================
// Instrument run list
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
    pub sort: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentRuns {
    pub reference_number: u64,
    pub runs: Vec<RunRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunsListContext {
    pub instrument: Instrument,
    pub filtering: RunListFilter,
    pub sort: RunSort,
    pub processing: usize,
    pub queued: usize,
    pub first_instrument_run: Option<ReductionRun>,
    pub last_instrument_run: Option<ReductionRun>,
    pub has_variables: bool,
    pub error_reason: String,
    pub runs: Option<Page<RunRow>>,
    pub experiments: Option<Vec<ExperimentRuns>>,
    pub message: Option<String>,
}

pub async fn runs_list(
    state: &AppState,
    instrument: &str,
    params: &ListParams,
) -> Result<RunsListContext> {
    let storage = &state.storage;
    let instrument = storage.get_instrument(instrument).await?;
    let name = instrument.name.clone();

    let filtering = RunListFilter::parse_lenient(params.filter.as_deref());
    let sort = RunSort::parse_lenient(params.sort.as_deref());
    let request = params.page.request(state);

    let processing = storage.count_runs_with_status(&name, Status::Processing).await?;
    let queued = storage.count_runs_with_status(&name, Status::Queued).await?;
    let (first_instrument_run, last_instrument_run) = storage.first_and_last_run(&name).await?;
    let (defaults, error_reason) = defaults_for_display(state.scripts_root(), &name);

    let message = first_instrument_run
        .is_none()
        .then(|| NO_RUNS_MESSAGE.to_string());

    let ordinary = RunFilters::for_instrument(&name).batch(false);
    let (runs, experiments) = match filtering {
        RunListFilter::Run => {
            let page = storage.list_runs(&ordinary, sort.into(), &request).await?;
            (Some(page.map(RunRow::from)), None)
        }
        RunListFilter::BatchRuns => {
            let batches = RunFilters::for_instrument(&name).batch(true);
            let page = storage.list_runs(&batches, sort.into(), &request).await?;
            (Some(page.map(RunRow::from)), None)
        }
        RunListFilter::Experiment => {
            let mut groups = Vec::new();
            for experiment in storage.experiments_with_runs(&name).await? {
                let filters = RunFilters {
                    experiment_reference: Some(experiment.reference_number),
                    ..ordinary.clone()
                };
                let runs = storage.runs(&filters, RunOrder::CreatedDesc).await?;
                if !runs.is_empty() {
                    groups.push(ExperimentRuns {
                        reference_number: experiment.reference_number,
                        runs: runs.into_iter().map(RunRow::from).collect(),
                    });
                }
            }
            (None, Some(groups))
        }
    };

    Ok(RunsListContext {
        instrument,
        filtering,
        sort,
        processing,
        queued,
        first_instrument_run,
        last_instrument_run,
        has_variables: !defaults.is_empty(),
        error_reason,
        runs,
        experiments,
        message,
    })
}

// ============================================================================
// Run summary
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryParams {
    pub path_type: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummaryContext {
    pub run: ReductionRun,
    pub runs: String,
    pub run_unique_id: u64,
    pub run_version: u32,
    pub batch_run: bool,
    pub history: Vec<RunRow>,
    pub is_rerun: bool,
    pub is_skipped: bool,
    pub started_by: Option<String>,
    pub data_location: String,
    pub reduction_location: String,
    pub path_type: PathType,
    pub new_path_type: PathType,
    pub data_analysis_link_url: String,
    pub has_reduce_vars: bool,
    pub arguments: RenderedArguments,
    pub sort: RunSort,
    pub navigation: RunNavigation,
}

/// Summary of one version of an ordinary run. A missing version means version 0.
pub async fn run_summary(
    state: &AppState,
    instrument: &str,
    run_number: u64,
    version: Option<u32>,
    params: &SummaryParams,
) -> Result<RunSummaryContext> {
    let history = state.storage.run_history(instrument, run_number).await?;
    summarize(state, history, version.unwrap_or(0), params).await
}

/// Summary of one version of a batch run, addressed by primary key.
pub async fn batch_run_summary(
    state: &AppState,
    instrument: &str,
    pk: i64,
    version: Option<u32>,
    params: &SummaryParams,
) -> Result<RunSummaryContext> {
    let history = state.storage.batch_run_history(instrument, pk).await?;
    summarize(state, history, version.unwrap_or(0), params).await
}

async fn summarize(
    state: &AppState,
    history: Vec<ReductionRun>,
    version: u32,
    params: &SummaryParams,
) -> Result<RunSummaryContext> {
    let run = history
        .iter()
        .find(|run| run.run_version == version)
        .cloned()
        .ok_or_else(|| {
            WebError::NotFound(format!("Version {} of this run does not exist", version))
        })?;

    let detail = state.storage.run_detail(run.id).await?;
    let started_by = started_by_name(&state.storage, run.started_by).await?;

    let reduction_location = detail
        .reduction_locations
        .first()
        .map(|location| location.replace('\\', "/"))
        .unwrap_or_default();
    let path_type = PathType::parse_lenient(params.path_type.as_deref());
    let data_location = detail
        .data_locations
        .first()
        .map(|location| path_type.convert(location))
        .unwrap_or_default();
    let data_analysis_link_url = if reduction_location.is_empty() {
        String::new()
    } else {
        data_analysis_url(&state.config.paths.data_analysis_base_url, &reduction_location)
    };

    let (defaults, _) = defaults_for_display(state.scripts_root(), &run.instrument);
    let arguments = detail.arguments.for_render(&defaults);

    let sort = RunSort::parse_lenient(params.sort.as_deref());
    let navigation = state.storage.run_navigation(&run, sort).await?;

    Ok(RunSummaryContext {
        runs: run.identity.joined(),
        run_unique_id: run.unique_id(),
        run_version: run.run_version,
        batch_run: run.is_batch(),
        is_rerun: history.len() > 1,
        is_skipped: run.is_skipped(),
        history: history.into_iter().map(RunRow::from).collect(),
        started_by,
        data_location,
        reduction_location,
        path_type,
        new_path_type: path_type.toggled(),
        data_analysis_link_url,
        has_reduce_vars: !defaults.standard_vars.is_empty(),
        arguments,
        sort,
        navigation,
        run,
    })
}

/// Display name for whoever started a run.
///
/// Control codes have fixed names; user ids are looked up and give `None`
/// when the user is unknown.
pub async fn started_by_name(storage: &Storage, started_by: Option<i64>) -> Result<Option<String>> {
    match StartedBy::from_id(started_by) {
        StartedBy::User { id } => {
            let name = storage.user_name(id).await?;
            if name.is_none() {
                warn!("No user with id {}", id);
            }
            Ok(name)
        }
        other => Ok(other.fixed_name().map(String::from)),
    }
}

// ============================================================================
// Experiment summary
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StartedRun {
    #[serde(flatten)]
    pub row: RunRow,
    pub started_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExperimentSummaryContext {
    pub experiment: Experiment,
    pub run_count: usize,
    pub runs: Page<StartedRun>,
}

pub async fn experiment_summary(
    state: &AppState,
    reference_number: u64,
    params: &PageParams,
) -> Result<ExperimentSummaryContext> {
    let experiment = state.storage.get_experiment(reference_number).await?;
    let filters = RunFilters {
        experiment_reference: Some(reference_number),
        batch_run: Some(false),
        ..Default::default()
    };
    let page = state
        .storage
        .list_runs(&filters, RunOrder::LastUpdatedDesc, &params.request(state))
        .await?;

    let mut records = Vec::with_capacity(page.records.len());
    for run in page.records {
        let started_by = started_by_name(&state.storage, run.started_by).await?;
        records.push(StartedRun {
            row: run.into(),
            started_by,
        });
    }

    Ok(ExperimentSummaryContext {
        experiment,
        run_count: page.pagination.total_items,
        runs: Page::new(page.pagination, records),
    })
}

// ============================================================================
// Search
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchParams {
    pub run_number: Option<String>,
    pub instrument: Option<String>,
    pub run_description: Option<String>,
    pub run_description_qualifier: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    pub created_after: Option<String>,
    /// `YYYY-MM-DD`, inclusive
    pub created_before: Option<String>,
    pub status: Option<String>,
    pub experiment_reference: Option<String>,
    #[serde(flatten)]
    pub page: PageParams,
}

impl SearchParams {
    fn wants_runs(&self) -> bool {
        [
            &self.run_number,
            &self.instrument,
            &self.run_description,
            &self.created_after,
            &self.created_before,
            &self.status,
        ]
        .iter()
        .any(|field| field.is_some())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchContext {
    pub runs: Option<Page<RunRow>>,
    pub experiments: Option<Page<Experiment>>,
    pub run_description_qualifier: String,
    pub per_page: PageSize,
    pub run_message: &'static str,
    pub experiment_message: &'static str,
}

/// Run and experiment search.
///
/// Every filter is validated before any query runs: a malformed run-number
/// query, date or status fails the whole search.
pub async fn search(state: &AppState, params: &SearchParams) -> Result<SearchContext> {
    let request = params.page.request(state);
    let qualifier = present(&params.run_description_qualifier)
        .unwrap_or("contains")
        .to_string();

    let runs = if params.wants_runs() {
        let filters = RunFilters {
            instrument: present(&params.instrument).map(String::from),
            run_query: match present(&params.run_number) {
                Some(raw) => parse_run_query(raw)?,
                None => None,
            },
            description: present(&params.run_description)
                .map(|value| DescriptionMatch::new(value, Some(qualifier.as_str()))),
            created_from: parse_day(present(&params.created_after), Time::MIDNIGHT)?,
            created_to: parse_day(present(&params.created_before), END_OF_DAY)?,
            statuses: match present(&params.status) {
                Some(status) => vec![Status::parse(status)?],
                None => Vec::new(),
            },
            ..Default::default()
        };
        let page = state.storage.search_runs(&filters, &request).await?;
        Some(page.map(RunRow::from))
    } else {
        None
    };

    let experiments = match &params.experiment_reference {
        Some(reference) => Some(
            state
                .storage
                .search_experiments(Some(reference.as_str()), &request)
                .await?,
        ),
        None => None,
    };

    Ok(SearchContext {
        runs,
        experiments,
        run_description_qualifier: qualifier,
        per_page: request.page_size,
        run_message: "Sorry, no runs found for this criteria.",
        experiment_message: "Sorry, no experiments found for this criteria.",
    })
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_day(value: Option<&str>, at: Time) -> Result<Option<OffsetDateTime>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let date = Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| {
        WebError::Validation(format!("Invalid date '{}': expected YYYY-MM-DD", value))
    })?;
    Ok(Some(PrimitiveDateTime::new(date, at).assume_utc()))
}

// ============================================================================
// Queue and failed queue
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct QueueContext {
    pub queued: Vec<RunRow>,
    pub processing: Vec<RunRow>,
}

/// Runs waiting for or undergoing reduction, oldest first.
pub async fn queue(state: &AppState) -> Result<QueueContext> {
    let queued = state
        .storage
        .runs(&RunFilters::default().with_status(Status::Queued), RunOrder::CreatedAsc)
        .await?;
    let processing = state
        .storage
        .runs(&RunFilters::default().with_status(Status::Processing), RunOrder::CreatedAsc)
        .await?;

    Ok(QueueContext {
        queued: queued.into_iter().map(RunRow::from).collect(),
        processing: processing.into_iter().map(RunRow::from).collect(),
    })
}

pub async fn fail_queue(state: &AppState, params: &PageParams) -> Result<Page<RunRow>> {
    let page = state.storage.failed_runs(&params.request(state)).await?;
    Ok(page.map(RunRow::from))
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailQueueAction {
    #[serde(default = "default_action")]
    pub action: String,
    /// `[instrument, run_number, run_version]` triples
    #[serde(default)]
    pub selected_runs: Vec<(String, u64, u32)>,
}

fn default_action() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct FailQueueOutcome {
    pub action: String,
    pub hidden: usize,
    pub message: Option<String>,
}

/// Apply an action to the selected failed runs.
///
/// `hide` removes them from the failed queue; `default` does nothing. The
/// first run that cannot be acted on stops the action and is reported in
/// `message`.
pub async fn fail_queue_action(
    state: &AppState,
    action: &FailQueueAction,
) -> Result<FailQueueOutcome> {
    let mut outcome = FailQueueOutcome {
        action: action.action.clone(),
        hidden: 0,
        message: None,
    };

    match action.action.as_str() {
        "hide" => {}
        "default" => return Ok(outcome),
        other => return Err(WebError::Validation(format!("Unknown action '{}'", other))),
    }

    for (instrument, run_number, run_version) in &action.selected_runs {
        match state
            .storage
            .hide_failed_run(instrument, *run_number, *run_version)
            .await
        {
            Ok(()) => outcome.hidden += 1,
            Err(e) => {
                let message = format!("Selected action failed: {}", e);
                info!("Failed to carry out fail_queue action - {}", message);
                outcome.message = Some(message);
                break;
            }
        }
    }

    Ok(outcome)
}

// ============================================================================
// Batch submission
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BatchSubmitted {
    pub instrument: String,
    pub runs: Vec<u64>,
}

/// Validate a batch run form and send it to the submission API.
///
/// The form carries `runs` (a run-number query), optional `run_description`
/// and `user_id`, and `var-standard-*` / `var-advanced-*` variable fields.
pub async fn submit_batch_run(
    state: &AppState,
    instrument: &str,
    form: &[(String, String)],
) -> Result<BatchSubmitted> {
    let instrument = state.storage.get_instrument(instrument).await?;

    let raw_runs = form_field(form, "runs")
        .ok_or_else(|| WebError::Validation(EMPTY_RUNS_MESSAGE.to_string()))?;
    let runs = match parse_run_query(raw_runs)? {
        Some(query) => query.expand()?,
        None => Vec::new(),
    };
    if runs.is_empty() {
        return Err(WebError::Validation(EMPTY_RUNS_MESSAGE.to_string()));
    }

    let submitted = read_variables_from_form(form.iter().map(|(key, value)| (key, value)))?;
    let defaults = load_default_arguments(state.scripts_root(), &instrument.name)
        .map_err(|e| WebError::Validation(e.to_string()))?;
    let reduction_arguments = merge_arguments(&submitted, &defaults).map_err(|e| match e {
        rv_core::Error::UnknownVariable(name) => WebError::Validation(format!(
            "Error encountered when processing variable with name: {}. Please check that the \
             names of the variables in reduce_vars.json match the names of the variables shown \
             in the web app.",
            name
        )),
        e => e.into(),
    })?;

    let user_id = form_field(form, "user_id")
        .map(|value| {
            value
                .parse::<i64>()
                .map_err(|_| WebError::Validation("User id must be numeric".to_string()))
        })
        .transpose()?;

    let submission = BatchSubmission {
        runs,
        reduction_arguments,
        user_id,
        description: form_field(form, "run_description").unwrap_or("").to_string(),
    };
    state
        .submission
        .submit_batch(&instrument.name, &submission)
        .await?;

    Ok(BatchSubmitted {
        instrument: instrument.name,
        runs: submission.runs,
    })
}

fn form_field<'a>(form: &'a [(String, String)], name: &str) -> Option<&'a str> {
    form.iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

// ============================================================================
// Instruments
// ============================================================================

pub async fn instruments(state: &AppState) -> Result<Vec<Instrument>> {
    Ok(state.storage.list_instruments().await?)
}

pub async fn sync_instruments(state: &AppState) -> Result<Vec<InstrumentActivity>> {
    Ok(crate::defaults::sync_instrument_activity(&state.storage, state.scripts_root()).await?)
}

pub async fn set_instrument_paused(
    state: &AppState,
    name: &str,
    paused: bool,
) -> Result<Instrument> {
    state.storage.set_instrument_paused(name, paused).await?;
    Ok(state.storage.get_instrument(name).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_list_filter_parse() {
        assert_eq!(RunListFilter::parse_lenient(None), RunListFilter::Run);
        assert_eq!(
            RunListFilter::parse_lenient(Some("batch_runs")),
            RunListFilter::BatchRuns
        );
        assert_eq!(
            RunListFilter::parse_lenient(Some("experiment")),
            RunListFilter::Experiment
        );
        assert_eq!(RunListFilter::parse_lenient(Some("bogus")), RunListFilter::Run);
    }

    #[test]
    fn test_parse_day_bounds() {
        let start = parse_day(Some("2021-03-04"), Time::MIDNIGHT).unwrap().unwrap();
        let end = parse_day(Some("2021-03-04"), END_OF_DAY).unwrap().unwrap();
        assert_eq!(end.unix_timestamp() - start.unix_timestamp(), 86_399);
        assert!(parse_day(None, Time::MIDNIGHT).unwrap().is_none());
        assert!(matches!(
            parse_day(Some("04/03/2021"), Time::MIDNIGHT),
            Err(WebError::Validation(_))
        ));
    }

    #[test]
    fn test_form_field_ignores_blank_values() {
        let form = vec![
            ("runs".to_string(), " 1-3 ".to_string()),
            ("user_id".to_string(), "  ".to_string()),
        ];
        assert_eq!(form_field(&form, "runs"), Some("1-3"));
        assert_eq!(form_field(&form, "user_id"), None);
        assert_eq!(form_field(&form, "missing"), None);
    }

    #[test]
    fn test_fail_queue_action_defaults() {
        let action: FailQueueAction =
            serde_json::from_str(r#"{"selected_runs": [["MARI", 60200, 1]]}"#).unwrap();
        assert_eq!(action.action, "default");
        assert_eq!(action.selected_runs, vec![("MARI".to_string(), 60200, 1)]);
    }
}

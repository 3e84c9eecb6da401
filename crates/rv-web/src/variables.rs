//! Instrument variables pages
//!
//! Arguments can be stored ahead of time for upcoming runs, either from a
//! start run onwards or for one experiment. These views show what the next
//! runs will pick up, remove stored records, and show the defaults an
//! instrument ships in `reduce_vars.json`.

use rv_core::arguments::VariableHelp;
use rv_core::{Instrument, ReductionArguments, ReductionRun};
use rv_storage::ArgumentsRecord;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::defaults::load_default_arguments;
use crate::error::Result;
use crate::server::AppState;

/// Arguments applying to runs `run_start..=run_end`; an end of 0 is open.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariablesByRun {
    pub run_start: u64,
    pub run_end: u64,
    pub arguments: ReductionArguments,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariablesByExperiment {
    pub experiment: u64,
    pub arguments: ReductionArguments,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariablesSummaryContext {
    pub instrument: Instrument,
    pub last_instrument_run: Option<ReductionRun>,
    pub current_variables: Option<VariablesByRun>,
    pub upcoming_arguments_by_run: Vec<VariablesByRun>,
    pub upcoming_arguments_by_experiment: Vec<VariablesByExperiment>,
}

/// Group by-run records by start run, keeping the first record of each, and
/// end every group one run before the next group starts. The last group is
/// open-ended.
pub fn upcoming_by_run(records: Vec<ArgumentsRecord>) -> Vec<VariablesByRun> {
    let mut groups: Vec<VariablesByRun> = Vec::new();
    for record in records {
        let Some(run_start) = record.start_run() else {
            continue;
        };
        if groups.iter().any(|group| group.run_start == run_start) {
            continue;
        }
        groups.push(VariablesByRun {
            run_start,
            run_end: 0,
            arguments: record.arguments,
        });
    }
    groups.sort_by_key(|group| group.run_start);

    let mut run_end = 0;
    for group in groups.iter_mut().rev() {
        group.run_end = run_end;
        run_end = group.run_start.saturating_sub(1);
    }
    groups
}

/// One record per experiment, lowest experiment first.
pub fn upcoming_by_experiment(records: Vec<ArgumentsRecord>) -> Vec<VariablesByExperiment> {
    let mut groups: Vec<VariablesByExperiment> = Vec::new();
    for record in records {
        let Some(experiment) = record.experiment_reference() else {
            continue;
        };
        if groups.iter().any(|group| group.experiment == experiment) {
            continue;
        }
        groups.push(VariablesByExperiment {
            experiment,
            arguments: record.arguments,
        });
    }
    groups.sort_by_key(|group| group.experiment);
    groups
}

/// Last run covered by the current arguments: one before the first upcoming
/// start run after `current_start`, or 0 when nothing follows.
pub fn current_run_end(current_start: u64, upcoming: &[VariablesByRun]) -> u64 {
    upcoming
        .iter()
        .map(|group| group.run_start)
        .filter(|start| *start > current_start)
        .min()
        .map(|start| start - 1)
        .unwrap_or(0)
}

/// Current and upcoming arguments of an instrument, relative to its last run.
pub async fn variables_summary(
    state: &AppState,
    instrument: &str,
) -> Result<VariablesSummaryContext> {
    let storage = &state.storage;
    let instrument = storage.get_instrument(instrument).await?;
    let (_, last_run) = storage.first_and_last_run(&instrument.name).await?;

    let last_run_number = last_run.as_ref().and_then(ReductionRun::run_number).unwrap_or(0);
    let last_experiment = last_run.as_ref().map(|run| run.experiment_reference).unwrap_or(0);

    let upcoming_by_run = upcoming_by_run(
        storage
            .arguments_by_run_after(&instrument.name, last_run_number)
            .await?,
    );
    let upcoming_by_experiment = upcoming_by_experiment(
        storage
            .arguments_by_experiment_from(&instrument.name, last_experiment)
            .await?,
    );

    let current_variables = match &last_run {
        Some(run) => {
            let applicable = storage
                .applicable_arguments(&instrument.name, last_run_number, run.experiment_reference)
                .await?;
            let (run_start, arguments) = match applicable {
                Some(record) => (record.start_run().unwrap_or(0), record.arguments),
                None => (0, storage.run_detail(run.id).await?.arguments),
            };
            (!arguments.is_empty()).then(|| VariablesByRun {
                run_start,
                run_end: current_run_end(run_start, &upcoming_by_run),
                arguments,
            })
        }
        None => None,
    };

    Ok(VariablesSummaryContext {
        instrument,
        last_instrument_run: last_run,
        current_variables,
        upcoming_arguments_by_run: upcoming_by_run,
        upcoming_arguments_by_experiment: upcoming_by_experiment,
    })
}

/// Which stored arguments to delete. With `experiment_reference` set the
/// run range is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteVariables {
    #[serde(default)]
    pub start: u64,
    /// 0 leaves the range open above
    #[serde(default)]
    pub end: u64,
    pub experiment_reference: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariablesDeleted {
    pub instrument: String,
    pub deleted: u64,
}

pub async fn delete_variables(
    state: &AppState,
    instrument: &str,
    request: &DeleteVariables,
) -> Result<VariablesDeleted> {
    let instrument = state.storage.get_instrument(instrument).await?;
    let deleted = match request.experiment_reference {
        Some(reference) => {
            state
                .storage
                .delete_arguments_for_experiment(&instrument.name, reference)
                .await?
        }
        None => {
            state
                .storage
                .delete_arguments_in_range(&instrument.name, request.start, request.end)
                .await?
        }
    };

    Ok(VariablesDeleted {
        instrument: instrument.name,
        deleted,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DefaultVariablesContext {
    pub instrument: String,
    pub standard_variables: Map<String, Value>,
    pub advanced_variables: Map<String, Value>,
    pub variable_help: VariableHelp,
    /// Why the defaults could not be loaded
    pub message: Option<String>,
}

/// The defaults shipped in the instrument's `reduce_vars.json`.
pub async fn default_variables(
    state: &AppState,
    instrument: &str,
) -> Result<DefaultVariablesContext> {
    let instrument = state.storage.get_instrument(instrument).await?;

    let (defaults, message) = match load_default_arguments(state.scripts_root(), &instrument.name) {
        Ok(defaults) => (defaults, None),
        Err(e) => (ReductionArguments::default(), Some(e.to_string())),
    };

    Ok(DefaultVariablesContext {
        instrument: instrument.name,
        standard_variables: defaults.standard_vars,
        advanced_variables: defaults.advanced_vars,
        variable_help: defaults.variable_help,
        message,
    })
}

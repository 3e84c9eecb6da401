//! Reduction arguments stored per instrument, by start run or by experiment

use rv_core::ReductionArguments;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::info;

use crate::db::{from_db_number, instrument_id, to_db_number};
use crate::models::{ArgumentsRecord, ArgumentsScope};
use crate::{Result, Storage, StorageError};

const ARGUMENTS_SELECT: &str = "SELECT a.id, i.name AS instrument, a.raw, a.start_run, \
     a.experiment_reference FROM reduction_arguments a JOIN instruments i ON i.id = a.instrument_id";

impl Storage {
    pub async fn create_arguments(
        &self,
        instrument: &str,
        scope: ArgumentsScope,
        arguments: &ReductionArguments,
    ) -> Result<ArgumentsRecord> {
        let raw = serde_json::to_string(arguments)?;
        let (start_run, experiment_reference) = match scope {
            ArgumentsScope::FromRun { start_run } => (Some(to_db_number(start_run)), None),
            ArgumentsScope::Experiment { reference_number } => {
                (None, Some(to_db_number(reference_number)))
            }
        };

        let mut tx = self.pool().begin().await?;
        let instrument_id = instrument_id(&mut tx, instrument).await?;
        let id = sqlx::query(
            "INSERT INTO reduction_arguments (instrument_id, raw, start_run, experiment_reference) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(instrument_id)
        .bind(&raw)
        .bind(start_run)
        .bind(experiment_reference)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        tx.commit().await?;

        Ok(ArgumentsRecord {
            id,
            instrument: instrument.to_string(),
            scope,
            arguments: arguments.clone(),
        })
    }

    /// By-run records starting after `run_number`, lowest start run first.
    pub async fn arguments_by_run_after(
        &self,
        instrument: &str,
        run_number: u64,
    ) -> Result<Vec<ArgumentsRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE i.name = ? AND a.start_run > ? ORDER BY a.start_run ASC, a.id ASC",
            ARGUMENTS_SELECT
        ))
        .bind(instrument)
        .bind(to_db_number(run_number))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(arguments_from_row).collect()
    }

    /// By-experiment records from `reference_number` upwards, lowest first.
    pub async fn arguments_by_experiment_from(
        &self,
        instrument: &str,
        reference_number: u64,
    ) -> Result<Vec<ArgumentsRecord>> {
        let rows = sqlx::query(&format!(
            "{} WHERE i.name = ? AND a.experiment_reference >= ? \
             ORDER BY a.experiment_reference ASC, a.id ASC",
            ARGUMENTS_SELECT
        ))
        .bind(instrument)
        .bind(to_db_number(reference_number))
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(arguments_from_row).collect()
    }

    /// The record a run picks up: its experiment's record if there is one,
    /// otherwise the by-run record with the highest start run not after it.
    pub async fn applicable_arguments(
        &self,
        instrument: &str,
        run_number: u64,
        experiment_reference: u64,
    ) -> Result<Option<ArgumentsRecord>> {
        let by_experiment = sqlx::query(&format!(
            "{} WHERE i.name = ? AND a.experiment_reference = ? ORDER BY a.id DESC LIMIT 1",
            ARGUMENTS_SELECT
        ))
        .bind(instrument)
        .bind(to_db_number(experiment_reference))
        .fetch_optional(self.pool())
        .await?;
        if let Some(row) = by_experiment {
            return arguments_from_row(&row).map(Some);
        }

        let by_run = sqlx::query(&format!(
            "{} WHERE i.name = ? AND a.start_run <= ? \
             ORDER BY a.start_run DESC, a.id DESC LIMIT 1",
            ARGUMENTS_SELECT
        ))
        .bind(instrument)
        .bind(to_db_number(run_number))
        .fetch_optional(self.pool())
        .await?;
        by_run.as_ref().map(arguments_from_row).transpose()
    }

    /// Delete by-run records with `start <= start_run <= end`. An `end` of 0
    /// leaves the range open above.
    pub async fn delete_arguments_in_range(
        &self,
        instrument: &str,
        start: u64,
        end: u64,
    ) -> Result<u64> {
        let end = if end > 0 { Some(to_db_number(end)) } else { None };
        let result = sqlx::query(
            "DELETE FROM reduction_arguments \
             WHERE instrument_id = (SELECT id FROM instruments WHERE name = ?) \
             AND start_run >= ? AND (? IS NULL OR start_run <= ?)",
        )
        .bind(instrument)
        .bind(to_db_number(start))
        .bind(end)
        .bind(end)
        .execute(self.pool())
        .await?;

        let deleted = result.rows_affected();
        info!("Deleted {} run variables of {} from run {}", deleted, instrument, start);
        Ok(deleted)
    }

    pub async fn delete_arguments_for_experiment(
        &self,
        instrument: &str,
        reference_number: u64,
    ) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM reduction_arguments \
             WHERE instrument_id = (SELECT id FROM instruments WHERE name = ?) \
             AND experiment_reference = ?",
        )
        .bind(instrument)
        .bind(to_db_number(reference_number))
        .execute(self.pool())
        .await?;

        let deleted = result.rows_affected();
        info!(
            "Deleted {} experiment variables of {} for RB{}",
            deleted, instrument, reference_number
        );
        Ok(deleted)
    }
}

fn arguments_from_row(row: &SqliteRow) -> Result<ArgumentsRecord> {
    let id: i64 = row.try_get("id")?;
    let raw: String = row.try_get("raw")?;
    let start_run: Option<i64> = row.try_get("start_run")?;
    let experiment_reference: Option<i64> = row.try_get("experiment_reference")?;

    let scope = match (start_run, experiment_reference) {
        (Some(start_run), None) => ArgumentsScope::FromRun {
            start_run: from_db_number("reduction_arguments", start_run)?,
        },
        (None, Some(reference)) => ArgumentsScope::Experiment {
            reference_number: from_db_number("reduction_arguments", reference)?,
        },
        _ => {
            return Err(StorageError::InvalidRow {
                table: "reduction_arguments",
                reason: format!("arguments {} need exactly one of start run or experiment", id),
            });
        }
    };

    Ok(ArgumentsRecord {
        id,
        instrument: row.try_get("instrument")?,
        scope,
        arguments: ReductionArguments::from_value(serde_json::from_str(&raw)?)?,
    })
}

//! Reduction run queries

use rv_core::{
    Experiment, Page, PageRequest, ReductionArguments, ReductionRun, RunIdentity, RunSort,
    RunTerm, Status,
};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use time::OffsetDateTime;
use tracing::debug;

use crate::db::{experiment_from_row, experiment_id, instrument_id, to_db_number};
use crate::models::{
    DescriptionMatch, NewRun, RunDetail, RunFilters, RunLinkTarget, RunNavigation, RunOrder,
};
use crate::{Result, Storage, StorageError};

const RUN_SELECT: &str = "SELECT r.id, i.name AS instrument, e.reference_number AS experiment_reference, \
     r.run_version, r.run_description, r.status, r.batch_run, r.hidden_in_failviewer, \
     r.started_by, r.message, r.created, r.last_updated, \
     (SELECT group_concat(rn.run_number, ',') FROM run_numbers rn WHERE rn.reduction_run_id = r.id) AS run_numbers \
     FROM reduction_runs r \
     JOIN instruments i ON i.id = r.instrument_id \
     JOIN experiments e ON e.id = r.experiment_id";

const RUN_COUNT: &str = "SELECT COUNT(*) FROM reduction_runs r \
     JOIN instruments i ON i.id = r.instrument_id \
     JOIN experiments e ON e.id = r.experiment_id";

/// Lowest run number of a run; the sort key for run-number ordering.
const PRIMARY_RUN: &str =
    "(SELECT MIN(rn.run_number) FROM run_numbers rn WHERE rn.reduction_run_id = r.id)";

#[derive(Debug, Clone, Copy)]
enum Step {
    Next,
    Previous,
    Newest,
    Oldest,
}

impl Storage {
    /// Record a run with its run numbers and file locations.
    ///
    /// The instrument and experiment are created when they do not exist yet.
    pub async fn create_run(&self, run: NewRun) -> Result<ReductionRun> {
        if run.run_numbers.is_empty() {
            return Err(StorageError::InvalidRow {
                table: "run_numbers",
                reason: "a run needs at least one run number".to_string(),
            });
        }
        let arguments = serde_json::to_string(&run.arguments)?;

        let mut tx = self.pool().begin().await?;
        let instrument = instrument_id(&mut tx, &run.instrument).await?;
        let experiment = experiment_id(&mut tx, run.experiment_reference).await?;

        let id = sqlx::query(
            "INSERT INTO reduction_runs (instrument_id, experiment_id, run_version, run_description, \
             status, batch_run, hidden_in_failviewer, started_by, message, arguments, created, last_updated) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(instrument)
        .bind(experiment)
        .bind(i64::from(run.run_version))
        .bind(&run.run_description)
        .bind(run.status.code())
        .bind(run.batch_run)
        .bind(run.started_by)
        .bind(&run.message)
        .bind(&arguments)
        .bind(run.created.unix_timestamp())
        .bind(run.last_updated.unix_timestamp())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for run_number in &run.run_numbers {
            sqlx::query("INSERT INTO run_numbers (reduction_run_id, run_number) VALUES (?, ?)")
                .bind(id)
                .bind(to_db_number(*run_number))
                .execute(&mut *tx)
                .await?;
        }
        for path in &run.data_locations {
            sqlx::query("INSERT INTO data_locations (reduction_run_id, file_path) VALUES (?, ?)")
                .bind(id)
            .bind(path)
            .execute(&mut *tx)
            .await?;
        }
        for path in &run.reduction_locations {
            sqlx::query(
                "INSERT INTO reduction_locations (reduction_run_id, file_path) VALUES (?, ?)",
            )
            .bind(id)
                .bind(path)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Created run {} on {} ({:?})", id, run.instrument, run.run_numbers);

        self.get_run(id).await
    }

    pub async fn get_run(&self, id: i64) -> Result<ReductionRun> {
        let row = sqlx::query(&format!("{} WHERE r.id = ?", RUN_SELECT))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        match row {
            Some(row) => run_from_row(&row),
            None => Err(StorageError::RunNotFound(id.to_string())),
        }
    }

    /// A run with its file locations and arguments
    pub async fn run_detail(&self, id: i64) -> Result<RunDetail> {
        let run = self.get_run(id).await?;

        let data_locations: Vec<String> = sqlx::query_scalar(
            "SELECT file_path FROM data_locations WHERE reduction_run_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;
        let reduction_locations: Vec<String> = sqlx::query_scalar(
            "SELECT file_path FROM reduction_locations WHERE reduction_run_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        let arguments: String =
            sqlx::query_scalar("SELECT arguments FROM reduction_runs WHERE id = ?")
                .bind(id)
                .fetch_one(self.pool())
                .await?;
        let arguments = ReductionArguments::from_value(serde_json::from_str(&arguments)?)?;

        Ok(RunDetail {
            run,
            data_locations,
            reduction_locations,
            arguments,
        })
    }

    /// Every version of an ordinary run, newest version first.
    pub async fn run_history(
        &self,
        instrument: &str,
        run_number: u64,
    ) -> Result<Vec<ReductionRun>> {
        let rows = sqlx::query(&format!(
            "{} WHERE i.name = ? AND r.batch_run = 0 \
             AND EXISTS (SELECT 1 FROM run_numbers rq WHERE rq.reduction_run_id = r.id AND rq.run_number = ?) \
             ORDER BY r.run_version DESC",
            RUN_SELECT
        ))
        .bind(instrument)
        .bind(to_db_number(run_number))
        .fetch_all(self.pool())
        .await?;

        if rows.is_empty() {
            return Err(StorageError::RunNotFound(format!("{} {}", instrument, run_number)));
        }
        rows.iter().map(run_from_row).collect()
    }

    /// Every version of a batch run: the batch runs covering the same run numbers.
    ///
    /// Reruns of a batch are grouped by their run-number set, so a batch
    /// resubmitted over the same runs shows up as a new version. Looking a
    /// batch up by primary key alone would give a one-entry history.
    pub async fn batch_run_history(&self, instrument: &str, pk: i64) -> Result<Vec<ReductionRun>> {
        let anchor = self.get_run(pk).await?;
        if anchor.instrument != instrument || !anchor.is_batch() {
            return Err(StorageError::RunNotFound(format!("{} batch {}", instrument, pk)));
        }

        let filters = RunFilters::for_instrument(instrument).batch(true);
        let history = self
            .runs(&filters, RunOrder::VersionDesc)
            .await?
            .into_iter()
            .filter(|run| run.identity == anchor.identity)
            .collect();
        Ok(history)
    }

    pub async fn count_runs(&self, filters: &RunFilters) -> Result<usize> {
        let mut builder = QueryBuilder::<Sqlite>::new(RUN_COUNT);
        push_filters(&mut builder, filters);
        let count: i64 = builder.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Ordinary runs of an instrument in one status
    pub async fn count_runs_with_status(&self, instrument: &str, status: Status) -> Result<usize> {
        let filters = RunFilters::for_instrument(instrument)
            .batch(false)
            .with_status(status);
        self.count_runs(&filters).await
    }

    /// All runs matching `filters`, unpaginated.
    pub async fn runs(&self, filters: &RunFilters, order: RunOrder) -> Result<Vec<ReductionRun>> {
        let mut builder = QueryBuilder::<Sqlite>::new(RUN_SELECT);
        push_filters(&mut builder, filters);
        builder.push(order_clause(order));

        let rows = builder.build().fetch_all(self.pool()).await?;
        rows.iter().map(run_from_row).collect()
    }

    /// One page of the runs matching `filters`.
    ///
    /// Out-of-range page requests are clamped, so this never fails on bad
    /// pagination input.
    pub async fn list_runs(
        &self,
        filters: &RunFilters,
        order: RunOrder,
        request: &PageRequest,
    ) -> Result<Page<ReductionRun>> {
        let total = self.count_runs(filters).await?;
        let pagination = request.paginate(total);

        let mut builder = QueryBuilder::<Sqlite>::new(RUN_SELECT);
        push_filters(&mut builder, filters);
        builder.push(order_clause(order));
        builder
            .push(" LIMIT ")
            .push_bind(pagination.limit() as i64)
            .push(" OFFSET ")
            .push_bind(pagination.offset() as i64);

        let rows = builder.build().fetch_all(self.pool()).await?;
        let records = rows.iter().map(run_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(pagination, records))
    }

    /// Search listing: run number descending.
    pub async fn search_runs(
        &self,
        filters: &RunFilters,
        request: &PageRequest,
    ) -> Result<Page<ReductionRun>> {
        self.list_runs(filters, RunOrder::RunNumberDesc, request).await
    }

    /// Failed runs not hidden from the failed queue, newest first.
    pub async fn failed_runs(&self, request: &PageRequest) -> Result<Page<ReductionRun>> {
        let filters = RunFilters {
            hidden_in_failviewer: Some(false),
            ..Default::default()
        }
        .with_status(Status::Error);
        self.list_runs(&filters, RunOrder::CreatedDesc, request).await
    }

    /// Hide a failed run from the failed queue.
    ///
    /// Only failed runs still shown in the queue can be hidden, and the
    /// selection must name exactly one of them.
    pub async fn hide_failed_run(
        &self,
        instrument: &str,
        run_number: u64,
        run_version: u32,
    ) -> Result<()> {
        let selection = format!("failed {} run {} version {}", instrument, run_number, run_version);
        let mut tx = self.pool().begin().await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT r.id FROM reduction_runs r JOIN instruments i ON i.id = r.instrument_id \
             WHERE i.name = ? AND r.status = ? AND r.hidden_in_failviewer = 0 AND r.run_version = ? \
             AND EXISTS (SELECT 1 FROM run_numbers rq WHERE rq.reduction_run_id = r.id AND rq.run_number = ?)",
        )
        .bind(instrument)
        .bind(Status::Error.code())
        .bind(i64::from(run_version))
        .bind(to_db_number(run_number))
        .fetch_all(&mut *tx)
        .await?;

        let id = match ids.as_slice() {
            [] => return Err(StorageError::RunNotFound(selection)),
            [id] => *id,
            _ => return Err(StorageError::AmbiguousRun(selection)),
        };

        sqlx::query("UPDATE reduction_runs SET hidden_in_failviewer = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!("Hid {} from the failed queue", selection);
        Ok(())
    }

    /// Oldest and newest ordinary run of an instrument, by creation time.
    pub async fn first_and_last_run(
        &self,
        instrument: &str,
    ) -> Result<(Option<ReductionRun>, Option<ReductionRun>)> {
        let first = self.edge_run(instrument, "ASC").await?;
        let last = self.edge_run(instrument, "DESC").await?;
        Ok((first, last))
    }

    async fn edge_run(&self, instrument: &str, direction: &str) -> Result<Option<ReductionRun>> {
        let row = sqlx::query(&format!(
            "{} WHERE i.name = ? AND r.batch_run = 0 ORDER BY r.created {dir}, r.id {dir} LIMIT 1",
            RUN_SELECT,
            dir = direction
        ))
        .bind(instrument)
        .fetch_optional(self.pool())
        .await?;
        row.as_ref().map(run_from_row).transpose()
    }

    /// Experiments with at least one run on `instrument`, highest RB number first.
    pub async fn experiments_with_runs(&self, instrument: &str) -> Result<Vec<Experiment>> {
        let rows = sqlx::query(
            "SELECT DISTINCT e.id, e.reference_number FROM experiments e \
             JOIN reduction_runs r ON r.experiment_id = e.id \
             JOIN instruments i ON i.id = r.instrument_id \
             WHERE i.name = ? ORDER BY e.reference_number DESC",
        )
        .bind(instrument)
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(experiment_from_row).collect()
    }

    /// Experiments whose RB number contains `reference`, highest first.
    pub async fn search_experiments(
        &self,
        reference: Option<&str>,
        request: &PageRequest,
    ) -> Result<Page<Experiment>> {
        let pattern = format!("%{}%", escape_like(reference.unwrap_or("").trim()));

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM experiments WHERE CAST(reference_number AS TEXT) LIKE ? ESCAPE '\\'",
        )
        .bind(&pattern)
        .fetch_one(self.pool())
        .await?;
        let pagination = request.paginate(usize::try_from(total).unwrap_or(0));

        let rows = sqlx::query(
            "SELECT id, reference_number FROM experiments \
             WHERE CAST(reference_number AS TEXT) LIKE ? ESCAPE '\\' \
             ORDER BY reference_number DESC LIMIT ? OFFSET ?",
        )
        .bind(&pattern)
        .bind(pagination.limit() as i64)
        .bind(pagination.offset() as i64)
        .fetch_all(self.pool())
        .await?;
        let records = rows.iter().map(experiment_from_row).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(pagination, records))
    }

    /// Neighbouring runs of `run` in its instrument's listing.
    ///
    /// Ordinary runs step between run numbers (landing on the latest version),
    /// batch runs step between batches. Edges of the listing give `None`.
    pub async fn run_navigation(&self, run: &ReductionRun, sort: RunSort) -> Result<RunNavigation> {
        Ok(RunNavigation {
            next: self.neighbour(run, sort, Step::Next).await?,
            previous: self.neighbour(run, sort, Step::Previous).await?,
            newest: self.neighbour(run, sort, Step::Newest).await?,
            oldest: self.neighbour(run, sort, Step::Oldest).await?,
        })
    }

    async fn neighbour(
        &self,
        run: &ReductionRun,
        sort: RunSort,
        step: Step,
    ) -> Result<Option<RunLinkTarget>> {
        let mut builder = QueryBuilder::<Sqlite>::new(RUN_SELECT);
        builder
            .push(" WHERE i.name = ")
            .push_bind(run.instrument.clone())
            .push(" AND r.batch_run = ")
            .push_bind(run.is_batch());

        match sort {
            RunSort::Run => {
                let (key, value) = if run.is_batch() {
                    ("r.id", run.id)
                } else {
                    (PRIMARY_RUN, run.run_number().map(to_db_number).unwrap_or(0))
                };
                match step {
                    Step::Next => {
                        builder.push(format!(" AND {} > ", key)).push_bind(value);
                        builder.push(format!(" ORDER BY {} ASC, r.run_version DESC", key));
                    }
                    Step::Previous => {
                        builder.push(format!(" AND {} < ", key)).push_bind(value);
                        builder.push(format!(" ORDER BY {} DESC, r.run_version DESC", key));
                    }
                    Step::Newest => {
                        builder.push(format!(" ORDER BY {} DESC, r.run_version DESC", key));
                    }
                    Step::Oldest => {
                        builder.push(format!(" ORDER BY {} ASC, r.run_version DESC", key));
                    }
                }
            }
            RunSort::Date => {
                let updated = run.last_updated.unix_timestamp();
                match step {
                    Step::Next => {
                        builder
                            .push(" AND (r.last_updated, r.id) > (")
                            .push_bind(updated)
                            .push(", ")
                            .push_bind(run.id)
                            .push(") ORDER BY r.last_updated ASC, r.id ASC");
                    }
                    Step::Previous => {
                        builder
                            .push(" AND (r.last_updated, r.id) < (")
                            .push_bind(updated)
                            .push(", ")
                            .push_bind(run.id)
                            .push(") ORDER BY r.last_updated DESC, r.id DESC");
                    }
                    Step::Newest => {
                        builder.push(" ORDER BY r.last_updated DESC, r.id DESC");
                    }
                    Step::Oldest => {
                        builder.push(" ORDER BY r.last_updated ASC, r.id ASC");
                    }
                }
            }
        }
        builder.push(" LIMIT 1");

        let row = builder.build().fetch_optional(self.pool()).await?;
        let run = row.as_ref().map(run_from_row).transpose()?;
        Ok(run.as_ref().map(RunLinkTarget::from))
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Sqlite>, filters: &RunFilters) {
    builder.push(" WHERE 1 = 1");

    if let Some(instrument) = &filters.instrument {
        builder.push(" AND i.name = ").push_bind(instrument.clone());
    }
    if let Some(reference) = filters.experiment_reference {
        builder
            .push(" AND e.reference_number = ")
            .push_bind(to_db_number(reference));
    }
    if let Some(batch_run) = filters.batch_run {
        builder.push(" AND r.batch_run = ").push_bind(batch_run);
    }
    if let Some(hidden) = filters.hidden_in_failviewer {
        builder.push(" AND r.hidden_in_failviewer = ").push_bind(hidden);
    }

    if let Some(query) = &filters.run_query {
        push_run_query(builder, &query.terms);
    }

    match &filters.description {
        Some(DescriptionMatch::Exact(value)) => {
            builder.push(" AND r.run_description = ").push_bind(value.clone());
        }
        Some(DescriptionMatch::Contains(value)) => {
            builder
                .push(" AND r.run_description LIKE ")
                .push_bind(format!("%{}%", escape_like(value)))
                .push(" ESCAPE '\\'");
        }
        None => {}
    }

    if let Some(from) = filters.created_from {
        builder.push(" AND r.created >= ").push_bind(from.unix_timestamp());
    }
    if let Some(to) = filters.created_to {
        builder.push(" AND r.created <= ").push_bind(to.unix_timestamp());
    }

    if !filters.statuses.is_empty() {
        builder.push(" AND r.status IN (");
        let mut separated = builder.separated(", ");
        for status in &filters.statuses {
            separated.push_bind(status.code());
        }
        separated.push_unseparated(")");
    }
}

/// Match runs having any run number named by `terms`.
///
/// Exact numbers and ranges each travel as a single JSON array bound
/// parameter, so the statement stays the same size however many terms the
/// query has. A reversed range is passed through as written and matches
/// nothing.
fn push_run_query(builder: &mut QueryBuilder<'_, Sqlite>, terms: &[RunTerm]) {
    let mut exact = Vec::new();
    let mut spans = Vec::new();
    for term in terms {
        match *term {
            RunTerm::Exact { run_number } => exact.push(Value::from(to_db_number(run_number))),
            RunTerm::Between { low, high } => spans.push(Value::from(vec![
                to_db_number(low),
                to_db_number(high),
            ])),
        }
    }

    if exact.is_empty() && spans.is_empty() {
        builder.push(" AND 0");
        return;
    }

    builder.push(
        " AND EXISTS (SELECT 1 FROM run_numbers rq WHERE rq.reduction_run_id = r.id AND (0",
    );
    if !exact.is_empty() {
        builder
            .push(" OR rq.run_number IN (SELECT value FROM json_each(")
            .push_bind(Value::Array(exact).to_string())
            .push("))");
    }
    if !spans.is_empty() {
        builder
            .push(" OR EXISTS (SELECT 1 FROM json_each(")
            .push_bind(Value::Array(spans).to_string())
            .push(
                ") t WHERE rq.run_number BETWEEN json_extract(t.value, '$[0]') \
                 AND json_extract(t.value, '$[1]'))",
            );
    }
    builder.push("))");
}

fn order_clause(order: RunOrder) -> String {
    match order {
        RunOrder::RunNumberDesc => format!(
            " ORDER BY {} DESC, r.run_version ASC, r.id DESC",
            PRIMARY_RUN
        ),
        RunOrder::LastUpdatedDesc => " ORDER BY r.last_updated DESC, r.id DESC".to_string(),
        RunOrder::CreatedDesc => " ORDER BY r.created DESC, r.id DESC".to_string(),
        RunOrder::CreatedAsc => " ORDER BY r.created ASC, r.id ASC".to_string(),
        RunOrder::VersionDesc => " ORDER BY r.run_version DESC, r.id DESC".to_string(),
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn invalid_run(id: i64, reason: impl std::fmt::Display) -> StorageError {
    StorageError::InvalidRow {
        table: "reduction_runs",
        reason: format!("run {}: {}", id, reason),
    }
}

fn run_from_row(row: &SqliteRow) -> Result<ReductionRun> {
    let id: i64 = row.try_get("id")?;

    let run_numbers: Option<String> = row.try_get("run_numbers")?;
    let numbers = run_numbers
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|piece| !piece.is_empty())
        .map(|piece| piece.parse::<u64>().map_err(|e| invalid_run(id, e)))
        .collect::<Result<Vec<_>>>()?;

    let batch_run: bool = row.try_get("batch_run")?;
    let identity = if batch_run {
        RunIdentity::batch(numbers)
    } else {
        let run_number = numbers
            .iter()
            .min()
            .copied()
            .ok_or_else(|| invalid_run(id, "no run number"))?;
        RunIdentity::single(run_number)
    };

    let status: String = row.try_get("status")?;
    let run_version: i64 = row.try_get("run_version")?;
    let experiment_reference: i64 = row.try_get("experiment_reference")?;
    let created: i64 = row.try_get("created")?;
    let last_updated: i64 = row.try_get("last_updated")?;

    Ok(ReductionRun {
        id,
        instrument: row.try_get("instrument")?,
        experiment_reference: u64::try_from(experiment_reference).map_err(|e| invalid_run(id, e))?,
        identity,
        run_version: u32::try_from(run_version).map_err(|e| invalid_run(id, e))?,
        run_description: row.try_get("run_description")?,
        status: Status::from_code(&status)?,
        hidden_in_failviewer: row.try_get("hidden_in_failviewer")?,
        started_by: row.try_get("started_by")?,
        message: row.try_get("message")?,
        created: OffsetDateTime::from_unix_timestamp(created).map_err(|e| invalid_run(id, e))?,
        last_updated: OffsetDateTime::from_unix_timestamp(last_updated)
            .map_err(|e| invalid_run(id, e))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rv_core::{PageSize, parse_run_query};
    use time::Duration;

    async fn create_test_storage() -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(Some(dir.path().join("test.db"))).await.unwrap();
        (dir, storage)
    }

    fn at(seconds: i64) -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000) + Duration::seconds(seconds)
    }

    /// MARI runs 100..=104, one MARI batch over 100-102 and one WISH run 101.
    async fn seed(storage: &Storage) -> Vec<ReductionRun> {
        let mut created = Vec::new();
        for run_number in 100..=104u64 {
            let time = at(run_number as i64);
            let run = NewRun::new("MARI", 1234567, run_number)
                .with_status(Status::Completed)
                .with_times(time, time);
            created.push(storage.create_run(run).await.unwrap());
        }
        let batch =
            NewRun::batch("MARI", 1234567, vec![100, 101, 102]).with_times(at(500), at(500));
        created.push(storage.create_run(batch).await.unwrap());
        let other = NewRun::new("WISH", 7654321, 101).with_times(at(600), at(600));
        created.push(storage.create_run(other).await.unwrap());
        created
    }

    fn filters_for(query: &str) -> RunFilters {
        RunFilters::for_instrument("MARI").with_run_query(parse_run_query(query).unwrap())
    }

    #[tokio::test]
    async fn test_create_and_fetch_run() {
        let (_dir, storage) = create_test_storage().await;

        let mut new_run = NewRun::new("MARI", 1234567, 60200).with_description("vanadium");
        new_run.data_locations = vec![r"\\isis\inst$\NDXMARI\MAR60200.nxs".to_string()];
        new_run.reduction_locations =
            vec!["/instrument/MARI/RBNumber/RB1234567/autoreduced".to_string()];
        let run = storage.create_run(new_run).await.unwrap();

        assert_eq!(run.run_number(), Some(60200));
        assert_eq!(run.status, Status::Queued);
        assert_eq!(run.run_description, "vanadium");
        assert_eq!(run.experiment_reference, 1234567);

        let detail = storage.run_detail(run.id).await.unwrap();
        assert_eq!(detail.data_locations.len(), 1);
        assert_eq!(detail.reduction_locations.len(), 1);
        assert!(detail.arguments.is_empty());

        assert!(storage.get_run(run.id + 100).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_run_needs_run_number() {
        let (_dir, storage) = create_test_storage().await;
        let run = NewRun::batch("MARI", 1, Vec::new());
        assert!(storage.create_run(run).await.is_err());
    }

    #[tokio::test]
    async fn test_filter_by_every_query_kind() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;

        // The batch covers 100-102, so it matches through any of its run numbers.
        assert_eq!(storage.count_runs(&filters_for("101")).await.unwrap(), 2);
        assert_eq!(storage.count_runs(&filters_for("103,104")).await.unwrap(), 2);
        assert_eq!(storage.count_runs(&filters_for("100-101")).await.unwrap(), 3);
        assert_eq!(
            storage.count_runs(&filters_for("100-100, 104-104")).await.unwrap(),
            3
        );
        assert_eq!(storage.count_runs(&filters_for("104-102")).await.unwrap(), 0);
        assert_eq!(storage.count_runs(&filters_for("999")).await.unwrap(), 0);

        let all = RunFilters::default().with_run_query(parse_run_query("101").unwrap());
        assert_eq!(storage.count_runs(&all).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_long_run_lists_stay_one_query() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;

        let list = (0..2000u64).map(|n| n.to_string()).collect::<Vec<_>>().join(",");
        let filters = RunFilters::default().with_run_query(parse_run_query(&list).unwrap());
        let request = PageRequest::new(PageSize::Ten, 1, 3);
        let page = storage
            .list_runs(&filters, RunOrder::RunNumberDesc, &request)
            .await
            .unwrap();
        assert_eq!(page.pagination.total_items, 7);

        // 1500 single-run ranges over even numbers: hits 100, 102 and 104.
        let ranges = (0..1500u64)
            .map(|n| format!("{0}-{0}", n * 2))
            .collect::<Vec<_>>()
            .join(",");
        let filters = filters_for(&ranges);
        assert_eq!(storage.count_runs(&filters).await.unwrap(), 4);

        let reversed = filters_for("104-100, 103-103");
        assert_eq!(storage.count_runs(&reversed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_runs_orders_and_paginates() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;

        let filters = RunFilters::for_instrument("MARI").batch(false);
        let request = PageRequest::new(PageSize::Ten, 1, 3);
        let page = storage
            .list_runs(&filters, RunOrder::RunNumberDesc, &request)
            .await
            .unwrap();
        let numbers: Vec<_> = page.records.iter().filter_map(|r| r.run_number()).collect();
        assert_eq!(numbers, vec![104, 103, 102, 101, 100]);
        assert_eq!(page.pagination.total_items, 5);
        assert_eq!(page.pagination.last_page, 1);

        // Requests past the end land on the last page.
        let request = PageRequest::new(PageSize::Ten, 9, 3);
        let page = storage
            .list_runs(&filters, RunOrder::CreatedAsc, &request)
            .await
            .unwrap();
        assert_eq!(page.pagination.current_page, 1);
        assert_eq!(page.records[0].run_number(), Some(100));
    }

    #[tokio::test]
    async fn test_description_search() {
        let (_dir, storage) = create_test_storage().await;
        storage
            .create_run(NewRun::new("MARI", 1, 1).with_description("Vanadium 50%"))
            .await
            .unwrap();
        storage
            .create_run(NewRun::new("MARI", 1, 2).with_description("sample"))
            .await
            .unwrap();

        let contains = RunFilters {
            description: Some(DescriptionMatch::new("vanadium", None)),
            ..Default::default()
        };
        assert_eq!(storage.count_runs(&contains).await.unwrap(), 1);

        let exact = RunFilters {
            description: Some(DescriptionMatch::new("Vanadium", Some("exact"))),
            ..Default::default()
        };
        assert_eq!(storage.count_runs(&exact).await.unwrap(), 0);

        let percent = RunFilters {
            description: Some(DescriptionMatch::new("0%", None)),
            ..Default::default()
        };
        assert_eq!(storage.count_runs(&percent).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_history_newest_version_first() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;
        storage
            .create_run(NewRun::new("MARI", 1234567, 102).with_version(1))
            .await
            .unwrap();

        let history = storage.run_history("MARI", 102).await.unwrap();
        let versions: Vec<_> = history.iter().map(|r| r.run_version).collect();
        assert_eq!(versions, vec![1, 0]);
        assert!(history.iter().all(|r| !r.is_batch()));

        assert!(storage.run_history("MARI", 999).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_batch_history() {
        let (_dir, storage) = create_test_storage().await;
        let runs = seed(&storage).await;
        let batch = &runs[5];
        let rerun = storage
            .create_run(NewRun::batch("MARI", 1234567, vec![102, 101, 100]).with_version(1))
            .await
            .unwrap();

        let history = storage.batch_run_history("MARI", batch.id).await.unwrap();
        let ids: Vec<_> = history.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![rerun.id, batch.id]);

        assert!(storage.batch_run_history("WISH", batch.id).await.is_err());
        assert!(storage.batch_run_history("MARI", runs[0].id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_queue_hides_runs() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;
        storage
            .create_run(NewRun::new("MARI", 1234567, 200).with_status(Status::Error))
            .await
            .unwrap();

        let request = PageRequest::default();
        assert_eq!(storage.failed_runs(&request).await.unwrap().records.len(), 1);

        storage.hide_failed_run("MARI", 200, 0).await.unwrap();
        assert!(storage.failed_runs(&request).await.unwrap().is_empty());

        assert!(
            storage
                .hide_failed_run("MARI", 200, 0)
                .await
                .unwrap_err()
                .is_not_found()
        );
        // Completed runs are not in the failed queue.
        assert!(storage.hide_failed_run("MARI", 100, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_hiding_stays_on_one_instrument() {
        let (_dir, storage) = create_test_storage().await;
        for instrument in ["MARI", "WISH"] {
            storage
                .create_run(NewRun::new(instrument, 1234567, 200).with_status(Status::Error))
                .await
                .unwrap();
        }

        storage.hide_failed_run("MARI", 200, 0).await.unwrap();

        let left = storage.failed_runs(&PageRequest::default()).await.unwrap();
        assert_eq!(left.records.len(), 1);
        assert_eq!(left.records[0].instrument, "WISH");
    }

    #[tokio::test]
    async fn test_ambiguous_hide_changes_nothing() {
        let (_dir, storage) = create_test_storage().await;
        storage
            .create_run(NewRun::new("MARI", 1234567, 200).with_status(Status::Error))
            .await
            .unwrap();
        storage
            .create_run(NewRun::batch("MARI", 1234567, vec![200, 201]).with_status(Status::Error))
            .await
            .unwrap();

        let err = storage.hide_failed_run("MARI", 200, 0).await.unwrap_err();
        assert!(matches!(err, StorageError::AmbiguousRun(_)));
        assert_eq!(
            storage
                .failed_runs(&PageRequest::default())
                .await
                .unwrap()
                .records
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_status_counts_and_edges() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;

        assert_eq!(
            storage.count_runs_with_status("MARI", Status::Completed).await.unwrap(),
            5
        );
        // Batch runs are left out of the per-instrument counts.
        assert_eq!(
            storage.count_runs_with_status("MARI", Status::Queued).await.unwrap(),
            0
        );

        let (first, last) = storage.first_and_last_run("MARI").await.unwrap();
        assert_eq!(first.unwrap().run_number(), Some(100));
        assert_eq!(last.unwrap().run_number(), Some(104));

        let (first, last) = storage.first_and_last_run("GEM").await.unwrap();
        assert!(first.is_none() && last.is_none());
    }

    #[tokio::test]
    async fn test_experiment_queries() {
        let (_dir, storage) = create_test_storage().await;
        seed(&storage).await;
        storage.create_experiment(1299999).await.unwrap();

        let experiments = storage.experiments_with_runs("MARI").await.unwrap();
        assert_eq!(experiments.len(), 1);
        assert_eq!(experiments[0].reference_number, 1234567);

        let page = storage
            .search_experiments(Some("12"), &PageRequest::default())
            .await
            .unwrap();
        let references: Vec<_> = page.records.iter().map(|e| e.reference_number).collect();
        assert_eq!(references, vec![1299999, 1234567]);

        let everything = storage
            .search_experiments(None, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(everything.pagination.total_items, 3);
    }

    #[tokio::test]
    async fn test_navigation_by_run_number() {
        let (_dir, storage) = create_test_storage().await;
        let runs = seed(&storage).await;

        let nav = storage.run_navigation(&runs[2], RunSort::Run).await.unwrap();
        assert_eq!(nav.next.unwrap().run_number, Some(103));
        assert_eq!(nav.previous.unwrap().run_number, Some(101));
        assert_eq!(nav.newest.unwrap().run_number, Some(104));
        assert_eq!(nav.oldest.unwrap().run_number, Some(100));

        let nav = storage.run_navigation(&runs[4], RunSort::Run).await.unwrap();
        assert!(nav.next.is_none());
        let nav = storage.run_navigation(&runs[0], RunSort::Run).await.unwrap();
        assert!(nav.previous.is_none());
    }

    #[tokio::test]
    async fn test_navigation_by_date_and_batch() {
        let (_dir, storage) = create_test_storage().await;
        let runs = seed(&storage).await;

        let nav = storage.run_navigation(&runs[1], RunSort::Date).await.unwrap();
        assert_eq!(nav.next.unwrap().run_number, Some(102));
        assert_eq!(nav.previous.unwrap().run_number, Some(100));

        // The only batch run has no neighbours but is its own newest and oldest.
        let batch = &runs[5];
        let nav = storage.run_navigation(batch, RunSort::Run).await.unwrap();
        assert!(nav.next.is_none());
        assert!(nav.previous.is_none());
        assert_eq!(nav.newest.unwrap().id, batch.id);
        assert_eq!(nav.oldest.unwrap().link, batch.link());
    }
}

//! Database connection and the simple record tables

use std::path::PathBuf;
use std::str::FromStr;

use rv_core::{Experiment, Instrument};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use tracing::{debug, info};

use crate::{Result, StorageError};

/// Embedded migrations for the reduce-viewer schema.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Main storage interface. Cheap to clone (shares the pool).
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Open (creating if needed) the database and run migrations.
    ///
    /// `None` uses the platform data directory.
    pub async fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(path) => path,
            None => default_db_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        MIGRATOR.run(&pool).await?;
        info!("Opened database at {}", path.display());

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ------------------------------------------------------------------
    // Instruments
    // ------------------------------------------------------------------

    /// Insert the instrument if it is new; return it either way.
    pub async fn create_instrument(&self, name: &str) -> Result<Instrument> {
        let mut tx = self.pool.begin().await?;
        let id = instrument_id(&mut tx, name).await?;
        tx.commit().await?;
        debug!("Instrument {} has id {}", name, id);
        self.get_instrument(name).await
    }

    pub async fn get_instrument(&self, name: &str) -> Result<Instrument> {
        let row =
            sqlx::query("SELECT id, name, is_active, is_paused FROM instruments WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => instrument_from_row(&row),
            None => Err(StorageError::InstrumentNotFound(name.to_string())),
        }
    }

    pub async fn list_instruments(&self) -> Result<Vec<Instrument>> {
        let rows =
            sqlx::query("SELECT id, name, is_active, is_paused FROM instruments ORDER BY name")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(instrument_from_row).collect()
    }

    pub async fn set_instrument_active(&self, name: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE instruments SET is_active = ? WHERE name = ?")
            .bind(is_active)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::InstrumentNotFound(name.to_string()));
        }
        Ok(())
    }

    pub async fn set_instrument_paused(&self, name: &str, is_paused: bool) -> Result<()> {
        let result = sqlx::query("UPDATE instruments SET is_paused = ? WHERE name = ?")
            .bind(is_paused)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::InstrumentNotFound(name.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Experiments
    // ------------------------------------------------------------------

    pub async fn create_experiment(&self, reference_number: u64) -> Result<Experiment> {
        let mut tx = self.pool.begin().await?;
        let id = experiment_id(&mut tx, reference_number).await?;
        tx.commit().await?;
        Ok(Experiment {
            id,
            reference_number,
        })
    }

    pub async fn get_experiment(&self, reference_number: u64) -> Result<Experiment> {
        let row =
            sqlx::query("SELECT id, reference_number FROM experiments WHERE reference_number = ?")
                .bind(to_db_number(reference_number))
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some(row) => experiment_from_row(&row),
            None => Err(StorageError::ExperimentNotFound(reference_number)),
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn create_user(&self, id: i64, first_name: &str, last_name: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, first_name, last_name) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET first_name = excluded.first_name, last_name = excluded.last_name",
        )
        .bind(id)
        .bind(first_name)
        .bind(last_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// "Forename Surname" for a user id, if the user exists
    pub async fn user_name(&self, id: i64) -> Result<Option<String>> {
        let row = sqlx::query("SELECT first_name, last_name FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            let first: String = row.try_get("first_name")?;
            let last: String = row.try_get("last_name")?;
            Ok(format!("{} {}", first, last))
        })
        .transpose()
    }
}

fn default_db_path() -> Result<PathBuf> {
    directories::ProjectDirs::from("uk", "reduce-viewer", "reduce-viewer")
        .map(|dirs| dirs.data_dir().join("reduce-viewer.db"))
        .ok_or_else(|| anyhow::anyhow!("Could not determine a data directory").into())
}

/// SQLite integers are signed; run and RB numbers never get near the limit.
pub(crate) fn to_db_number(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub(crate) fn from_db_number(table: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| StorageError::InvalidRow {
        table,
        reason: format!("negative number {}", value),
    })
}

pub(crate) async fn instrument_id(tx: &mut Transaction<'_, Sqlite>, name: &str) -> Result<i64> {
    sqlx::query("INSERT INTO instruments (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
        .bind(name)
        .execute(&mut **tx)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM instruments WHERE name = ?")
        .bind(name)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

pub(crate) async fn experiment_id(
    tx: &mut Transaction<'_, Sqlite>,
    reference_number: u64,
) -> Result<i64> {
    let reference = to_db_number(reference_number);
    sqlx::query(
        "INSERT INTO experiments (reference_number) VALUES (?) ON CONFLICT(reference_number) DO NOTHING",
    )
    .bind(reference)
    .execute(&mut **tx)
    .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM experiments WHERE reference_number = ?")
        .bind(reference)
        .fetch_one(&mut **tx)
        .await?;
    Ok(id)
}

fn instrument_from_row(row: &SqliteRow) -> Result<Instrument> {
    Ok(Instrument {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        is_paused: row.try_get("is_paused")?,
    })
}

pub(crate) fn experiment_from_row(row: &SqliteRow) -> Result<Experiment> {
    Ok(Experiment {
        id: row.try_get("id")?,
        reference_number: from_db_number("experiments", row.try_get("reference_number")?)?,
    })
}

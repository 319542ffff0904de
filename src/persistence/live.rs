//! [`LiveStateProvider`]: the read/write `StateProvider` used while a run is
//! in progress, backed by a SQLite pool via `sqlx`.

use super::{StateProvider, WritableStateProvider};
use crate::domain::{now_iso8601, Cents, RunId};
use crate::error::{Error, Result};
use crate::record::{EventRecord, ExperimentRecord};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Open a connection pool against `database_path`, creating the file and
/// applying every pending migration if needed.
pub async fn connect(database_path: &Path) -> Result<SqlitePool> {
    let url = format!("sqlite:{}", database_path.display());
    let options = SqliteConnectOptions::from_str(&url)
        .map_err(|e| Error::database(format!("invalid database path: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| Error::database(format!("failed to open database: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| Error::database(format!("migration failed: {e}")))?;

    Ok(pool)
}

/// Read/write `StateProvider` for a run currently executing. Every event
/// passed to `record_event` is buffered in memory and only becomes durable
/// (and visible to a concurrent `DatabaseStateProvider`) when the iteration
/// it belongs to is committed via `record_iteration` (§4.8 group commit).
pub struct LiveStateProvider {
    pool: SqlitePool,
    run_id: RunId,
    sequence: AtomicU64,
    pending: Mutex<Vec<EventRecord>>,
}

impl LiveStateProvider {
    /// Start a new run: inserts the `experiments` row and returns a
    /// provider ready to accept events and iterations.
    pub async fn start(pool: SqlitePool, record: &ExperimentRecord) -> Result<Self> {
        let run_id_str = record.run_id.to_string();
        let config_json = serde_json::to_string(&record.config_snapshot)?;
        sqlx::query(
            "INSERT INTO experiments (run_id, name, config_json, created_at, num_iterations, converged) \
             VALUES (?, ?, ?, ?, 0, 0)",
        )
        .bind(&run_id_str)
        .bind(&record.experiment_name)
        .bind(&config_json)
        .bind(&record.created_at)
        .execute(&pool)
        .await
        .map_err(|e| Error::database(format!("failed to insert experiment row: {e}")))?;

        Ok(Self {
            pool,
            run_id: record.run_id,
            sequence: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl StateProvider for LiveStateProvider {
    fn run_id(&self) -> RunId {
        self.run_id
    }

    async fn get_run_metadata(&self) -> Result<ExperimentRecord> {
        fetch_experiment(&self.pool, self.run_id).await
    }

    async fn get_total_iterations(&self) -> Result<u32> {
        fetch_total_iterations(&self.pool, self.run_id).await
    }

    async fn get_iteration_events(&self, iteration: u32) -> Result<Vec<EventRecord>> {
        fetch_iteration_events(&self.pool, self.run_id, iteration).await
    }

    async fn get_iteration_policies(&self, iteration: u32) -> Result<serde_json::Value> {
        fetch_iteration_column(&self.pool, self.run_id, iteration, "policies_json").await
    }

    async fn get_iteration_costs(&self, iteration: u32) -> Result<BTreeMap<String, Cents>> {
        let value = fetch_iteration_column(&self.pool, self.run_id, iteration, "costs_json").await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_iteration_accepted_changes(&self, iteration: u32) -> Result<serde_json::Value> {
        fetch_iteration_column(&self.pool, self.run_id, iteration, "accepted_json").await
    }

    async fn get_all_events(&self) -> Result<Vec<EventRecord>> {
        fetch_all_events(&self.pool, self.run_id).await
    }

    async fn get_final_result(&self) -> Result<ExperimentRecord> {
        fetch_experiment(&self.pool, self.run_id).await
    }
}

#[async_trait]
impl WritableStateProvider for LiveStateProvider {
    async fn record_event(
        &self,
        iteration: u32,
        event_type: &str,
        data: serde_json::Value,
    ) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = EventRecord::new(sequence, iteration, event_type, data);
        self.pending.lock().expect("pending events lock poisoned").push(event);
        Ok(())
    }

    async fn record_iteration(
        &self,
        iteration: u32,
        costs_per_agent: BTreeMap<String, Cents>,
        accepted_changes: serde_json::Value,
        policies: serde_json::Value,
    ) -> Result<()> {
        let batch = {
            let mut guard = self.pending.lock().expect("pending events lock poisoned");
            std::mem::take(&mut *guard)
        };

        let run_id_str = self.run_id.to_string();
        let costs_json = serde_json::to_string(&costs_per_agent)?;
        let accepted_json = serde_json::to_string(&accepted_changes)?;
        let policies_json = serde_json::to_string(&policies)?;
        let timestamp = now_iso8601();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::database(format!("failed to begin transaction: {e}")))?;

        sqlx::query(
            "INSERT INTO iterations (run_id, iteration, costs_json, accepted_json, policies_json, timestamp) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run_id_str)
        .bind(iteration as i64)
        .bind(&costs_json)
        .bind(&accepted_json)
        .bind(&policies_json)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| Error::database(format!("failed to insert iteration row: {e}")))?;

        for event in &batch {
            let data_json = serde_json::to_string(&event.event_data)?;
            sqlx::query(
                "INSERT INTO events (run_id, sequence, iteration, event_type, data_json, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&run_id_str)
            .bind(event.sequence as i64)
            .bind(event.iteration as i64)
            .bind(&event.event_type)
            .bind(&data_json)
            .bind(&event.timestamp)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database(format!("failed to insert event row: {e}")))?;
        }

        sqlx::query("UPDATE experiments SET num_iterations = ? WHERE run_id = ?")
            .bind((iteration + 1) as i64)
            .bind(&run_id_str)
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::database(format!("failed to update iteration count: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| Error::database(format!("failed to commit iteration: {e}")))?;

        Ok(())
    }

    async fn set_converged(&self, num_iterations: u32, reason: Option<String>) -> Result<()> {
        let run_id_str = self.run_id.to_string();
        sqlx::query(
            "UPDATE experiments SET completed_at = ?, num_iterations = ?, converged = 1, convergence_reason = ? \
             WHERE run_id = ?",
        )
        .bind(now_iso8601())
        .bind(num_iterations as i64)
        .bind(&reason)
        .bind(&run_id_str)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::database(format!("failed to finalize run: {e}")))?;
        Ok(())
    }
}

pub(super) async fn fetch_experiment(pool: &SqlitePool, run_id: RunId) -> Result<ExperimentRecord> {
    let run_id_str = run_id.to_string();
    let row = sqlx::query(
        "SELECT name, config_json, created_at, completed_at, num_iterations, converged, convergence_reason \
         FROM experiments WHERE run_id = ?",
    )
    .bind(&run_id_str)
    .fetch_one(pool)
    .await
    .map_err(|e| Error::database(format!("failed to fetch experiment row: {e}")))?;

    let config_json: String = row.try_get("config_json").map_err(|e| Error::database(e.to_string()))?;
    Ok(ExperimentRecord {
        run_id,
        experiment_name: row.try_get("name").map_err(|e| Error::database(e.to_string()))?,
        config_snapshot: serde_json::from_str(&config_json)?,
        created_at: row.try_get("created_at").map_err(|e| Error::database(e.to_string()))?,
        completed_at: row.try_get("completed_at").map_err(|e| Error::database(e.to_string()))?,
        num_iterations: row
            .try_get::<i64, _>("num_iterations")
            .map_err(|e| Error::database(e.to_string()))? as u32,
        converged: row.try_get::<i64, _>("converged").map_err(|e| Error::database(e.to_string()))? != 0,
        convergence_reason: row
            .try_get("convergence_reason")
            .map_err(|e| Error::database(e.to_string()))?,
    })
}

pub(super) async fn fetch_total_iterations(pool: &SqlitePool, run_id: RunId) -> Result<u32> {
    let run_id_str = run_id.to_string();
    let row = sqlx::query("SELECT COUNT(*) AS n FROM iterations WHERE run_id = ?")
        .bind(&run_id_str)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::database(format!("failed to count iterations: {e}")))?;
    let n: i64 = row.try_get("n").map_err(|e| Error::database(e.to_string()))?;
    Ok(n as u32)
}

pub(super) async fn fetch_iteration_column(
    pool: &SqlitePool,
    run_id: RunId,
    iteration: u32,
    column: &str,
) -> Result<serde_json::Value> {
    let run_id_str = run_id.to_string();
    let query = format!("SELECT {column} AS value FROM iterations WHERE run_id = ? AND iteration = ?");
    let row = sqlx::query(&query)
        .bind(&run_id_str)
        .bind(iteration as i64)
        .fetch_one(pool)
        .await
        .map_err(|e| Error::database(format!("failed to fetch iteration {iteration}: {e}")))?;
    let raw: String = row.try_get("value").map_err(|e| Error::database(e.to_string()))?;
    Ok(serde_json::from_str(&raw)?)
}

pub(super) async fn fetch_iteration_events(
    pool: &SqlitePool,
    run_id: RunId,
    iteration: u32,
) -> Result<Vec<EventRecord>> {
    let run_id_str = run_id.to_string();
    let rows = sqlx::query(
        "SELECT sequence, iteration, event_type, data_json, timestamp FROM events \
         WHERE run_id = ? AND iteration = ? ORDER BY sequence ASC",
    )
    .bind(&run_id_str)
    .bind(iteration as i64)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database(format!("failed to fetch events for iteration {iteration}: {e}")))?;
    rows_to_events(rows)
}

pub(super) async fn fetch_all_events(pool: &SqlitePool, run_id: RunId) -> Result<Vec<EventRecord>> {
    let run_id_str = run_id.to_string();
    let rows = sqlx::query(
        "SELECT sequence, iteration, event_type, data_json, timestamp FROM events \
         WHERE run_id = ? ORDER BY sequence ASC",
    )
    .bind(&run_id_str)
    .fetch_all(pool)
    .await
    .map_err(|e| Error::database(format!("failed to fetch events: {e}")))?;
    rows_to_events(rows)
}

fn rows_to_events(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<EventRecord>> {
    rows.into_iter()
        .map(|row| {
            let data_json: String = row.try_get("data_json").map_err(|e| Error::database(e.to_string()))?;
            Ok(EventRecord {
                sequence: row.try_get::<i64, _>("sequence").map_err(|e| Error::database(e.to_string()))? as u64,
                iteration: row.try_get::<i64, _>("iteration").map_err(|e| Error::database(e.to_string()))? as u32,
                event_type: row.try_get("event_type").map_err(|e| Error::database(e.to_string()))?,
                event_data: serde_json::from_str(&data_json)?,
                timestamp: row.try_get("timestamp").map_err(|e| Error::database(e.to_string()))?,
            })
        })
        .collect()
}

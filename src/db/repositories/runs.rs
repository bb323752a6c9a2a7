use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_optional_datetime, to_i64, to_u64},
    models::{Run, RunStop},
};

const RUN_COLUMNS: &str = "id, owner_id, start_time, end_time, duration_seconds, is_active";

fn row_to_run(row: &Row) -> Result<Run> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let duration_seconds: i64 = row.get("duration_seconds")?;

    Ok(Run {
        id: row.get("id")?,
        owner_id: row.get("owner_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_optional_datetime(end_time, "end_time")?,
        duration_seconds: to_u64(duration_seconds, "duration_seconds")?,
        is_active: row.get("is_active")?,
    })
}

impl Database {
    /// Inserts `run` under `run.id`, which the caller has already assigned.
    pub async fn insert_run(&self, run: &Run) -> Result<()> {
        let record = run.clone();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO runs (id, owner_id, start_time, end_time, duration_seconds, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.id,
                    record.owner_id,
                    record.start_time.to_rfc3339(),
                    record.end_time.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.duration_seconds)?,
                    record.is_active,
                    now,
                    now,
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Writes the stop patch. Returns `false` when no active run has that id,
    /// so a stopped run keeps its first end time and duration.
    pub async fn mark_run_stopped(&self, run_id: &str, stop: RunStop) -> Result<bool> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE runs
                 SET end_time = ?1,
                     duration_seconds = ?2,
                     is_active = 0,
                     updated_at = ?3
                 WHERE id = ?4 AND is_active = 1",
                params![
                    stop.end_time.to_rfc3339(),
                    to_i64(stop.duration_seconds)?,
                    Utc::now().to_rfc3339(),
                    run_id,
                ],
            )?;
            Ok(rows_affected > 0)
        })
        .await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"))?;
            let run = stmt
                .query_row(params![run_id], |row| Ok(row_to_run(row)))
                .optional()?
                .transpose()?;
            Ok(run)
        })
        .await
    }

    pub async fn get_active_run(&self, owner_id: &str) -> Result<Option<Run>> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM runs
                 WHERE owner_id = ?1 AND is_active = 1
                 LIMIT 1"
            ))?;

            let mut rows = stmt.query(params![owner_id])?;
            let run = match rows.next()? {
                Some(row) => Some(row_to_run(row)?),
                None => None,
            };
            Ok(run)
        })
        .await
    }

    /// Every run of one owner, in storage order. Callers sort.
    pub async fn list_runs_for_owner(&self, owner_id: &str) -> Result<Vec<Run>> {
        let owner_id = owner_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RUN_COLUMNS} FROM runs WHERE owner_id = ?1"
            ))?;

            let mut rows = stmt.query(params![owner_id])?;
            let mut runs = Vec::new();
            while let Some(row) = rows.next()? {
                runs.push(row_to_run(row)?);
            }
            Ok(runs)
        })
        .await
    }

    /// Returns `false` when the run was already gone.
    pub async fn delete_run(&self, run_id: &str) -> Result<bool> {
        let run_id = run_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute("DELETE FROM runs WHERE id = ?1", params![run_id])?;
            Ok(rows_affected > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn insert_get_and_stop_run() {
        let db = Database::open_in_memory().unwrap();
        let start = Utc::now();
        let run = Run::begin("owner-1", start).with_id("run-1");
        db.insert_run(&run).await.unwrap();

        let active = db.get_active_run("owner-1").await.unwrap();
        assert_eq!(active.as_ref().map(|r| r.id.as_str()), Some("run-1"));

        let stop = RunStop {
            end_time: start + Duration::seconds(90),
            duration_seconds: 90,
        };
        assert!(db.mark_run_stopped("run-1", stop).await.unwrap());

        let stored = db.get_run("run-1").await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.duration_seconds, 90);
        assert_eq!(stored.end_time, Some(stop.end_time));
        assert_eq!(stored.start_time, start);
        assert!(db.get_active_run("owner-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stopped_run_keeps_its_first_stop() {
        let db = Database::open_in_memory().unwrap();
        let start = Utc::now();
        db.insert_run(&Run::begin("owner-1", start).with_id("run-1"))
            .await
            .unwrap();

        let first = RunStop {
            end_time: start + Duration::seconds(10),
            duration_seconds: 10,
        };
        assert!(db.mark_run_stopped("run-1", first).await.unwrap());

        let late = RunStop {
            end_time: start + Duration::seconds(39),
            duration_seconds: 39,
        };
        assert!(!db.mark_run_stopped("run-1", late).await.unwrap());

        let stored = db.get_run("run-1").await.unwrap().unwrap();
        assert_eq!(stored.duration_seconds, 10);
        assert_eq!(stored.end_time, Some(first.end_time));
    }

    #[tokio::test]
    async fn second_active_run_for_owner_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_run(&Run::begin("owner-1", now).with_id("a"))
            .await
            .unwrap();
        let second = db
            .insert_run(&Run::begin("owner-1", now).with_id("b"))
            .await;
        assert!(second.is_err());

        db.insert_run(&Run::begin("owner-2", now).with_id("c"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_rows_report_false() {
        let db = Database::open_in_memory().unwrap();
        let stop = RunStop {
            end_time: Utc::now(),
            duration_seconds: 1,
        };
        assert!(!db.mark_run_stopped("nope", stop).await.unwrap());
        assert!(!db.delete_run("nope").await.unwrap());
        assert!(db.get_run("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_is_scoped_to_owner() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let mut finished = Run::begin("owner-1", now).with_id("a");
        finished.apply_stop(&RunStop {
            end_time: now,
            duration_seconds: 0,
        });
        db.insert_run(&finished).await.unwrap();
        db.insert_run(&Run::begin("owner-1", now).with_id("b"))
            .await
            .unwrap();
        db.insert_run(&Run::begin("owner-2", now).with_id("c"))
            .await
            .unwrap();

        let runs = db.list_runs_for_owner("owner-1").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.owner_id == "owner-1"));
    }
}

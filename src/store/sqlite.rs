use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{Database, Run, RunStop};

use super::{ChangeFeed, RunStore, RunSubscription, StoreError, StoreResult};

// Set to false to silence this module.
const ENABLE_LOGS: bool = true;

use crate::log_info;

/// [`RunStore`] backed by the embedded SQLite database.
#[derive(Clone)]
pub struct SqliteRunStore {
    db: Database,
    feed: ChangeFeed,
}

impl SqliteRunStore {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(),
        }
    }
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn create(&self, run: Run) -> StoreResult<String> {
        let run_id = Uuid::new_v4().to_string();
        let record = run.with_id(run_id.clone());
        self.db.insert_run(&record).await?;
        log_info!("Run {} created for {}", record.id, record.owner_id);
        self.feed.publish(&record.owner_id);
        Ok(run_id)
    }

    async fn update(&self, run_id: &str, stop: RunStop) -> StoreResult<()> {
        let run = self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        if !run.is_active || !self.db.mark_run_stopped(run_id, stop).await? {
            return Err(StoreError::AlreadyStopped(run_id.to_string()));
        }
        self.feed.publish(&run.owner_id);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> StoreResult<Option<Run>> {
        Ok(self.db.get_run(run_id).await?)
    }

    async fn delete(&self, run_id: &str) -> StoreResult<()> {
        let run = self
            .db
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;

        if self.db.delete_run(run_id).await? {
            log_info!("Run {run_id} deleted");
            self.feed.publish(&run.owner_id);
        }
        Ok(())
    }

    async fn find_active(&self, owner_id: &str) -> StoreResult<Option<Run>> {
        Ok(self.db.get_active_run(owner_id).await?)
    }

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Run>> {
        Ok(self.db.list_runs_for_owner(owner_id).await?)
    }

    fn subscribe(&self, owner_id: &str) -> RunSubscription {
        let db = self.db.clone();
        RunSubscription::spawn(owner_id.to_string(), &self.feed, move |owner| {
            let db = db.clone();
            async move { db.list_runs_for_owner(&owner).await.map_err(StoreError::from) }
        })
    }
}

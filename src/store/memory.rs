use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use uuid::Uuid;

use crate::db::{Run, RunStop};

use super::{ChangeFeed, RunStore, RunSubscription, StoreError, StoreResult};

#[derive(Default)]
struct MemoryInner {
    runs: HashMap<String, Run>,
    writes: usize,
    failure: Option<String>,
}

/// [`RunStore`] kept entirely in memory. Counts writes and can be told to
/// fail every call, which makes it the store of choice for exercising the
/// session controller.
#[derive(Clone, Default)]
pub struct MemoryRunStore {
    inner: Arc<Mutex<MemoryInner>>,
    feed: ChangeFeed,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn check_available(inner: &MemoryInner) -> StoreResult<()> {
        match &inner.failure {
            Some(message) => Err(StoreError::Backend(message.clone())),
            None => Ok(()),
        }
    }

    /// Places `run` as-is, bypassing write counting. Must carry an id.
    pub fn seed(&self, run: Run) {
        let owner = run.owner_id.clone();
        self.lock().runs.insert(run.id.clone(), run);
        self.feed.publish(&owner);
    }

    /// Makes every subsequent call fail with `message`; `None` heals the store.
    pub fn set_failure(&self, message: Option<&str>) {
        self.lock().failure = message.map(str::to_string);
    }

    /// Number of successful create, update and delete calls.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    pub fn snapshot(&self, run_id: &str) -> Option<Run> {
        self.lock().runs.get(run_id).cloned()
    }

    fn owner_runs(inner: &MemoryInner, owner_id: &str) -> Vec<Run> {
        inner
            .runs
            .values()
            .filter(|run| run.owner_id == owner_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn create(&self, run: Run) -> StoreResult<String> {
        let run_id = Uuid::new_v4().to_string();
        let owner = run.owner_id.clone();
        {
            let mut inner = self.lock();
            Self::check_available(&inner)?;
            if run.is_active
                && inner
                    .runs
                    .values()
                    .any(|existing| existing.owner_id == owner && existing.is_active)
            {
                return Err(StoreError::Backend(format!(
                    "owner {owner} already has an active run"
                )));
            }
            inner.runs.insert(run_id.clone(), run.with_id(run_id.clone()));
            inner.writes += 1;
        }
        self.feed.publish(&owner);
        Ok(run_id)
    }

    async fn update(&self, run_id: &str, stop: RunStop) -> StoreResult<()> {
        let owner = {
            let mut inner = self.lock();
            Self::check_available(&inner)?;
            let run = inner
                .runs
                .get_mut(run_id)
                .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
            if !run.is_active {
                return Err(StoreError::AlreadyStopped(run_id.to_string()));
            }
            run.apply_stop(&stop);
            let owner = run.owner_id.clone();
            inner.writes += 1;
            owner
        };
        self.feed.publish(&owner);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> StoreResult<Option<Run>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner.runs.get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> StoreResult<()> {
        let owner = {
            let mut inner = self.lock();
            Self::check_available(&inner)?;
            let run = inner
                .runs
                .remove(run_id)
                .ok_or_else(|| StoreError::NotFound(run_id.to_string()))?;
            inner.writes += 1;
            run.owner_id
        };
        self.feed.publish(&owner);
        Ok(())
    }

    async fn find_active(&self, owner_id: &str) -> StoreResult<Option<Run>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(inner
            .runs
            .values()
            .find(|run| run.owner_id == owner_id && run.is_active)
            .cloned())
    }

    async fn list_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Run>> {
        let inner = self.lock();
        Self::check_available(&inner)?;
        Ok(Self::owner_runs(&inner, owner_id))
    }

    fn subscribe(&self, owner_id: &str) -> RunSubscription {
        let store = self.clone();
        RunSubscription::spawn(owner_id.to_string(), &self.feed, move |owner| {
            let store = store.clone();
            async move { store.list_for_owner(&owner).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[tokio::test]
    async fn subscription_redelivers_full_set_on_change() {
        let store = MemoryRunStore::new();
        let mut subscription = store.subscribe("owner-1");

        let initial = subscription.next().await.unwrap().unwrap();
        assert!(initial.is_empty());

        let id = store
            .create(Run::begin("owner-1", Utc::now()))
            .await
            .unwrap();
        let after_create = subscription.next().await.unwrap().unwrap();
        assert_eq!(after_create.len(), 1);
        assert_eq!(after_create[0].id, id);

        store.delete(&id).await.unwrap();
        let after_delete = subscription.next().await.unwrap().unwrap();
        assert!(after_delete.is_empty());
    }

    #[tokio::test]
    async fn other_owners_changes_are_not_delivered() {
        let store = MemoryRunStore::new();
        let mut subscription = store.subscribe("owner-1");
        subscription.next().await.unwrap().unwrap();

        store
            .create(Run::begin("owner-2", Utc::now()))
            .await
            .unwrap();
        store
            .create(Run::begin("owner-1", Utc::now()))
            .await
            .unwrap();

        let delivery = subscription.next().await.unwrap().unwrap();
        assert_eq!(delivery.len(), 1);
        assert_eq!(delivery[0].owner_id, "owner-1");
    }

    #[tokio::test]
    async fn failing_store_rejects_calls_without_writing() {
        let store = MemoryRunStore::new();
        store.set_failure(Some("offline"));
        let err = store
            .create(Run::begin("owner-1", Utc::now()))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Backend("offline".into()));
        assert_eq!(store.write_count(), 0);

        store.set_failure(None);
        store
            .create(Run::begin("owner-1", Utc::now()))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn stopped_run_is_not_stopped_again() {
        let store = MemoryRunStore::new();
        let start = Utc::now();
        let id = store.create(Run::begin("owner-1", start)).await.unwrap();
        let first = RunStop {
            end_time: start + chrono::Duration::seconds(10),
            duration_seconds: 10,
        };
        store.update(&id, first).await.unwrap();

        let second = RunStop {
            end_time: start + chrono::Duration::seconds(39),
            duration_seconds: 39,
        };
        let err = store.update(&id, second).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyStopped(id.clone()));

        let run = store.snapshot(&id).unwrap();
        assert_eq!(run.duration_seconds, 10);
        assert_eq!(run.end_time, Some(first.end_time));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn closed_subscription_ends_stream() {
        let store = MemoryRunStore::new();
        let mut subscription = store.subscribe("owner-1");
        subscription.close();
        assert!(subscription.next().await.is_none());
    }
}

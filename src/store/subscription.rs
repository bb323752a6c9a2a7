use std::future::Future;

use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use crate::db::Run;

use super::StoreResult;

// Set to false to silence this module.
const ENABLE_LOGS: bool = true;

use crate::log_debug;

const FEED_CAPACITY: usize = 64;
const DELIVERY_BUFFER: usize = 16;

/// Change notifications keyed by owner id. Stores publish after every
/// successful write; subscriptions listen for their owner.
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<String>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, owner_id: &str) {
        // No receivers simply means nobody is watching.
        let _ = self.sender.send(owner_id.to_string());
    }

    fn listen(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

/// A live, cancellable stream of full run sets for one owner.
pub struct RunSubscription {
    deliveries: mpsc::Receiver<StoreResult<Vec<Run>>>,
    cancel_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RunSubscription {
    /// Spawns the forwarding task. `load` fetches the owner's current set and
    /// runs once up front and once per relevant change notification.
    pub fn spawn<F, Fut>(owner: String, feed: &ChangeFeed, load: F) -> Self
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<Vec<Run>>> + Send + 'static,
    {
        // Listen before the initial load so no change slips between them.
        let mut changes = feed.listen();
        let (tx, deliveries) = mpsc::channel(DELIVERY_BUFFER);
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            if tx.send(load(owner.clone()).await).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    change = changes.recv() => {
                        match change {
                            Ok(changed_owner) if changed_owner != owner => continue,
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                log_debug!("run feed for {owner} lagged by {skipped}; reloading");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        }

                        if tx.send(load(owner.clone()).await).await.is_err() {
                            break;
                        }
                    }
                }
            }

            log_debug!("run subscription for {owner} released");
        });

        Self {
            deliveries,
            cancel_token,
            handle: Some(handle),
        }
    }

    /// Next full delivery. `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<StoreResult<Vec<Run>>> {
        self.deliveries.recv().await
    }

    pub fn close(&mut self) {
        self.cancel_token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.deliveries.close();
    }
}

impl Drop for RunSubscription {
    fn drop(&mut self) {
        self.close();
    }
}

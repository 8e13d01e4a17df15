//! Polling refresh driver.
//!
//! Long-lived views (build queue, activity log) keep a local copy of remote
//! state fresh by re-fetching on a fixed interval. The store goes
//! `unresolved -> pending -> ready`, then cycles `ready -> refreshing ->
//! ready`; a failed fetch moves it to `errored` but never discards the last
//! good value, so a consumer sees stale data instead of a flash-to-empty.
//!
//! All mutation happens inside one owner task (single-writer); consumers get
//! read-only snapshots through a watch channel. Dropping or stopping the
//! store cancels the task, so no orphaned timer keeps fetching.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Lifecycle of one polled resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Unresolved,
    Pending,
    Ready,
    Refreshing,
    Errored,
}

/// Snapshot of a polled resource: its state and the last good value.
#[derive(Debug, Clone)]
pub struct StoreResource<T> {
    pub state: ResourceState,
    pub value: Option<T>,
}

impl<T> StoreResource<T> {
    fn unresolved() -> Self {
        Self {
            state: ResourceState::Unresolved,
            value: None,
        }
    }
}

/// Something with a stable identity key, usable for snapshot reconciliation.
pub trait Keyed {
    type Key: Eq;

    fn key(&self) -> Self::Key;

    /// Fold a refreshed copy of the same entry into this one. The default
    /// takes the remote copy wholesale; types carrying local-only state
    /// override this to keep it across refreshes.
    fn absorb(&mut self, next: Self)
    where
        Self: Sized,
    {
        *self = next;
    }
}

impl Keyed for String {
    type Key = String;

    fn key(&self) -> String {
        self.clone()
    }
}

impl Keyed for crate::queue::ScheduledBuild {
    type Key = uuid::Uuid;

    fn key(&self) -> uuid::Uuid {
        self.id
    }
}

/// Merge a freshly fetched snapshot into the current value.
pub trait Merge: Sized {
    fn merge(prev: Option<Self>, next: Self) -> Self;
}

/// Snapshot merge for collections: match entries by identity key instead of
/// position. The incoming snapshot decides membership and order; an entry
/// present in both survives as the same local entry with the remote copy
/// absorbed into it, so any local-only state it carries is preserved.
pub fn reconcile_by_key<T: Keyed>(current: Vec<T>, incoming: Vec<T>) -> Vec<T> {
    let mut previous: Vec<Option<T>> = current.into_iter().map(Some).collect();

    incoming
        .into_iter()
        .map(|next| {
            let matched = previous
                .iter_mut()
                .find(|p| p.as_ref().is_some_and(|p| p.key() == next.key()))
                .and_then(Option::take);
            match matched {
                Some(mut entry) => {
                    entry.absorb(next);
                    entry
                }
                None => next,
            }
        })
        .collect()
}

impl<T: Keyed> Merge for Vec<T> {
    fn merge(prev: Option<Self>, next: Self) -> Self {
        reconcile_by_key(prev.unwrap_or_default(), next)
    }
}

/// One remote fetch operation, run once per tick.
#[async_trait::async_trait]
pub trait Fetch: Send + Sync + 'static {
    type Item: Merge + Clone + Send + Sync + 'static;

    async fn fetch(&self) -> Result<Self::Item>;
}

/// A self-refreshing store around a [`Fetch`] implementation.
pub struct PollingStore<T> {
    rx: watch::Receiver<StoreResource<T>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<T: Merge + Clone + Send + Sync + 'static> PollingStore<T> {
    /// Spawn the owner task: an immediate first fetch, then one per interval.
    pub fn spawn<F: Fetch<Item = T>>(fetcher: F, every: Duration) -> Self {
        let (tx, rx) = watch::channel(StoreResource::unresolved());
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // If a fetch overruns the interval, skip the missed ticks rather
            // than firing a burst of overlapping refreshes.
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {}
                }

                tx.send_modify(|store| {
                    store.state = if store.value.is_some() {
                        ResourceState::Refreshing
                    } else {
                        ResourceState::Pending
                    };
                });

                match fetcher.fetch().await {
                    Ok(next) => {
                        tx.send_modify(|store| {
                            let prev = store.value.take();
                            store.value = Some(T::merge(prev, next));
                            store.state = ResourceState::Ready;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Poll fetch failed; keeping last value");
                        tx.send_modify(|store| {
                            store.state = ResourceState::Errored;
                        });
                    }
                }
            }
        });

        Self {
            rx,
            cancel,
            task: Some(task),
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> StoreResource<T> {
        self.rx.borrow().clone()
    }

    /// A receiver that observes every store update.
    pub fn subscribe(&self) -> watch::Receiver<StoreResource<T>> {
        self.rx.clone()
    }

    /// Stop polling and wait for the owner task to finish.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<T> Drop for PollingStore<T> {
    fn drop(&mut self) {
        // View teardown must not leave an orphaned timer fetching.
        self.cancel.cancel();
    }
}

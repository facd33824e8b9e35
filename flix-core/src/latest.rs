//! Latest-wins key resolution.
//!
//! Every submitted key bumps a generation counter; a result is delivered only
//! if it was fetched for the generation that is still current. Order is by
//! when keys were submitted, not by when their fetches finish.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{FetchError, GateError};
use crate::fetcher::DataFetcher;
use crate::models::Item;

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T = Vec<Item>> {
    /// A fetch for `key` is under way; earlier results are no longer current.
    Loading { key: String },
    Ready { key: String, value: T },
}

impl<T> Resolution<T> {
    pub fn key(&self) -> &str {
        match self {
            Resolution::Loading { key } | Resolution::Ready { key, .. } => key,
        }
    }
}

/// Stamp identifying which submission a fetch belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTicket {
    pub key: String,
    generation: u64,
}

#[derive(Debug, Default)]
pub struct KeyTracker {
    generation: u64,
}

impl KeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `key` as the most recent one.
    pub fn issue(&mut self, key: impl Into<String>) -> KeyTicket {
        self.generation += 1;
        KeyTicket {
            key: key.into(),
            generation: self.generation,
        }
    }

    pub fn is_current(&self, ticket: &KeyTicket) -> bool {
        ticket.generation == self.generation
    }
}

pub struct LatestWinsHandle<T = Vec<Item>> {
    keys: mpsc::Sender<String>,
    latest: watch::Receiver<Option<Resolution<T>>>,
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl<T: Clone> LatestWinsHandle<T> {
    pub async fn submit(&self, key: impl Into<String>) -> Result<(), GateError> {
        self.keys
            .send(key.into())
            .await
            .map_err(|_| GateError::Stopped)
    }

    /// Most recent delivery, if any.
    pub fn latest(&self) -> Option<Resolution<T>> {
        self.latest.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Resolution<T>>> {
        self.latest.clone()
    }

    pub async fn stop(self) -> Result<(), GateError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(GateError::from)
    }
}

/// Records `delivery` as the latest and forwards it without waiting on the
/// consumer. A full channel drops the delivery; `latest()` still has it.
fn deliver<T: Clone>(
    results: &mpsc::Sender<Resolution<T>>,
    latest: &watch::Sender<Option<Resolution<T>>>,
    delivery: Resolution<T>,
) {
    latest.send_replace(Some(delivery.clone()));
    match results.try_send(delivery) {
        Ok(()) => {}
        Err(TrySendError::Full(delivery)) => {
            warn!(key = %delivery.key(), "resolution channel full, delivery dropped");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("resolution receiver dropped");
        }
    }
}

/// Spawns a resolver that turns submitted search keys into item lists via
/// [`DataFetcher::fetch_by_key`].
pub fn spawn_latest_wins(
    fetcher: Arc<dyn DataFetcher>,
    results: mpsc::Sender<Resolution>,
) -> LatestWinsHandle {
    spawn_latest_wins_with(
        move |key: String| {
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch_by_key(&key).await }
        },
        results,
    )
}

/// Spawns a resolver that turns submitted keys into deliveries on `results`,
/// calling `resolve` for each non-empty key.
///
/// An empty key resolves to `T::default()` without calling `resolve`.
/// Superseded fetches keep running but their output is dropped.
pub fn spawn_latest_wins_with<T, F, Fut>(
    resolve: F,
    results: mpsc::Sender<Resolution<T>>,
) -> LatestWinsHandle<T>
where
    T: Clone + Default + Send + Sync + 'static,
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, FetchError>> + Send + 'static,
{
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let (key_tx, mut key_rx) = mpsc::channel::<String>(32);
    let (done_tx, mut done_rx) = mpsc::channel::<(KeyTicket, Result<T, FetchError>)>(8);
    let (latest_tx, latest_rx) = watch::channel(None);

    let join = tokio::spawn(async move {
        info!("latest-wins resolver started");
        let mut tracker = KeyTracker::new();
        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("latest-wins resolver shutdown requested");
                    break;
                }
                key = key_rx.recv() => {
                    let Some(key) = key else {
                        debug!("latest-wins handle dropped");
                        break;
                    };
                    let ticket = tracker.issue(key);
                    let delivery = if ticket.key.is_empty() {
                        Resolution::Ready { key: ticket.key, value: T::default() }
                    } else {
                        debug!(key = %ticket.key, "resolving key");
                        let key = ticket.key.clone();
                        let pending = resolve(key.clone());
                        let done_tx = done_tx.clone();
                        tokio::spawn(async move {
                            let result = pending.await;
                            let _ = done_tx.send((ticket, result)).await;
                        });
                        Resolution::Loading { key }
                    };
                    deliver(&results, &latest_tx, delivery);
                }
                Some((ticket, result)) = done_rx.recv() => {
                    if !tracker.is_current(&ticket) {
                        debug!(key = %ticket.key, "discarding result for superseded key");
                        continue;
                    }
                    match result {
                        Ok(value) => {
                            deliver(&results, &latest_tx, Resolution::Ready { key: ticket.key, value });
                        }
                        Err(error) => {
                            warn!(key = %ticket.key, error = %error, "key resolution failed");
                        }
                    }
                }
            }
        }
    });

    LatestWinsHandle {
        keys: key_tx,
        latest: latest_rx,
        cancel_tx,
        join,
    }
}

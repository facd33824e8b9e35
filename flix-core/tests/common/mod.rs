#![allow(dead_code)]

use std::time::Duration;

use async_trait::async_trait;
use flix_core::{DataFetcher, FetchError, Item, ListKey};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Page { key: ListKey, page: u32 },
    ByKey(String),
    Toggle,
}

/// A call waiting for the test to decide its outcome.
pub struct PendingCall<T> {
    pub call: Call,
    reply: oneshot::Sender<Result<T, FetchError>>,
}

impl<T> PendingCall<T> {
    pub fn resolve(self, value: T) {
        let _ = self.reply.send(Ok(value));
    }

    pub fn fail(self, message: &str) {
        let _ = self.reply.send(Err(FetchError::Unavailable(message.to_owned())));
    }
}

/// Every call blocks until the test answers it through the matching receiver.
pub struct ScriptedFetcher {
    items: mpsc::UnboundedSender<PendingCall<Vec<Item>>>,
    toggles: mpsc::UnboundedSender<PendingCall<()>>,
}

pub struct Script {
    pub items: mpsc::UnboundedReceiver<PendingCall<Vec<Item>>>,
    pub toggles: mpsc::UnboundedReceiver<PendingCall<()>>,
}

impl Script {
    pub async fn next_item_call(&mut self) -> PendingCall<Vec<Item>> {
        tokio::time::timeout(Duration::from_secs(2), self.items.recv())
            .await
            .expect("timed out waiting for a fetch")
            .expect("fetcher dropped")
    }

    pub async fn next_toggle_call(&mut self) -> PendingCall<()> {
        tokio::time::timeout(Duration::from_secs(2), self.toggles.recv())
            .await
            .expect("timed out waiting for a toggle round trip")
            .expect("fetcher dropped")
    }

    /// Asserts that no further fetch was issued after letting spawned tasks run.
    pub async fn assert_no_item_call(&mut self) {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(self.items.try_recv().is_err(), "unexpected fetch issued");
    }
}

pub fn scripted() -> (ScriptedFetcher, Script) {
    let (items_tx, items_rx) = mpsc::unbounded_channel();
    let (toggles_tx, toggles_rx) = mpsc::unbounded_channel();
    (
        ScriptedFetcher {
            items: items_tx,
            toggles: toggles_tx,
        },
        Script {
            items: items_rx,
            toggles: toggles_rx,
        },
    )
}

impl ScriptedFetcher {
    async fn ask<T>(
        sender: &mpsc::UnboundedSender<PendingCall<T>>,
        call: Call,
    ) -> Result<T, FetchError> {
        let (reply, answer) = oneshot::channel();
        sender
            .send(PendingCall { call, reply })
            .map_err(|_| FetchError::Unavailable("script closed".into()))?;
        answer
            .await
            .unwrap_or_else(|_| Err(FetchError::Unavailable("call abandoned".into())))
    }
}

#[async_trait]
impl DataFetcher for ScriptedFetcher {
    async fn fetch_page(&self, key: &ListKey, page: u32) -> Result<Vec<Item>, FetchError> {
        Self::ask(&self.items, Call::Page { key: key.clone(), page }).await
    }

    async fn fetch_by_key(&self, key: &str) -> Result<Vec<Item>, FetchError> {
        Self::ask(&self.items, Call::ByKey(key.to_owned())).await
    }

    async fn perform_toggle_round_trip(&self) -> Result<(), FetchError> {
        Self::ask(&self.toggles, Call::Toggle).await
    }
}

pub fn movies(prefix: &str, ids: std::ops::Range<i64>) -> Vec<Item> {
    ids.map(|id| Item::new(id, format!("{prefix} {id}"))).collect()
}

pub fn category(name: &str) -> ListKey {
    ListKey::Category(name.to_owned())
}

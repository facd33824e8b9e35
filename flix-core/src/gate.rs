//! Exhaust-style pagination.
//!
//! [`Paginator`] is the state machine: it hands out at most one
//! [`PageTicket`] at a time for the current key and only applies a
//! completion whose ticket still matches. [`spawn_request_gate`] drives it
//! from trigger signals and commands on a background task.

use std::sync::Arc;

use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::accumulator::accumulate;
use crate::error::{FetchError, GateError};
use crate::fetcher::DataFetcher;
use crate::models::{AggregateList, ListKey, ListStatus, Page};

/// Permission to fetch one page, bound to the key generation it was issued in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub key: ListKey,
    pub page: u32,
    generation: u64,
}

#[derive(Debug)]
pub enum Completion {
    Appended { page: u32, added: usize },
    Failed { page: u32, error: FetchError },
    /// The key changed since the ticket was issued; nothing was applied.
    Stale,
}

#[derive(Debug, Clone)]
pub struct Paginator {
    list: AggregateList,
    generation: u64,
}

impl Paginator {
    /// Starts on `key` with the page-1 fetch already claimed.
    pub fn start(key: ListKey) -> (Self, PageTicket) {
        let mut paginator = Self {
            list: AggregateList::new(key.clone()),
            generation: 0,
        };
        let ticket = paginator.establish(key);
        (paginator, ticket)
    }

    pub fn list(&self) -> &AggregateList {
        &self.list
    }

    /// Resets to an empty list for `key` and claims page 1. Any ticket issued
    /// before this call becomes stale.
    pub fn establish(&mut self, key: ListKey) -> PageTicket {
        self.generation += 1;
        self.list = AggregateList::new(key);
        self.list.status = ListStatus::Fetching;
        self.ticket(1)
    }

    /// Claims the next page, or `None` while a fetch is outstanding.
    pub fn trigger(&mut self) -> Option<PageTicket> {
        if self.list.is_fetching() {
            return None;
        }
        self.list.status = ListStatus::Fetching;
        Some(self.ticket(self.list.page_number + 1))
    }

    pub fn complete(
        &mut self,
        ticket: &PageTicket,
        result: Result<Page, FetchError>,
    ) -> Completion {
        if ticket.generation != self.generation {
            return Completion::Stale;
        }
        self.list.status = ListStatus::Idle;
        match result {
            Ok(page) => {
                let added = page.items.len();
                let existing = std::mem::take(&mut self.list.items);
                self.list.items = accumulate(existing, page.items);
                self.list.page_number = page.page_number;
                Completion::Appended {
                    page: page.page_number,
                    added,
                }
            }
            Err(error) => Completion::Failed {
                page: ticket.page,
                error,
            },
        }
    }

    fn ticket(&self, page: u32) -> PageTicket {
        PageTicket {
            key: self.list.key.clone(),
            page,
            generation: self.generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Issued { page: u32 },
    Dropped,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    PageLoaded { key: ListKey, page: u32, added: usize },
    PageFailed { key: ListKey, page: u32, error: String },
}

pub type TriggerSignals = BoxStream<'static, ()>;

enum Command {
    Trigger(oneshot::Sender<TriggerOutcome>),
    SetKey(ListKey, oneshot::Sender<()>),
}

pub struct RequestGateHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<AggregateList>,
    cancel_tx: broadcast::Sender<()>,
    join: JoinHandle<()>,
}

impl RequestGateHandle {
    pub async fn trigger(&self) -> Result<TriggerOutcome, GateError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Command::Trigger(reply))
            .await
            .map_err(|_| GateError::Stopped)?;
        outcome.await.map_err(|_| GateError::Stopped)
    }

    /// Switches to `key`. Returns once the list has been reset and the
    /// page-1 fetch for the new key issued.
    pub async fn set_key(&self, key: ListKey) -> Result<(), GateError> {
        let (reply, applied) = oneshot::channel();
        self.commands
            .send(Command::SetKey(key, reply))
            .await
            .map_err(|_| GateError::Stopped)?;
        applied.await.map_err(|_| GateError::Stopped)
    }

    pub fn snapshot(&self) -> AggregateList {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AggregateList> {
        self.state.clone()
    }

    pub async fn stop(self) -> Result<(), GateError> {
        let _ = self.cancel_tx.send(());
        self.join.await.map_err(GateError::from)
    }
}

/// Spawns the pagination controller for `key`.
///
/// Page 1 is requested immediately. Every trigger, whether from `triggers`
/// or [`RequestGateHandle::trigger`], requests the next page unless one is
/// already in flight, in which case it is dropped.
///
/// `events` is written with `try_send`; an undrained channel loses events
/// but never stalls the gate.
pub fn spawn_request_gate(
    fetcher: Arc<dyn DataFetcher>,
    key: ListKey,
    triggers: Option<TriggerSignals>,
    events: mpsc::Sender<GateEvent>,
) -> RequestGateHandle {
    let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
    let (command_tx, mut command_rx) = mpsc::channel(32);
    let (done_tx, mut done_rx) = mpsc::channel(8);

    let (mut paginator, first) = Paginator::start(key);
    let (state_tx, state_rx) = watch::channel(paginator.list().clone());

    let join = tokio::spawn(async move {
        info!(key = %first.key, "request gate started");
        issue(&fetcher, &done_tx, first);

        let mut triggers = triggers;
        loop {
            tokio::select! {
                _ = cancel_rx.recv() => {
                    info!("request gate shutdown requested");
                    break;
                }
                command = command_rx.recv() => {
                    let Some(command) = command else {
                        debug!("request gate handle dropped");
                        break;
                    };
                    // State is published before the reply.
                    match command {
                        Command::Trigger(reply) => {
                            let outcome = on_trigger(&mut paginator, &fetcher, &done_tx);
                            state_tx.send_replace(paginator.list().clone());
                            let _ = reply.send(outcome);
                        }
                        Command::SetKey(key, reply) => {
                            info!(key = %key, "list key changed");
                            let ticket = paginator.establish(key);
                            issue(&fetcher, &done_tx, ticket);
                            state_tx.send_replace(paginator.list().clone());
                            let _ = reply.send(());
                        }
                    }
                }
                signal = next_signal(&mut triggers) => {
                    match signal {
                        Some(()) => {
                            on_trigger(&mut paginator, &fetcher, &done_tx);
                            state_tx.send_replace(paginator.list().clone());
                        }
                        None => {
                            debug!("trigger stream ended");
                            triggers = None;
                        }
                    }
                }
                Some((ticket, result)) = done_rx.recv() => {
                    let event = match paginator.complete(&ticket, result) {
                        Completion::Appended { page, added } => {
                            debug!(key = %ticket.key, page, added, "page appended");
                            Some(GateEvent::PageLoaded { key: ticket.key, page, added })
                        }
                        Completion::Failed { page, error } => {
                            warn!(key = %ticket.key, page, error = %error, "page fetch failed");
                            Some(GateEvent::PageFailed { key: ticket.key, page, error: error.to_string() })
                        }
                        Completion::Stale => {
                            debug!(key = %ticket.key, page = ticket.page, "discarding result for superseded key");
                            None
                        }
                    };
                    state_tx.send_replace(paginator.list().clone());
                    if let Some(event) = event {
                        publish(&events, event);
                    }
                }
            }
        }
    });

    RequestGateHandle {
        commands: command_tx,
        state: state_rx,
        cancel_tx,
        join,
    }
}

type Done = (PageTicket, Result<Page, FetchError>);

/// Never waits on the consumer: a full channel loses the event, the list
/// itself stays available through the watch channel.
fn publish(events: &mpsc::Sender<GateEvent>, event: GateEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!(?event, "gate event channel full, event dropped");
        }
        Err(TrySendError::Closed(_)) => {
            debug!("gate event receiver dropped");
        }
    }
}

fn on_trigger(
    paginator: &mut Paginator,
    fetcher: &Arc<dyn DataFetcher>,
    done_tx: &mpsc::Sender<Done>,
) -> TriggerOutcome {
    match paginator.trigger() {
        Some(ticket) => {
            let page = ticket.page;
            issue(fetcher, done_tx, ticket);
            TriggerOutcome::Issued { page }
        }
        None => {
            debug!("trigger dropped while fetching");
            TriggerOutcome::Dropped
        }
    }
}

fn issue(fetcher: &Arc<dyn DataFetcher>, done_tx: &mpsc::Sender<Done>, ticket: PageTicket) {
    debug!(key = %ticket.key, page = ticket.page, "requesting page");
    let fetcher = Arc::clone(fetcher);
    let done_tx = done_tx.clone();
    tokio::spawn(async move {
        let result = fetcher
            .fetch_page(&ticket.key, ticket.page)
            .await
            .map(|items| Page {
                items,
                page_number: ticket.page,
            });
        // The gate may have stopped meanwhile; nobody needs the result then.
        let _ = done_tx.send((ticket, result)).await;
    });
}

async fn next_signal(triggers: &mut Option<TriggerSignals>) -> Option<()> {
    match triggers {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

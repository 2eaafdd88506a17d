//! In-memory backend double for tests.
//!
//! [`MockBackend`] implements all three backend traits without touching a
//! node: call results are scripted, transactions are recorded, historical
//! logs are served from a seeded store, and live feeds are driven by
//! [`MockBackend::emit`] / [`MockBackend::fail_feeds`]. Unsubscribes are
//! counted so tests can assert release-exactly-once behavior.

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use alloy::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::{
    backend::{LogBackend, ReadBackend, Subscription, WriteBackend},
    error::BindError,
    types::{CallOptions, LogFilter, LogRecord, TransactOptions, TxHandle},
};

/// Capacity of a mock live feed; large enough that tests never block on it.
const FEED_CHANNEL_SIZE: usize = 64;

#[derive(Default)]
pub struct MockBackend {
    call_results: Mutex<VecDeque<Result<Bytes, BindError>>>,
    call_requests: Mutex<Vec<(Address, Bytes)>>,
    transactions: Mutex<Vec<(Address, Bytes, TransactOptions)>>,
    history: Mutex<Vec<LogRecord>>,
    feeds: Arc<DashMap<u64, Feed>>,
    next_feed: AtomicU64,
    next_tx: AtomicU64,
    unsubscribed: Arc<AtomicUsize>,
}

struct Feed {
    filter: LogFilter,
    logs: mpsc::Sender<LogRecord>,
    errors: mpsc::Sender<BindError>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues the result of the next read call.
    pub fn push_call_result(&self, result: Result<Bytes, BindError>) {
        self.call_results.lock().unwrap().push_back(result);
    }

    /// Seeds the historical log store served by `filter_logs`.
    pub fn set_history(&self, records: Vec<LogRecord>) {
        *self.history.lock().unwrap() = records;
    }

    /// Read calls observed so far, in order.
    pub fn call_requests(&self) -> Vec<(Address, Bytes)> {
        self.call_requests.lock().unwrap().clone()
    }

    /// Transactions accepted so far, in order.
    pub fn transactions(&self) -> Vec<(Address, Bytes, TransactOptions)> {
        self.transactions.lock().unwrap().clone()
    }

    /// How many subscriptions have been released.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    pub fn open_feed_count(&self) -> usize {
        self.feeds.len()
    }

    /// Publishes a record to every open feed whose filter matches it.
    pub async fn emit(&self, record: LogRecord) {
        let targets: Vec<(u64, mpsc::Sender<LogRecord>)> = self
            .feeds
            .iter()
            .filter(|feed| feed.filter.matches(&record))
            .map(|feed| (*feed.key(), feed.logs.clone()))
            .collect();
        for (id, sender) in targets {
            if sender.send(record.clone()).await.is_err() {
                self.feeds.remove(&id);
            }
        }
    }

    /// Terminates every open feed abnormally with the given reason.
    pub async fn fail_feeds(&self, reason: &str) {
        let targets: Vec<mpsc::Sender<BindError>> = self
            .feeds
            .iter()
            .map(|feed| feed.errors.clone())
            .collect();
        for sender in targets {
            let _ = sender.send(BindError::Subscription(reason.to_string())).await;
        }
    }

    /// Closes every open feed cleanly (no error reported).
    pub fn close_feeds(&self) {
        self.feeds.clear();
    }
}

#[async_trait]
impl ReadBackend for MockBackend {
    async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        _opts: CallOptions,
    ) -> Result<Bytes, BindError> {
        self.call_requests.lock().unwrap().push((to, data));
        self.call_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BindError::Remote("no scripted call result".into())))
    }
}

#[async_trait]
impl WriteBackend for MockBackend {
    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        opts: TransactOptions,
    ) -> Result<TxHandle, BindError> {
        self.transactions.lock().unwrap().push((to, data, opts));
        let n = self.next_tx.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TxHandle::new(B256::from(U256::from(n))))
    }
}

#[async_trait]
impl LogBackend for MockBackend {
    async fn filter_logs(&self, filter: LogFilter) -> Result<Vec<LogRecord>, BindError> {
        let from = filter.from_block.unwrap_or_default();
        Ok(self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|record| {
                record.block_number >= from
                    && filter.to_block.is_none_or(|to| record.block_number <= to)
                    && filter.matches(record)
            })
            .cloned()
            .collect())
    }

    async fn subscribe_logs(
        &self,
        filter: LogFilter,
    ) -> Result<(mpsc::Receiver<LogRecord>, Subscription), BindError> {
        let (log_tx, log_rx) = mpsc::channel(FEED_CHANNEL_SIZE);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (unsub_tx, unsub_rx) = oneshot::channel();

        let id = self.next_feed.fetch_add(1, Ordering::SeqCst);
        self.feeds.insert(
            id,
            Feed {
                filter,
                logs: log_tx,
                errors: err_tx,
            },
        );

        // Sent or dropped, either way the subscription was released once.
        // Removing the feed drops its senders, ending the live channel the
        // way a real backend tears its feed down.
        let feeds = self.feeds.clone();
        let unsubscribed = self.unsubscribed.clone();
        tokio::spawn(async move {
            let _ = unsub_rx.await;
            feeds.remove(&id);
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        });

        Ok((log_rx, Subscription::new(err_rx, unsub_tx)))
    }
}

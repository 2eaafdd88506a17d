//! Backend contracts the binding runtime dispatches to.
//!
//! The runtime owns none of the transport: reads, writes, and log access are
//! behind object-safe async traits so a [`crate::contract::BoundContract`]
//! can hold any combination of them. [`crate::rpc::RpcBackend`] implements
//! all three against an alloy provider; [`crate::testing::MockBackend`] is
//! the in-memory double.

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::{
    error::BindError,
    types::{CallOptions, LogFilter, LogRecord, TransactOptions, TxHandle},
};

/// Read-only method invocation at an address, against an optional
/// historical reference point.
#[async_trait]
pub trait ReadBackend: Send + Sync {
    async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<Bytes, BindError>;
}

/// Submission of a state-mutating call. Returns as soon as the request is
/// accepted for submission; inclusion is not awaited.
#[async_trait]
pub trait WriteBackend: Send + Sync {
    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        opts: TransactOptions,
    ) -> Result<TxHandle, BindError>;
}

/// Historical log queries and live log feeds.
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Bounded range query; records are returned in emission order.
    async fn filter_logs(&self, filter: LogFilter) -> Result<Vec<LogRecord>, BindError>;

    /// Opens a live feed matching `filter`. The receiver yields records in
    /// emission order; the [`Subscription`] carries the out-of-band error
    /// signal and must eventually be unsubscribed (dropping it suffices).
    async fn subscribe_logs(
        &self,
        filter: LogFilter,
    ) -> Result<(mpsc::Receiver<LogRecord>, Subscription), BindError>;
}

/// Handle to a live log feed: the feed's error signal plus cancellation.
///
/// Owned by exactly one [`crate::event::EventIterator`] or one watcher task
/// at a time.
pub struct Subscription {
    errors: mpsc::Receiver<BindError>,
    unsub: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// `errors` delivers at most one terminal feed failure; `unsub` is the
    /// producer's cancellation signal (sending or dropping it both count).
    pub fn new(errors: mpsc::Receiver<BindError>, unsub: oneshot::Sender<()>) -> Self {
        Self {
            errors,
            unsub: Some(unsub),
        }
    }

    /// Resolves when the feed terminates abnormally. Pends forever once the
    /// failure has been consumed, or if the feed ends cleanly (a clean end
    /// closes the record channel instead).
    pub async fn failure(&mut self) -> BindError {
        match self.errors.recv().await {
            Some(err) => err,
            None => std::future::pending().await,
        }
    }

    /// Tears down the live feed. Idempotent; also invoked on drop.
    pub fn unsubscribe(&mut self) {
        if let Some(unsub) = self.unsub.take() {
            let _ = unsub.send(());
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsub.is_some())
            .finish()
    }
}

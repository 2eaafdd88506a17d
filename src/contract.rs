//! Bound contract handle: the single dispatch point between typed wrapper
//! calls and the configured backends.

use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, Bytes},
};
use tokio::sync::mpsc;

use crate::{
    backend::{LogBackend, ReadBackend, Subscription, WriteBackend},
    codec::{Descriptor, EventCodec},
    error::BindError,
    event::{self, DecodeEvent, EventIterator, EventWatch},
    types::{
        CallOptions, FilterOptions, LogFilter, LogRecord, TransactOptions, TxHandle, TypedEvent,
        WatchOptions,
    },
};

/// A deployed contract instance: target address, shared descriptor, and
/// whichever backends the caller configured.
///
/// Immutable after construction; one handle serves any number of concurrent
/// call/transact/filter/watch invocations.
#[derive(Clone)]
pub struct BoundContract {
    address: Address,
    descriptor: Arc<Descriptor>,
    reader: Option<Arc<dyn ReadBackend>>,
    writer: Option<Arc<dyn WriteBackend>>,
    logs: Option<Arc<dyn LogBackend>>,
}

impl BoundContract {
    /// Binds `descriptor` to a deployed instance at `address`, with no
    /// backends. Attach them with the `with_*` builders.
    pub fn new(address: Address, descriptor: Arc<Descriptor>) -> Self {
        Self {
            address,
            descriptor,
            reader: None,
            writer: None,
            logs: None,
        }
    }

    pub fn with_reader(mut self, reader: Arc<dyn ReadBackend>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_writer(mut self, writer: Arc<dyn WriteBackend>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn with_logs(mut self, logs: Arc<dyn LogBackend>) -> Self {
        self.logs = Some(logs);
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn descriptor(&self) -> &Arc<Descriptor> {
        &self.descriptor
    }

    /// Invokes a read-only method and decodes its return values.
    ///
    /// Argument problems surface as [`BindError::Encode`] before the
    /// backend is contacted; backend failures are propagated verbatim.
    pub async fn call(
        &self,
        opts: CallOptions,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<Vec<DynSolValue>, BindError> {
        let reader = self.reader.as_ref().ok_or(BindError::NoBackend("read"))?;
        let data = self.descriptor.encode_input(method, args)?;
        let raw = reader.call_contract(self.address, data, opts).await?;
        self.descriptor.decode_output(method, &raw)
    }

    /// Submits a state-mutating method call. Returns once the request is
    /// accepted for submission; inclusion is not awaited.
    pub async fn transact(
        &self,
        opts: TransactOptions,
        method: &str,
        args: &[DynSolValue],
    ) -> Result<TxHandle, BindError> {
        let writer = self.writer.as_ref().ok_or(BindError::NoBackend("write"))?;
        let data = self.descriptor.encode_input(method, args)?;
        writer.send_transaction(self.address, data, opts).await
    }

    /// Submits pre-encoded call data, bypassing the codec. For
    /// fallback/receive-style invocations.
    pub async fn raw_transact(
        &self,
        opts: TransactOptions,
        calldata: Bytes,
    ) -> Result<TxHandle, BindError> {
        let writer = self.writer.as_ref().ok_or(BindError::NoBackend("write"))?;
        writer.send_transaction(self.address, calldata, opts).await
    }

    /// Bounded historical query for raw log records of the named event.
    ///
    /// `constraints[i]` lists accepted values for the event's i-th indexed
    /// parameter (OR'd); positions are AND'd; omitted positions match
    /// anything.
    pub async fn filter_logs(
        &self,
        opts: FilterOptions,
        event: &str,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<Vec<LogRecord>, BindError> {
        let backend = self.logs.as_ref().ok_or(BindError::NoBackend("log"))?;
        let filter = self.log_filter(event, constraints, Some(opts.from_block), opts.to_block)?;
        backend.filter_logs(filter).await
    }

    /// Opens a live feed of raw log records for the named event. The
    /// returned [`Subscription`] must eventually be released (dropping it
    /// suffices).
    pub async fn watch_logs(
        &self,
        opts: WatchOptions,
        event: &str,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<(mpsc::Receiver<LogRecord>, Subscription), BindError> {
        let backend = self.logs.as_ref().ok_or(BindError::NoBackend("log"))?;
        let filter = self.log_filter(event, constraints, opts.from_block, None)?;
        backend.subscribe_logs(filter).await
    }

    /// Queries past occurrences and keeps following new ones: an iterator
    /// over typed events, historical first, then live.
    pub async fn filter_events(
        &self,
        opts: FilterOptions,
        event: &str,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<EventIterator<EventCodec>, BindError> {
        let decoder = EventCodec::new(self.descriptor.clone(), event)?;
        self.filter_events_with(opts, event, decoder, constraints)
            .await
    }

    /// [`Self::filter_events`] with a caller-supplied decoder, for
    /// generated wrappers that produce concrete event structs.
    pub async fn filter_events_with<D: DecodeEvent>(
        &self,
        opts: FilterOptions,
        event: &str,
        decoder: D,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<EventIterator<D>, BindError> {
        // The live feed opens before the bounded query runs so that nothing
        // emitted in between is lost. A record landing in that gap may be
        // seen twice across the boundary.
        let (live, sub) = self
            .watch_logs(WatchOptions::default(), event, constraints)
            .await?;
        let history = self.filter_logs(opts, event, constraints).await?;
        Ok(EventIterator::new(decoder, history, live, sub))
    }

    /// Forwards new occurrences of the named event to `sink` from a
    /// background task until cancelled or the subscription fails.
    pub async fn watch_events(
        &self,
        opts: WatchOptions,
        event: &str,
        sink: mpsc::Sender<TypedEvent>,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<EventWatch, BindError> {
        let decoder = EventCodec::new(self.descriptor.clone(), event)?;
        self.watch_events_with(opts, event, decoder, sink, constraints)
            .await
    }

    /// [`Self::watch_events`] with a caller-supplied decoder.
    pub async fn watch_events_with<D: DecodeEvent>(
        &self,
        opts: WatchOptions,
        event: &str,
        decoder: D,
        sink: mpsc::Sender<D::Event>,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<EventWatch, BindError> {
        let (live, sub) = self.watch_logs(opts, event, constraints).await?;
        Ok(event::spawn(decoder, live, sub, sink))
    }

    fn log_filter(
        &self,
        event: &str,
        constraints: &[Vec<DynSolValue>],
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> Result<LogFilter, BindError> {
        Ok(LogFilter {
            address: self.address,
            topics: self.descriptor.event_topics(event, constraints)?,
            from_block,
            to_block,
        })
    }
}

impl std::fmt::Debug for BoundContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundContract")
            .field("address", &self.address)
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("logs", &self.logs.is_some())
            .finish()
    }
}

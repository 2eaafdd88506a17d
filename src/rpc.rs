//! Provider-backed backend implementation.
//!
//! Implements all three backend traits against an alloy [`Provider`]. Live
//! subscriptions are driven by per-block log polling to produce a strictly
//! continuous record sequence; it is recommended to set the provider up
//! with [`alloy::transports::layers::FallbackLayer`] and/or
//! [`alloy::transports::layers::RetryBackoffLayer`].

use std::time::Duration;

use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes},
    providers::Provider,
    rpc::types::{Filter, Log, TransactionRequest},
};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::{
    backend::{LogBackend, ReadBackend, Subscription, WriteBackend},
    error::BindError,
    types::{CallOptions, LogFilter, LogRecord, TransactOptions, TxHandle},
};

/// Default capacity of a live feed channel.
const DEFAULT_CHANNEL_SIZE: usize = 100;

/// Backend dispatching to an RPC node through an alloy [`Provider`].
///
/// Write support relies on the provider being wallet-configured; this layer
/// does no signing of its own.
#[derive(Clone, Debug)]
pub struct RpcBackend<P> {
    provider: P,
    poll_interval: Option<Duration>,
    channel_size: usize,
}

impl<P> RpcBackend<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            poll_interval: None,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }

    /// Overrides the provider-configured poll interval for live feeds.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn with_channel_size(mut self, size: usize) -> Self {
        self.channel_size = size;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

#[async_trait]
impl<P: Provider> ReadBackend for RpcBackend<P> {
    async fn call_contract(
        &self,
        to: Address,
        data: Bytes,
        opts: CallOptions,
    ) -> Result<Bytes, BindError> {
        let mut tx = TransactionRequest::default().with_to(to).with_input(data);
        if let Some(from) = opts.from {
            tx = tx.with_from(from);
        }
        let mut call = self.provider.call(tx);
        if let Some(block) = opts.block {
            call = call.block(block);
        }
        Ok(call.await?)
    }
}

#[async_trait]
impl<P: Provider> WriteBackend for RpcBackend<P> {
    async fn send_transaction(
        &self,
        to: Address,
        data: Bytes,
        opts: TransactOptions,
    ) -> Result<TxHandle, BindError> {
        let mut tx = TransactionRequest::default().with_to(to).with_input(data);
        if let Some(from) = opts.from {
            tx = tx.with_from(from);
        }
        if let Some(value) = opts.value {
            tx = tx.with_value(value);
        }
        if let Some(gas_limit) = opts.gas_limit {
            tx = tx.with_gas_limit(gas_limit);
        }
        if let Some(nonce) = opts.nonce {
            tx = tx.with_nonce(nonce);
        }
        let pending = self.provider.send_transaction(tx).await?;
        Ok(TxHandle::new(*pending.tx_hash()))
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> LogBackend for RpcBackend<P> {
    async fn filter_logs(&self, filter: LogFilter) -> Result<Vec<LogRecord>, BindError> {
        let rpc = rpc_filter(&filter, filter.from_block.unwrap_or_default(), filter.to_block);
        let logs = self.provider.get_logs(&rpc).await?;
        Ok(logs.iter().map(log_record).collect())
    }

    async fn subscribe_logs(
        &self,
        filter: LogFilter,
    ) -> Result<(mpsc::Receiver<LogRecord>, Subscription), BindError> {
        let start = match filter.from_block {
            Some(block) => block,
            None => self.provider.get_block_number().await? + 1,
        };
        let interval = self
            .poll_interval
            .unwrap_or_else(|| self.provider.client().poll_interval());

        let (log_tx, log_rx) = mpsc::channel(self.channel_size);
        let (err_tx, err_rx) = mpsc::channel(1);
        let (unsub_tx, unsub_rx) = oneshot::channel();
        tokio::spawn(poll_feed(
            self.provider.clone(),
            filter,
            start,
            interval,
            log_tx,
            err_tx,
            unsub_rx,
        ));
        Ok((log_rx, Subscription::new(err_rx, unsub_tx)))
    }
}

/// Polls one block at a time from `next_block`, forwarding matching records
/// in emission order. Stops on unsubscribe or when the consumer is gone;
/// a fetch failure is reported through the error channel and ends the feed.
async fn poll_feed<P: Provider>(
    provider: P,
    filter: LogFilter,
    mut next_block: u64,
    interval: Duration,
    logs: mpsc::Sender<LogRecord>,
    errors: mpsc::Sender<BindError>,
    mut unsub: oneshot::Receiver<()>,
) {
    loop {
        let fetched = tokio::select! {
            _ = &mut unsub => {
                debug!(block = next_block, "feed unsubscribed");
                return;
            }
            fetched = fetch_block(&provider, &filter, next_block) => fetched,
        };
        match fetched {
            Ok(Some(records)) => {
                for record in records {
                    if logs.send(record).await.is_err() {
                        // Consumer dropped the receiver; the feed is done.
                        return;
                    }
                }
                next_block += 1;
            }
            // Block is not available yet; wait for the chain to advance.
            Ok(None) => {
                tokio::select! {
                    _ = &mut unsub => return,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            Err(err) => {
                debug!(block = next_block, %err, "feed failed");
                let _ = errors.send(err).await;
                return;
            }
        }
    }
}

/// Fetches all matching logs of a single block, or `None` when the chain
/// has not reached it yet.
async fn fetch_block<P: Provider>(
    provider: &P,
    filter: &LogFilter,
    block: u64,
) -> Result<Option<Vec<LogRecord>>, BindError> {
    let rpc = rpc_filter(filter, block, Some(block));
    // Anvil nodes, and maybe some RPC providers, produce an empty response
    // instead of an error when the block in the filter does not exist yet,
    // so the head is checked alongside the query itself.
    let (head, logs) = futures::try_join!(provider.get_block_number(), provider.get_logs(&rpc))
        .map_err(BindError::from)?;
    if head < block {
        return Ok(None);
    }
    Ok(Some(logs.iter().map(log_record).collect()))
}

fn rpc_filter(filter: &LogFilter, from_block: u64, to_block: Option<u64>) -> Filter {
    let mut rpc = Filter::new().address(filter.address).from_block(from_block);
    if let Some(to_block) = to_block {
        rpc = rpc.to_block(to_block);
    }
    for (i, alternatives) in filter.topics.iter().take(rpc.topics.len()).enumerate() {
        if !alternatives.is_empty() {
            rpc.topics[i] = alternatives.clone().into();
        }
    }
    rpc
}

fn log_record(log: &Log) -> LogRecord {
    LogRecord {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        block_number: log.block_number.unwrap_or_default(),
        block_hash: log.block_hash.unwrap_or_default(),
        tx_hash: log.transaction_hash.unwrap_or_default(),
        tx_index: log.transaction_index.unwrap_or_default(),
        log_index: log.log_index.unwrap_or_default(),
        removed: log.removed,
    }
}

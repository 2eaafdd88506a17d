//! Contract binding runtime.
//!
//! # Overview
//!
//! The reusable layer under generated smart-contract client bindings:
//! instead of emitting one marshalling routine and one iterator/watcher
//! pair per method and event, generated wrappers supply only names and
//! concrete types and dispatch through this crate.
//!
//! Parse a contract's interface description into a [`codec::Descriptor`],
//! bind it to a deployed address with [`contract::BoundContract`], and
//! attach backends ([`rpc::RpcBackend`] for a live node, or any
//! implementation of the [`backend`] traits).
//!
//! * `call`/`transact`/`raw_transact` dispatch typed method invocations.
//! * [`contract::BoundContract::filter_events`] returns a pull-based
//!   [`event::EventIterator`] that drains a historical query and then
//!   follows the live feed.
//! * [`contract::BoundContract::watch_events`] forwards new occurrences to
//!   a caller-supplied channel from a background task.
//!
//! Delivery is in backend emission order, at most once per consumer
//! instance. Across the historical/live boundary delivery is at least
//! once: the subscription opens before the bounded query runs, so a
//! record landing in the gap can be seen twice. Consumers are expected to
//! handle duplicates idempotently.
//!
//! See `./tests` for end-to-end examples against the in-memory
//! [`testing::MockBackend`].

pub mod backend;
pub mod codec;
pub mod contract;
pub mod error;
pub mod event;
pub mod rpc;
pub mod testing;
pub mod types;

pub use backend::{LogBackend, ReadBackend, Subscription, WriteBackend};
pub use codec::{Descriptor, EventCodec};
pub use contract::BoundContract;
pub use error::BindError;
pub use event::{DecodeEvent, EventIterator, EventWatch};

use alloy::{
    dyn_abi::DynSolValue,
    eips::BlockId,
    primitives::{Address, B256, Bytes, TxHash, U256},
};

/// One recorded occurrence of a contract event, as exposed by a log backend.
///
/// Raw topics/data are decoded into a [`TypedEvent`] by the codec; the block
/// and transaction coordinates identify the occurrence for provenance and
/// replay.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogRecord {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub block_hash: B256,
    pub tx_hash: TxHash,
    pub tx_index: u64,
    pub log_index: u64,
    pub removed: bool,
}

/// Decoded occurrence of a contract event: named field values in declared
/// order plus the originating [`LogRecord`].
#[derive(Clone, Debug, PartialEq)]
pub struct TypedEvent {
    pub(crate) name: String,
    pub(crate) fields: Vec<(String, DynSolValue)>,
    pub(crate) raw: LogRecord,
}

impl TypedEvent {
    pub(crate) fn new(name: String, fields: Vec<(String, DynSolValue)>, raw: LogRecord) -> Self {
        Self { name, fields, raw }
    }

    /// Event name as declared in the descriptor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field values in declared order. Unnamed fields get positional
    /// `argN` names.
    pub fn fields(&self) -> &[(String, DynSolValue)] {
        &self.fields
    }

    /// Looks up a field value by name.
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        self.fields
            .iter()
            .find_map(|(n, v)| (n == name).then_some(v))
    }

    /// Log record this event was decoded from.
    pub fn raw(&self) -> &LogRecord {
        &self.raw
    }
}

/// Opaque handle for a state-mutating request accepted for submission.
///
/// Submission acceptance only; inclusion/confirmation tracking is up to
/// the caller and the write backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxHandle {
    hash: TxHash,
}

impl TxHandle {
    pub fn new(hash: TxHash) -> Self {
        Self { hash }
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }
}

/// Options for a read-only call.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallOptions {
    /// Historical reference point; latest if unset.
    pub block: Option<BlockId>,
    /// Sender to impersonate for the call, if the backend supports it.
    pub from: Option<Address>,
}

/// Options for a state-mutating request. Unset fields are left to the
/// write backend to fill in.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransactOptions {
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
}

/// Block range for a bounded historical log query.
#[derive(Clone, Copy, Debug, Default)]
pub struct FilterOptions {
    pub from_block: u64,
    /// Up to the latest block if unset.
    pub to_block: Option<u64>,
}

/// Options for opening a live log feed.
#[derive(Clone, Copy, Debug, Default)]
pub struct WatchOptions {
    /// Starts at the current head if unset.
    pub from_block: Option<u64>,
}

/// Server-side log query shape handed to a log backend.
///
/// `topics[i]` lists the accepted values for topic position `i`; an empty
/// list matches anything. Values within one position are OR'd, positions
/// are AND'd.
#[derive(Clone, Debug, Default)]
pub struct LogFilter {
    pub address: Address,
    pub topics: Vec<Vec<B256>>,
    /// Earliest block for a bounded query; for a live feed, `None` means
    /// "from the current head".
    pub from_block: Option<u64>,
    pub to_block: Option<u64>,
}

impl LogFilter {
    /// Whether a record satisfies the address and topic constraints.
    /// Block range is intentionally not checked here; live feeds have no
    /// upper bound.
    pub fn matches(&self, record: &LogRecord) -> bool {
        if record.address != self.address {
            return false;
        }
        self.topics.iter().enumerate().all(|(i, alternatives)| {
            alternatives.is_empty()
                || record
                    .topics
                    .get(i)
                    .is_some_and(|topic| alternatives.contains(topic))
        })
    }
}

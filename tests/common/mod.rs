//! Shared fixtures: a staking/oracle style interface descriptor and a
//! bound contract wired to the in-memory mock backend.
#![allow(dead_code)]

use std::sync::Arc;

use abi_bind::{BoundContract, Descriptor, testing::MockBackend, types::LogRecord};
use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, U256, address},
};

pub const STAKING_ABI: &str = r#"[
  {
    "type": "function",
    "name": "getValidator",
    "stateMutability": "view",
    "inputs": [{ "name": "operator", "type": "address" }],
    "outputs": [
      {
        "name": "",
        "type": "tuple",
        "components": [
          { "name": "operator", "type": "address" },
          { "name": "stake", "type": "uint256" },
          { "name": "jailed", "type": "bool" }
        ]
      }
    ]
  },
  {
    "type": "function",
    "name": "delegate",
    "stateMutability": "nonpayable",
    "inputs": [
      { "name": "validator", "type": "address" },
      { "name": "amount", "type": "uint256" }
    ],
    "outputs": []
  },
  {
    "type": "function",
    "name": "validatorCount",
    "stateMutability": "view",
    "inputs": [],
    "outputs": [{ "name": "", "type": "uint256" }]
  },
  {
    "type": "event",
    "name": "ValidatorRegistered",
    "inputs": [
      { "name": "operator", "type": "address", "indexed": true },
      { "name": "stake", "type": "uint256", "indexed": false }
    ],
    "anonymous": false
  },
  {
    "type": "event",
    "name": "ReportSubmitted",
    "inputs": [
      { "name": "round", "type": "uint256", "indexed": true },
      { "name": "reporter", "type": "address", "indexed": true },
      { "name": "report", "type": "bytes", "indexed": false }
    ],
    "anonymous": false
  }
]"#;

pub const CONTRACT: Address = address!("0x9C216D1Ab3e0407b3d6F1d5e9EfFe6d01C326ab7");
pub const OPERATOR_A: Address = address!("0x00000000000000000000000000000000000000aa");
pub const OPERATOR_B: Address = address!("0x00000000000000000000000000000000000000bb");

pub fn descriptor() -> Arc<Descriptor> {
    Arc::new(Descriptor::parse(STAKING_ABI).unwrap())
}

pub fn bound(mock: &Arc<MockBackend>) -> BoundContract {
    BoundContract::new(CONTRACT, descriptor())
        .with_reader(mock.clone())
        .with_writer(mock.clone())
        .with_logs(mock.clone())
}

pub fn validator_registered(operator: Address, stake: u64, block_number: u64) -> LogRecord {
    let descriptor = descriptor();
    let event = descriptor.event("ValidatorRegistered").unwrap();
    LogRecord {
        address: CONTRACT,
        topics: vec![event.selector(), operator.into_word()],
        data: DynSolValue::Tuple(vec![DynSolValue::Uint(U256::from(stake), 256)])
            .abi_encode_params()
            .into(),
        block_number,
        log_index: stake,
        ..Default::default()
    }
}

pub fn stake_of(event: &abi_bind::types::TypedEvent) -> u64 {
    match event.field("stake") {
        Some(DynSolValue::Uint(stake, 256)) => stake.to::<u64>(),
        other => panic!("unexpected stake field: {other:?}"),
    }
}

/// Lets already-unblocked background tasks run to completion.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

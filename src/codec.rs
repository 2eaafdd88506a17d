//! Descriptor-driven value codec.
//!
//! Translates between typed in-memory values ([`DynSolValue`]) and the wire
//! representation, given the parsed interface descriptor of a contract.
//! Pure and stateless: safe to share and call concurrently.

use std::sync::Arc;

use alloy::{
    dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt},
    json_abi::{Event, Function, JsonAbi},
    primitives::{B256, Bytes, keccak256},
};

use crate::{error::BindError, event::DecodeEvent, types::LogRecord, types::TypedEvent};

/// Parsed, immutable interface descriptor of a contract type.
///
/// Built once per contract type (typically wrapped in an [`Arc`]) and shared
/// read-only by every bound handle for that type.
#[derive(Clone, Debug)]
pub struct Descriptor {
    abi: JsonAbi,
}

impl Descriptor {
    /// Parses a JSON interface description (functions, events, mutability,
    /// indexed flags).
    pub fn parse(json: &str) -> Result<Self, BindError> {
        let abi: JsonAbi = serde_json::from_str(json)?;
        Ok(Self { abi })
    }

    pub fn from_abi(abi: JsonAbi) -> Self {
        Self { abi }
    }

    pub fn abi(&self) -> &JsonAbi {
        &self.abi
    }

    /// Looks up a method by name. Lookup is name-keyed; with overloads the
    /// first declared one wins.
    pub fn function(&self, name: &str) -> Result<&Function, BindError> {
        self.abi
            .function(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| BindError::UnknownName(name.to_string()))
    }

    /// Looks up an event by name.
    pub fn event(&self, name: &str) -> Result<&Event, BindError> {
        self.abi
            .event(name)
            .and_then(|overloads| overloads.first())
            .ok_or_else(|| BindError::UnknownName(name.to_string()))
    }

    /// Encodes `args` as selector-prefixed call data for `method`.
    ///
    /// Arity and value shapes are checked against the descriptor before
    /// anything is encoded.
    pub fn encode_input(&self, method: &str, args: &[DynSolValue]) -> Result<Bytes, BindError> {
        let function = self.function(method)?;
        if function.inputs.len() != args.len() {
            return Err(BindError::Encode(format!(
                "{method} expects {} argument(s), got {}",
                function.inputs.len(),
                args.len()
            )));
        }
        function
            .abi_encode_input(args)
            .map(Bytes::from)
            .map_err(BindError::encode)
    }

    /// Decodes raw return bytes of `method` into its declared output values.
    ///
    /// Composite outputs are reconstructed in declared field order; unnamed
    /// outputs decode positionally.
    pub fn decode_output(&self, method: &str, data: &[u8]) -> Result<Vec<DynSolValue>, BindError> {
        self.function(method)?
            .abi_decode_output(data)
            .map_err(BindError::decode)
    }

    /// Decodes one log record into a [`TypedEvent`] of the named event.
    ///
    /// Indexed values come from the topics, the rest from the data payload;
    /// the two are stitched back into declared field order.
    pub fn decode_event(&self, name: &str, log: &LogRecord) -> Result<TypedEvent, BindError> {
        let event = self.event(name)?;
        let decoded = event
            .decode_log_parts(log.topics.iter().copied(), &log.data)
            .map_err(BindError::decode)?;

        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut fields = Vec::with_capacity(event.inputs.len());
        for (i, input) in event.inputs.iter().enumerate() {
            let value = if input.indexed {
                indexed.next()
            } else {
                body.next()
            }
            .ok_or_else(|| {
                BindError::Decode(format!("event {name}: missing value for field {i}"))
            })?;
            let field_name = if input.name.is_empty() {
                format!("arg{i}")
            } else {
                input.name.clone()
            };
            fields.push((field_name, value));
        }
        Ok(TypedEvent::new(event.name.clone(), fields, log.clone()))
    }

    /// Builds the positional topic lists for a log query on the named event.
    ///
    /// Position 0 carries the event's topic fingerprint; each following
    /// position carries the caller's alternatives for one indexed parameter
    /// (OR'd by the backend), in declaration order. Omitted trailing
    /// positions match anything.
    pub fn event_topics(
        &self,
        name: &str,
        constraints: &[Vec<DynSolValue>],
    ) -> Result<Vec<Vec<B256>>, BindError> {
        let event = self.event(name)?;
        let indexed = event.inputs.iter().filter(|p| p.indexed).count();
        if constraints.len() > indexed {
            return Err(BindError::Encode(format!(
                "event {name} has {indexed} indexed parameter(s), got {} constraint position(s)",
                constraints.len()
            )));
        }
        let mut topics = Vec::with_capacity(1 + constraints.len());
        topics.push(vec![event.selector()]);
        for alternatives in constraints {
            let mut words = Vec::with_capacity(alternatives.len());
            for value in alternatives {
                words.push(topic_word(value)?);
            }
            topics.push(words);
        }
        Ok(topics)
    }
}

/// Topic representation of one indexed filter value: word types use their
/// 32-byte word, dynamic `string`/`bytes` use the keccak fingerprint of
/// their contents (the same form the ledger stores for them).
fn topic_word(value: &DynSolValue) -> Result<B256, BindError> {
    if let Some(word) = value.as_word() {
        return Ok(word);
    }
    match value {
        DynSolValue::String(s) => Ok(keccak256(s.as_bytes())),
        DynSolValue::Bytes(b) => Ok(keccak256(b)),
        other => Err(BindError::Encode(format!(
            "value {other:?} cannot be used as an indexed filter"
        ))),
    }
}

/// Descriptor-backed event decoder; the canonical [`DecodeEvent`]
/// implementation used by [`crate::contract::BoundContract`].
#[derive(Clone, Debug)]
pub struct EventCodec {
    descriptor: Arc<Descriptor>,
    event: String,
}

impl EventCodec {
    /// Fails with [`BindError::UnknownName`] if the descriptor does not
    /// declare the event.
    pub fn new(descriptor: Arc<Descriptor>, event: &str) -> Result<Self, BindError> {
        descriptor.event(event)?;
        Ok(Self {
            descriptor,
            event: event.to_string(),
        })
    }

    pub fn event_name(&self) -> &str {
        &self.event
    }
}

impl DecodeEvent for EventCodec {
    type Event = TypedEvent;

    fn decode(&self, log: &LogRecord) -> Result<TypedEvent, BindError> {
        self.descriptor.decode_event(&self.event, log)
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{Address, U256, address};

    use super::*;

    const STAKING_ABI: &str = r#"[
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
        "name": "getReport",
        "stateMutability": "view",
        "inputs": [{ "name": "round", "type": "uint256" }],
        "outputs": [
          { "name": "report", "type": "bytes" },
          { "name": "signers", "type": "address[]" }
        ]
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
      },
      {
        "type": "event",
        "name": "Slashed",
        "inputs": [
          { "name": "operator", "type": "address", "indexed": true },
          { "name": "amount", "type": "uint256", "indexed": false },
          { "name": "reason", "type": "string", "indexed": false }
        ],
        "anonymous": false
      }
    ]"#;

    const OPERATOR: Address = address!("0x00000000000000000000000000000000000000aa");

    fn descriptor() -> Descriptor {
        Descriptor::parse(STAKING_ABI).unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let d = descriptor();
        let args = vec![
            DynSolValue::Address(OPERATOR),
            DynSolValue::Uint(U256::from(1_000_000u64), 256),
        ];
        let data = d.encode_input("delegate", &args).unwrap();
        // First four bytes are the method selector.
        assert_eq!(&data[..4], &d.function("delegate").unwrap().selector()[..]);
        let decoded = d
            .function("delegate")
            .unwrap()
            .abi_decode_input(&data[4..])
            .unwrap();
        assert_eq!(decoded, args);
    }

    #[test]
    fn test_encode_round_trip_dynamic_shapes() {
        let d = descriptor();
        let cases = vec![
            vec![
                DynSolValue::Bytes(vec![1, 2, 3]),
                DynSolValue::Array(vec![
                    DynSolValue::Address(OPERATOR),
                    DynSolValue::Address(Address::ZERO),
                ]),
            ],
            // Empty dynamic values must survive the round trip too.
            vec![
                DynSolValue::Bytes(vec![]),
                DynSolValue::Array(Vec::<DynSolValue>::new()),
            ],
        ];
        for values in cases {
            let encoded = DynSolValue::Tuple(values.clone()).abi_encode_params();
            let decoded = d.decode_output("getReport", &encoded).unwrap();
            assert_eq!(decoded, values);
        }
    }

    #[test]
    fn test_encode_arity_mismatch() {
        let d = descriptor();
        let err = d
            .encode_input("delegate", &[DynSolValue::Address(OPERATOR)])
            .unwrap_err();
        assert!(matches!(err, BindError::Encode(_)), "got {err:?}");
    }

    #[test]
    fn test_encode_shape_mismatch() {
        let d = descriptor();
        let err = d
            .encode_input(
                "delegate",
                &[
                    DynSolValue::Bool(true),
                    DynSolValue::Uint(U256::from(1u64), 256),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BindError::Encode(_)), "got {err:?}");
    }

    #[test]
    fn test_encode_unknown_method() {
        let err = descriptor().encode_input("undelegate", &[]).unwrap_err();
        assert!(matches!(err, BindError::UnknownName(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_nested_tuple_output() {
        let d = descriptor();
        let validator = DynSolValue::Tuple(vec![
            DynSolValue::Address(OPERATOR),
            DynSolValue::Uint(U256::from(42u64), 256),
            DynSolValue::Bool(false),
        ]);
        let encoded = DynSolValue::Tuple(vec![validator.clone()]).abi_encode_params();
        let decoded = d.decode_output("getValidator", &encoded).unwrap();
        assert_eq!(decoded, vec![validator]);
    }

    #[test]
    fn test_decode_truncated_output() {
        let d = descriptor();
        let encoded = DynSolValue::Tuple(vec![
            DynSolValue::Bytes(vec![7; 40]),
            DynSolValue::Array(vec![DynSolValue::Address(OPERATOR)]),
        ])
        .abi_encode_params();
        // Cut into the dynamic tail.
        let err = d
            .decode_output("getReport", &encoded[..encoded.len() - 48])
            .unwrap_err();
        assert!(matches!(err, BindError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn test_decode_event_stitches_field_order() {
        let d = descriptor();
        let event = d.event("ReportSubmitted").unwrap();
        let round = U256::from(9u64);
        let log = LogRecord {
            topics: vec![
                event.selector(),
                B256::from(round),
                OPERATOR.into_word(),
            ],
            data: DynSolValue::Tuple(vec![DynSolValue::Bytes(vec![0xde, 0xad])])
                .abi_encode_params()
                .into(),
            ..Default::default()
        };
        let decoded = d.decode_event("ReportSubmitted", &log).unwrap();
        assert_eq!(decoded.name(), "ReportSubmitted");
        let names: Vec<_> = decoded.fields().iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, ["round", "reporter", "report"]);
        assert_eq!(
            decoded.field("round"),
            Some(&DynSolValue::Uint(round, 256))
        );
        assert_eq!(
            decoded.field("reporter"),
            Some(&DynSolValue::Address(OPERATOR))
        );
        assert_eq!(
            decoded.field("report"),
            Some(&DynSolValue::Bytes(vec![0xde, 0xad]))
        );
        assert_eq!(decoded.raw(), &log);
    }

    #[test]
    fn test_decode_event_malformed_payload() {
        let d = descriptor();
        let event = d.event("Slashed").unwrap();
        let log = LogRecord {
            topics: vec![event.selector(), OPERATOR.into_word()],
            // One word where (uint256, string) is declared: the string
            // offset points past the end.
            data: DynSolValue::Uint(U256::from(5u64), 256)
                .abi_encode()
                .into(),
            ..Default::default()
        };
        let err = d.decode_event("Slashed", &log).unwrap_err();
        assert!(matches!(err, BindError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn test_event_topics() {
        let d = descriptor();
        let event = d.event("ReportSubmitted").unwrap();
        let topics = d
            .event_topics(
                "ReportSubmitted",
                &[vec![
                    DynSolValue::Uint(U256::from(1u64), 256),
                    DynSolValue::Uint(U256::from(2u64), 256),
                ]],
            )
            .unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0], vec![event.selector()]);
        assert_eq!(
            topics[1],
            vec![B256::from(U256::from(1u64)), B256::from(U256::from(2u64))]
        );
    }

    #[test]
    fn test_event_topics_hashes_dynamic_values() {
        let d = descriptor();
        // A dynamic filter value stands in for its keccak fingerprint.
        let topics = d
            .event_topics("Slashed", &[vec![DynSolValue::String("x".into())]])
            .unwrap();
        assert_eq!(topics[1], vec![keccak256("x".as_bytes())]);
    }

    #[test]
    fn test_event_topics_too_many_positions() {
        let d = descriptor();
        let err = d
            .event_topics(
                "ValidatorRegistered",
                &[
                    vec![DynSolValue::Address(OPERATOR)],
                    vec![DynSolValue::Uint(U256::from(1u64), 256)],
                ],
            )
            .unwrap_err();
        assert!(matches!(err, BindError::Encode(_)), "got {err:?}");
    }

    #[test]
    fn test_event_codec_requires_known_event() {
        let d = Arc::new(descriptor());
        assert!(EventCodec::new(d.clone(), "ValidatorRegistered").is_ok());
        assert!(matches!(
            EventCodec::new(d, "Nope"),
            Err(BindError::UnknownName(_))
        ));
    }
}

//! Raw log → [`DomainEvent`] for the known lot-tracking events.
//!
//! # Indexed parameters
//! Value types (address, bool, intN/uintN, bytesN) sit in their topic padded to
//! 32 bytes and decode directly. Reference types (string, bytes, arrays) are
//! stored as the keccak256 of their encoding; only the hash is recoverable and
//! it is returned as bytes.

use std::collections::HashMap;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::B256;
use indexmap::IndexMap;

use chainrelay_core::types::{DomainEvent, EventKind, FieldValue, RawLogRecord};

use crate::error::DecodeError;
use crate::fingerprint::event_topic;

/// The field carrying a lot's logical identifier.
pub const LOT_ID_FIELD: &str = "loteId";

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: DynSolType,
    pub indexed: bool,
}

impl FieldDef {
    fn indexed(name: &'static str, ty: DynSolType) -> Self {
        Self { name, ty, indexed: true }
    }

    fn data(name: &'static str, ty: DynSolType) -> Self {
        Self { name, ty, indexed: false }
    }
}

/// Declared layout of one event, fields in declaration order.
#[derive(Debug, Clone)]
pub struct EventLayout {
    pub kind: EventKind,
    pub signature: &'static str,
    pub topic0: B256,
    pub fields: Vec<FieldDef>,
}

impl EventLayout {
    fn new(kind: EventKind, signature: &'static str, fields: Vec<FieldDef>) -> Self {
        Self {
            kind,
            signature,
            topic0: event_topic(signature),
            fields,
        }
    }

    pub fn for_kind(kind: EventKind) -> Self {
        match kind {
            EventKind::LotCreated => Self::new(
                kind,
                "LoteCreado(string,address,int8,int8)",
                vec![
                    FieldDef::data(LOT_ID_FIELD, DynSolType::String),
                    FieldDef::data("fabricante", DynSolType::Address),
                    FieldDef::data("temperaturaMinima", DynSolType::Int(8)),
                    FieldDef::data("temperaturaMaxima", DynSolType::Int(8)),
                ],
            ),
            EventKind::CustodyTransferred => Self::new(
                kind,
                "CustodiaTransferida(address,address,bool)",
                vec![
                    FieldDef::indexed("propietarioAnterior", DynSolType::Address),
                    FieldDef::indexed("nuevoPropietario", DynSolType::Address),
                    FieldDef::data("comprometido", DynSolType::Bool),
                ],
            ),
            EventKind::LotCompromised => Self::new(
                kind,
                "LoteComprometido(address,int8,int8,bool,string)",
                vec![
                    FieldDef::indexed("propietario", DynSolType::Address),
                    FieldDef::data("tempMin", DynSolType::Int(8)),
                    FieldDef::data("tempMax", DynSolType::Int(8)),
                    FieldDef::data("comprometido", DynSolType::Bool),
                    FieldDef::data("motivo", DynSolType::String),
                ],
            ),
        }
    }

    fn indexed_count(&self) -> usize {
        self.fields.iter().filter(|f| f.indexed).count()
    }
}

/// Decodes logs whose `topics[0]` matches one of the known lot events.
#[derive(Debug, Clone)]
pub struct EventDecoder {
    layouts: HashMap<B256, EventLayout>,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDecoder {
    pub fn new() -> Self {
        let layouts = EventKind::ALL
            .into_iter()
            .map(EventLayout::for_kind)
            .map(|layout| (layout.topic0, layout))
            .collect();
        Self { layouts }
    }

    pub fn layout(&self, topic0: &B256) -> Option<&EventLayout> {
        self.layouts.get(topic0)
    }

    /// `None` for logs that are not lot events. A recognised event is always
    /// returned; fields whose topic or data could not be decoded are left out
    /// and the failures are listed in [`Decoded::issues`].
    pub fn decode(&self, log: &RawLogRecord) -> Option<Decoded> {
        let layout = log.topics.first().and_then(|t| self.layout(t))?;
        let event = layout.kind;
        let mut issues = Vec::new();

        let indexed_topics = &log.topics[1..];
        if indexed_topics.len() < layout.indexed_count() {
            issues.push(DecodeError::MissingTopics {
                event,
                expected: layout.indexed_count(),
                got: indexed_topics.len(),
            });
        }

        // Data fields decode together or not at all.
        let data_types: Vec<DynSolType> = layout
            .fields
            .iter()
            .filter(|f| !f.indexed)
            .map(|f| f.ty.clone())
            .collect();
        let data_values = match decode_data(event, data_types, &log.data) {
            Ok(values) => values,
            Err(e) => {
                issues.push(e);
                Vec::new()
            }
        };
        let mut data_values = data_values.into_iter();

        let mut topics = indexed_topics.iter();
        let mut fields = IndexMap::with_capacity(layout.fields.len());
        for field in &layout.fields {
            let value = if field.indexed {
                match topics.next().map(|topic| decode_topic(event, topic, &field.ty)) {
                    Some(Ok(value)) => Some(value),
                    Some(Err(e)) => {
                        issues.push(e);
                        None
                    }
                    None => None,
                }
            } else {
                data_values.next().map(normalize)
            };
            if let Some(value) = value {
                fields.insert(field.name.to_string(), value);
            }
        }

        Some(Decoded {
            event: DomainEvent {
                kind: event,
                block_number: log.block_number,
                transaction_hash: log.transaction_hash.clone(),
                timestamp: 0,
                fields,
            },
            issues,
        })
    }
}

/// A recognised lot event plus whatever failed while decoding it.
#[derive(Debug)]
pub struct Decoded {
    pub event: DomainEvent,
    pub issues: Vec<DecodeError>,
}

impl Decoded {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

fn decode_data(
    event: EventKind,
    types: Vec<DynSolType>,
    data: &[u8],
) -> Result<Vec<DynSolValue>, DecodeError> {
    if types.is_empty() {
        return Ok(Vec::new());
    }
    let expected = types.len();
    let values = match DynSolType::Tuple(types).abi_decode_params(data) {
        Ok(DynSolValue::Tuple(values)) => values,
        Ok(other) => vec![other],
        Err(e) => {
            return Err(DecodeError::Abi {
                event,
                reason: e.to_string(),
            })
        }
    };
    if values.len() != expected {
        return Err(DecodeError::Abi {
            event,
            reason: format!("expected {expected} data values, got {}", values.len()),
        });
    }
    Ok(values)
}

fn decode_topic(event: EventKind, topic: &B256, ty: &DynSolType) -> Result<FieldValue, DecodeError> {
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(FieldValue::Bytes(format!("{topic:#x}"))),
        _ => ty
            .abi_decode(topic.as_slice())
            .map(normalize)
            .map_err(|e| DecodeError::Abi {
                event,
                reason: format!("topic decode: {e}"),
            }),
    }
}

/// Map a decoded ABI value onto a [`FieldValue`]. Addresses come out as
/// lowercase `0x` hex; integers up to 128 bits keep their native value.
pub fn normalize(val: DynSolValue) -> FieldValue {
    match val {
        DynSolValue::Bool(b) => FieldValue::Bool(b),
        DynSolValue::Int(i, bits) if bits <= 128 => match i128::try_from(i) {
            Ok(v) => FieldValue::Int(v),
            Err(_) => FieldValue::BigInt(i.to_string()),
        },
        DynSolValue::Int(i, _) => FieldValue::BigInt(i.to_string()),
        DynSolValue::Uint(u, bits) if bits <= 128 => match u128::try_from(u) {
            Ok(v) => FieldValue::Uint(v),
            Err(_) => FieldValue::BigInt(u.to_string()),
        },
        DynSolValue::Uint(u, _) => FieldValue::BigInt(u.to_string()),
        DynSolValue::Address(a) => FieldValue::Address(format!("0x{}", hex::encode(a.as_slice()))),
        DynSolValue::String(s) => FieldValue::Str(s),
        DynSolValue::Bytes(b) => FieldValue::Bytes(format!("0x{}", hex::encode(b))),
        DynSolValue::FixedBytes(word, size) => {
            FieldValue::Bytes(format!("0x{}", hex::encode(&word[..size])))
        }
        DynSolValue::Function(f) => FieldValue::Bytes(format!("0x{}", hex::encode(f.as_slice()))),
        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) | DynSolValue::Tuple(vals) => {
            FieldValue::List(vals.into_iter().map(normalize).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, I256};

    fn int8(v: i8) -> DynSolValue {
        DynSolValue::Int(I256::try_from(v as i64).unwrap(), 8)
    }

    fn address_topic(addr: Address) -> B256 {
        B256::left_padding_from(addr.as_slice())
    }

    fn log(topics: Vec<B256>, data: Vec<u8>) -> RawLogRecord {
        RawLogRecord {
            block_number: 42,
            transaction_hash: "0xabc".into(),
            log_index: 0,
            topics,
            data,
        }
    }

    #[test]
    fn lot_created_decodes_manufacturer_and_signed_bounds() {
        let manufacturer = Address::from([0xAB; 20]);
        let data = DynSolValue::Tuple(vec![
            DynSolValue::String("LOTE-001".into()),
            DynSolValue::Address(manufacturer),
            int8(-5),
            int8(8),
        ])
        .abi_encode_params();
        let topic0 = event_topic("LoteCreado(string,address,int8,int8)");

        let event = EventDecoder::new()
            .decode(&log(vec![topic0], data))
            .unwrap()
            .event;

        assert_eq!(event.kind, EventKind::LotCreated);
        assert_eq!(event.block_number, 42);
        assert_eq!(event.field(LOT_ID_FIELD), Some(&FieldValue::Str("LOTE-001".into())));
        assert_eq!(
            event.field("fabricante"),
            Some(&FieldValue::Address(format!("0x{}", "ab".repeat(20))))
        );
        assert_eq!(event.field("temperaturaMinima"), Some(&FieldValue::Int(-5)));
        assert_eq!(event.field("temperaturaMaxima"), Some(&FieldValue::Int(8)));
        let names: Vec<&str> = event.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["loteId", "fabricante", "temperaturaMinima", "temperaturaMaxima"]);
    }

    #[test]
    fn custody_transfer_reads_indexed_owners() {
        let from = Address::from([0x11; 20]);
        let to = Address::from([0xCD; 20]);
        let layout = EventLayout::for_kind(EventKind::CustodyTransferred);
        let data = DynSolValue::Tuple(vec![DynSolValue::Bool(false)]).abi_encode_params();

        let event = EventDecoder::new()
            .decode(&log(vec![layout.topic0, address_topic(from), address_topic(to)], data))
            .unwrap()
            .event;

        assert_eq!(event.kind, EventKind::CustodyTransferred);
        assert_eq!(
            event.field("propietarioAnterior").and_then(FieldValue::as_str),
            Some(format!("0x{}", "11".repeat(20)).as_str())
        );
        assert_eq!(
            event.field("nuevoPropietario").and_then(FieldValue::as_str),
            Some(format!("0x{}", "cd".repeat(20)).as_str())
        );
        assert_eq!(event.field("comprometido"), Some(&FieldValue::Bool(false)));
    }

    #[test]
    fn lot_compromised_keeps_declaration_order() {
        let owner = Address::from([0x22; 20]);
        let layout = EventLayout::for_kind(EventKind::LotCompromised);
        let data = DynSolValue::Tuple(vec![
            int8(-30),
            int8(12),
            DynSolValue::Bool(true),
            DynSolValue::String("temperatura fuera de rango".into()),
        ])
        .abi_encode_params();

        let decoded = EventDecoder::new()
            .decode(&log(vec![layout.topic0, address_topic(owner)], data))
            .unwrap();
        assert!(decoded.is_complete());
        let event = decoded.event;

        let names: Vec<&str> = event.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["propietario", "tempMin", "tempMax", "comprometido", "motivo"]);
        assert_eq!(event.field("tempMin"), Some(&FieldValue::Int(-30)));
        assert_eq!(
            event.field("motivo"),
            Some(&FieldValue::Str("temperatura fuera de rango".into()))
        );
    }

    #[test]
    fn unknown_topic_is_not_an_event() {
        let topic0 = event_topic("Transfer(address,address,uint256)");
        assert!(EventDecoder::new().decode(&log(vec![topic0], vec![])).is_none());
        assert!(EventDecoder::new().decode(&log(vec![], vec![])).is_none());
    }

    #[test]
    fn truncated_payload_keeps_event_without_data_fields() {
        let layout = EventLayout::for_kind(EventKind::LotCreated);
        let decoded = EventDecoder::new()
            .decode(&log(vec![layout.topic0], vec![0u8; 16]))
            .unwrap();

        assert_eq!(decoded.event.kind, EventKind::LotCreated);
        assert_eq!(decoded.event.block_number, 42);
        assert_eq!(decoded.event.transaction_hash, "0xabc");
        assert!(decoded.event.fields.is_empty());
        assert!(matches!(
            decoded.issues.as_slice(),
            [DecodeError::Abi { event: EventKind::LotCreated, .. }]
        ));
    }

    #[test]
    fn missing_indexed_topic_keeps_decoded_fields() {
        let from = Address::from([0x11; 20]);
        let layout = EventLayout::for_kind(EventKind::CustodyTransferred);
        let data = DynSolValue::Tuple(vec![DynSolValue::Bool(true)]).abi_encode_params();
        let decoded = EventDecoder::new()
            .decode(&log(vec![layout.topic0, address_topic(from)], data))
            .unwrap();

        assert!(!decoded.is_complete());
        assert!(matches!(
            decoded.issues.as_slice(),
            [DecodeError::MissingTopics { expected: 2, got: 1, .. }]
        ));
        let names: Vec<&str> = decoded.event.fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["propietarioAnterior", "comprometido"]);
        assert_eq!(decoded.event.field("comprometido"), Some(&FieldValue::Bool(true)));
    }
}

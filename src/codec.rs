
//! Wire encoding: a variant-tagged dictionary, one shape per operation
//! kind. `origin` is omitted on the wire whenever it equals `prev` (the
//! common case of uncontested sequential insertion).

use crate::content::Content;
use crate::history::HistoryBuffer;
use crate::identifier::Identifier;
use crate::op::{DeleteFields, DelimiterFields, ImmutableObjectFields, InsertFields, Operation, OperationCore};
use crate::peer::PeerId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// A peer/op-number pair in its wire representation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncodedId {
    pub creator: String,
    pub op_number: u64,
}

impl From<&Identifier> for EncodedId {
    fn from(id: &Identifier) -> EncodedId {
        return EncodedId {
            creator: id.creator.as_str().to_string(),
            op_number: id.op_number,
        };
    }
}

impl From<&EncodedId> for Identifier {
    fn from(id: &EncodedId) -> Identifier {
        return Identifier::new(PeerId::new(id.creator.clone()), id.op_number);
    }
}

/// The wire form of an operation, defined only over executed operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EncodedOp {
    Delete {
        uid: EncodedId,
        deletes: EncodedId,
    },
    Insert {
        uid: EncodedId,
        prev: EncodedId,
        next: EncodedId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<EncodedId>,
    },
    ImmutableObject {
        uid: EncodedId,
        prev: EncodedId,
        next: EncodedId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        origin: Option<EncodedId>,
        content: Vec<u8>,
    },
    Delimiter {
        uid: EncodedId,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        prev: Option<EncodedId>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        next: Option<EncodedId>,
    },
}

impl EncodedOp {
    pub fn uid(&self) -> Identifier {
        let encoded = match self {
            EncodedOp::Delete { uid, .. } => uid,
            EncodedOp::Insert { uid, .. } => uid,
            EncodedOp::ImmutableObject { uid, .. } => uid,
            EncodedOp::Delimiter { uid, .. } => uid,
        };
        return Identifier::from(encoded);
    }
}

/// Encode an already-executed operation for transmission. Panics if the
/// operation has not yet executed — encoding an unresolved operation is a
/// programming error in this crate, never a condition a caller can hit
/// through the public API.
pub fn encode(history: &HistoryBuffer, id: &Identifier) -> EncodedOp {
    let op = history.get(id).expect("encode called on an unknown identifier");
    assert!(
        op.core().is_executed,
        "encode called on an operation that has not executed yet: {id:?}"
    );

    return match op {
        Operation::Delete(DeleteFields { deletes, .. }) => EncodedOp::Delete {
            uid: EncodedId::from(id),
            deletes: EncodedId::from(deletes),
        },
        Operation::Insert(InsertFields { origin, prev_cl, next_cl, .. }) => EncodedOp::Insert {
            uid: EncodedId::from(id),
            prev: EncodedId::from(prev_cl),
            next: EncodedId::from(next_cl),
            origin: if origin == prev_cl { None } else { Some(EncodedId::from(origin)) },
        },
        Operation::ImmutableObject(ImmutableObjectFields {
            insert: InsertFields { origin, prev_cl, next_cl, .. },
            content: Content(bytes),
        }) => EncodedOp::ImmutableObject {
            uid: EncodedId::from(id),
            prev: EncodedId::from(prev_cl),
            next: EncodedId::from(next_cl),
            origin: if origin == prev_cl { None } else { Some(EncodedId::from(origin)) },
            content: bytes.clone(),
        },
        Operation::Delimiter(DelimiterFields { prev_cl, next_cl, .. }) => EncodedOp::Delimiter {
            uid: EncodedId::from(id),
            prev: prev_cl.as_ref().map(EncodedId::from),
            next: next_cl.as_ref().map(EncodedId::from),
        },
    };
}

/// Parse a raw wire message (JSON bytes) into a fresh, not-yet-executed
/// `Operation`. This is the actual decode boundary from untrusted/external
/// input; a malformed message is dropped (`EngineError::Decode`) without
/// disturbing the rest of the history buffer.
pub fn decode_wire(bytes: &[u8]) -> Result<Operation, crate::error::EngineError> {
    let encoded: EncodedOp = serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "dropping malformed wire message");
        crate::error::EngineError::Decode(e.to_string())
    })?;
    return decode(&encoded);
}

/// Decode an already-typed wire operation into a fresh, not-yet-executed
/// `Operation`. Every reference field starts pending: `HistoryBuffer::validate`
/// is what actually confirms (or defers on) presence, the first time
/// `execute` runs on it.
pub fn decode(encoded: &EncodedOp) -> Result<Operation, crate::error::EngineError> {
    let id = encoded.uid();
    return Ok(match encoded {
        EncodedOp::Delete { deletes, .. } => {
            let deletes = Identifier::from(deletes);
            let mut pending = HashSet::new();
            pending.insert("deletes");
            Operation::Delete(DeleteFields {
                core: OperationCore::new(id, pending),
                deletes,
            })
        }
        EncodedOp::Insert { prev, next, origin, .. } => {
            let prev_cl = Identifier::from(prev);
            let next_cl = Identifier::from(next);
            let origin_id = origin.as_ref().map(Identifier::from).unwrap_or_else(|| prev_cl.clone());
            let mut pending = HashSet::new();
            pending.insert("prev_cl");
            pending.insert("next_cl");
            pending.insert("origin");
            Operation::Insert(InsertFields {
                core: OperationCore::new(id, pending),
                origin: origin_id,
                prev_cl,
                next_cl,
                deleted_by: smallvec::SmallVec::new(),
            })
        }
        EncodedOp::ImmutableObject { prev, next, origin, content, .. } => {
            let prev_cl = Identifier::from(prev);
            let next_cl = Identifier::from(next);
            let origin_id = origin.as_ref().map(Identifier::from).unwrap_or_else(|| prev_cl.clone());
            let mut pending = HashSet::new();
            pending.insert("prev_cl");
            pending.insert("next_cl");
            pending.insert("origin");
            Operation::ImmutableObject(ImmutableObjectFields {
                insert: InsertFields {
                    core: OperationCore::new(id, pending),
                    origin: origin_id,
                    prev_cl,
                    next_cl,
                    deleted_by: smallvec::SmallVec::new(),
                },
                content: Content(content.clone()),
            })
        }
        EncodedOp::Delimiter { prev, next, .. } => {
            let prev_cl = prev.as_ref().map(Identifier::from);
            let next_cl = next.as_ref().map(Identifier::from);
            let mut pending = HashSet::new();
            if prev_cl.is_some() {
                pending.insert("prev_cl");
            }
            if next_cl.is_some() {
                pending.insert("next_cl");
            }
            Operation::Delimiter(DelimiterFields {
                core: OperationCore::new(id, pending),
                prev_cl,
                next_cl,
            })
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{DelimiterFields, OperationCore};

    fn bootstrap() -> HistoryBuffer {
        let mut history = HistoryBuffer::new(PeerId::new("a"), None);
        history.put(Operation::Delimiter(DelimiterFields {
            core: OperationCore::new_executed(Identifier::head()),
            prev_cl: None,
            next_cl: Some(Identifier::tail()),
        }));
        history.put(Operation::Delimiter(DelimiterFields {
            core: OperationCore::new_executed(Identifier::tail()),
            prev_cl: Some(Identifier::head()),
            next_cl: None,
        }));
        return history;
    }

    #[test]
    fn immutable_object_round_trips_and_omits_origin_when_equal_to_prev() {
        let mut history = bootstrap();
        let id = Identifier::new(PeerId::new("a"), 0);
        history.put(Operation::ImmutableObject(ImmutableObjectFields {
            insert: InsertFields {
                core: OperationCore::new(id.clone(), HashSet::new()),
                origin: Identifier::head(),
                prev_cl: Identifier::head(),
                next_cl: Identifier::tail(),
                deleted_by: smallvec::SmallVec::new(),
            },
            content: Content::from("hi"),
        }));
        crate::integration::execute(&mut history, &id).unwrap();

        let encoded = encode(&history, &id);
        match &encoded {
            EncodedOp::ImmutableObject { origin, content, .. } => {
                assert!(origin.is_none());
                assert_eq!(content, b"hi");
            }
            other => panic!("expected ImmutableObject, got {other:?}"),
        }

        let json = serde_json::to_string(&encoded).unwrap();
        let back: EncodedOp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, encoded);

        let decoded = decode(&back).unwrap();
        assert_eq!(*decoded.id(), id);
    }

    #[test]
    fn delete_round_trips() {
        let encoded = EncodedOp::Delete {
            uid: EncodedId::from(&Identifier::new(PeerId::new("a"), 1)),
            deletes: EncodedId::from(&Identifier::new(PeerId::new("a"), 0)),
        };
        let json = serde_json::to_string(&encoded).unwrap();
        let back: EncodedOp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, encoded);
    }

    #[test]
    fn delimiter_round_trips_with_only_one_side_present() {
        let encoded = EncodedOp::Delimiter {
            uid: EncodedId::from(&Identifier::head()),
            prev: None,
            next: Some(EncodedId::from(&Identifier::tail())),
        };
        let json = serde_json::to_string(&encoded).unwrap();
        assert!(!json.contains("\"prev\""));
        let back: EncodedOp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, encoded);
    }

    #[test]
    fn decode_wire_round_trips_a_valid_message() {
        let id = Identifier::new(PeerId::new("a"), 0);
        let encoded = EncodedOp::Delete {
            uid: EncodedId::from(&Identifier::new(PeerId::new("a"), 1)),
            deletes: EncodedId::from(&id),
        };
        let bytes = serde_json::to_vec(&encoded).unwrap();
        let decoded = decode_wire(&bytes).unwrap();
        assert_eq!(decoded.kind(), crate::op::OpKind::Delete);
    }

    #[test]
    fn decode_wire_drops_malformed_messages_as_decode_error() {
        let err = decode_wire(b"not json").unwrap_err();
        assert!(matches!(err, crate::error::EngineError::Decode(_)));
    }
}

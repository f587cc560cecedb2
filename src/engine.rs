
//! `Engine`: the single-threaded, single-owner facade tying together the
//! history buffer, the integration routines, and the codec.

use crate::codec::{self, EncodedOp};
use crate::content::Content;
use crate::error::EngineError;
use crate::history::HistoryBuffer;
use crate::identifier::Identifier;
use crate::integration::{self, ExecOutcome};
use crate::op::{ImmutableObjectFields, InsertFields, Operation, OperationCore};
use crate::peer::PeerId;
use std::collections::{HashSet, VecDeque};
use tracing::trace;

/// Construction-time contract for bootstrapping an `Engine`.
pub struct EngineConfig {
    pub peer: PeerId,
    /// When set, seeds the identifier counter above any value this peer
    /// has already issued in a previous session. The host is responsible
    /// for persisting and supplying this; the core persists nothing.
    pub resume_counter: Option<u64>,
}

/// Owns the complete replicated state for one peer: the history buffer,
/// the complete list it encodes, and the set of execution listeners.
pub struct Engine {
    history: HistoryBuffer,
    listeners: Vec<Box<dyn FnMut(&EncodedOp)>>,
}

impl Engine {
    pub fn new(peer: PeerId) -> Engine {
        return Engine::with_config(EngineConfig { peer, resume_counter: None });
    }

    pub fn with_config(config: EngineConfig) -> Engine {
        let mut history = HistoryBuffer::new(config.peer, config.resume_counter);

        let head_id = Identifier::head();
        let tail_id = Identifier::tail();
        history.put(Operation::Delimiter(crate::op::DelimiterFields {
            core: OperationCore::new_executed(head_id.clone()),
            prev_cl: None,
            next_cl: Some(tail_id.clone()),
        }));
        history.put(Operation::Delimiter(crate::op::DelimiterFields {
            core: OperationCore::new_executed(tail_id),
            prev_cl: Some(head_id),
            next_cl: None,
        }));

        return Engine { history, listeners: Vec::new() };
    }

    pub fn peer(&self) -> &PeerId {
        return self.history.peer();
    }

    pub fn next_identifier(&mut self) -> Identifier {
        return self.history.next_identifier();
    }

    /// Register a listener invoked, in registration order, every time an
    /// operation (local or remote) finishes executing. A panicking
    /// listener propagates to the caller of whichever entry point
    /// triggered it.
    pub fn on_execute(&mut self, listener: impl FnMut(&EncodedOp) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Locally issue an insert with no payload, placed immediately after
    /// `after` in this replica's current view of the complete list.
    pub fn insert(&mut self, after: Identifier, content: Option<Content>) -> Result<Identifier, EngineError> {
        if !self.history.contains(&after) {
            return Err(EngineError::UnknownReference(after));
        }
        let id = self.history.next_identifier();
        let next = self
            .history
            .next_cl_of(&after)?
            .ok_or_else(|| EngineError::ImpossibleLinkage(after.clone()))?;

        let insert_fields = InsertFields {
            core: OperationCore::new(id.clone(), HashSet::new()),
            origin: after.clone(),
            prev_cl: after,
            next_cl: next,
            deleted_by: smallvec::SmallVec::new(),
        };
        let op = match content {
            Some(content) => Operation::ImmutableObject(ImmutableObjectFields { insert: insert_fields, content }),
            None => Operation::Insert(insert_fields),
        };

        self.history.put(op);
        self.run_to_fixpoint(id.clone())?;
        return Ok(id);
    }

    /// Locally issue a delete targeting `target`.
    pub fn delete(&mut self, target: Identifier) -> Result<Identifier, EngineError> {
        if !self.history.contains(&target) {
            return Err(EngineError::UnknownReference(target));
        }
        let id = self.history.next_identifier();
        self.history.put(Operation::Delete(crate::op::DeleteFields {
            core: OperationCore::new(id.clone(), HashSet::new()),
            deletes: target,
        }));
        self.run_to_fixpoint(id.clone())?;
        return Ok(id);
    }

    /// Receive an already-typed operation from a remote peer. At-least-once,
    /// out-of-order delivery safe: a duplicate is ignored, an operation
    /// whose dependencies haven't arrived yet is deferred until they do.
    pub fn receive(&mut self, encoded: &EncodedOp) -> Result<(), EngineError> {
        let op = codec::decode(encoded)?;
        return self.receive_operation(op);
    }

    /// Receive a raw wire message (JSON bytes) from a remote peer. Parses
    /// through `codec::decode_wire`, so a malformed message is dropped as
    /// `EngineError::Decode` without disturbing this replica's history.
    pub fn receive_wire(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let op = codec::decode_wire(bytes)?;
        return self.receive_operation(op);
    }

    fn receive_operation(&mut self, op: Operation) -> Result<(), EngineError> {
        let id = op.id().clone();
        if self.history.contains(&id) {
            return Ok(());
        }
        self.history.put(op);
        return self.run_to_fixpoint(id);
    }

    /// Drives `id` (and anything it unblocks) through the execution
    /// lifecycle to a fixpoint, firing execution listeners for everything
    /// that newly executes.
    fn run_to_fixpoint(&mut self, id: Identifier) -> Result<(), EngineError> {
        let mut worklist = VecDeque::new();
        worklist.push_back(id);

        while let Some(current) = worklist.pop_front() {
            match integration::execute(&mut self.history, &current)? {
                ExecOutcome::AlreadyExecuted => continue,
                ExecOutcome::Deferred => {
                    for missing in self.history.unresolved_refs(&current)? {
                        self.history.register_pending(missing, current.clone());
                    }
                }
                ExecOutcome::Executed => {
                    let encoded = codec::encode(&self.history, &current);
                    trace!(identity = ?current, "firing execution listeners");
                    for listener in self.listeners.iter_mut() {
                        listener(&encoded);
                    }
                    worklist.extend(self.history.take_awaiting(&current));
                }
            }
        }
        return Ok(());
    }

    /// The visible (non-tombstoned) content, in CL order, as a flat byte
    /// sequence. Plain `Insert` operations (no payload) contribute nothing.
    pub fn visible_content(&self) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        for id in self.history.iter_visible()? {
            if let Some(Content(bytes)) = self.history.content(&id)? {
                out.extend_from_slice(bytes);
            }
        }
        return Ok(out);
    }

    pub fn visible_identifiers(&self) -> Result<Vec<Identifier>, EngineError> {
        return self.history.iter_visible();
    }

    pub fn history(&self) -> &HistoryBuffer {
        return &self.history;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_delete_round_trip_through_wire_format() {
        let mut a = Engine::new(PeerId::new("a"));
        let mut b = Engine::new(PeerId::new("b"));

        let outgoing = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = outgoing.clone();
        a.on_execute(move |op| sink.borrow_mut().push(op.clone()));

        let first = a.insert(Identifier::head(), Some(Content::from("h"))).unwrap();
        a.insert(first, Some(Content::from("i"))).unwrap();

        for op in outgoing.borrow().iter() {
            b.receive(op).unwrap();
        }

        assert_eq!(a.visible_content().unwrap(), b.visible_content().unwrap());
        assert_eq!(b.visible_content().unwrap(), b"hi");
    }

    #[test]
    fn out_of_order_delivery_converges() {
        let mut a = Engine::new(PeerId::new("a"));
        let first = a.insert(Identifier::head(), Some(Content::from("x"))).unwrap();
        let second = a.insert(first, Some(Content::from("y"))).unwrap();

        let second_encoded = codec::encode(&a.history, &second);
        let first_encoded = codec::encode(&a.history, &first);

        let mut b = Engine::new(PeerId::new("a_replica"));
        // deliver the later op first
        b.receive(&second_encoded).unwrap();
        assert_eq!(b.visible_content().unwrap(), Vec::<u8>::new());
        b.receive(&first_encoded).unwrap();
        assert_eq!(b.visible_content().unwrap(), b"xy");
    }

    #[test]
    fn unknown_local_reference_is_rejected() {
        let mut a = Engine::new(PeerId::new("a"));
        let bogus = Identifier::new(PeerId::new("ghost"), 99);
        assert!(matches!(a.insert(bogus, None), Err(EngineError::UnknownReference(_))));
    }

    #[test]
    fn receive_wire_parses_raw_json_and_converges() {
        let mut a = Engine::new(PeerId::new("a"));
        let first = a.insert(Identifier::head(), Some(Content::from("h"))).unwrap();
        a.insert(first, Some(Content::from("i"))).unwrap();

        let mut b = Engine::new(PeerId::new("b"));
        for id in a.visible_identifiers().unwrap() {
            let encoded = codec::encode(&a.history, &id);
            let bytes = serde_json::to_vec(&encoded).unwrap();
            b.receive_wire(&bytes).unwrap();
        }
        assert_eq!(b.visible_content().unwrap(), b"hi");
    }

    #[test]
    fn receive_wire_surfaces_malformed_message_as_decode_error() {
        let mut a = Engine::new(PeerId::new("a"));
        assert!(matches!(a.receive_wire(b"garbage"), Err(EngineError::Decode(_))));
    }
}

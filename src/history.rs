
//! The history buffer: the append-only, never-compacted store of every
//! operation this replica has ever seen, plus the pending-dependency
//! index used to wake deferred operations.

use crate::content::Content;
use crate::error::EngineError;
use crate::identifier::Identifier;
use crate::op::{Operation, OpKind};
use crate::peer::PeerId;
use rustc_hash::FxHashMap;
use std::collections::HashSet;
use tracing::error;

/// Owns every operation this replica knows about. Linked-list and
/// dependency fields are identifier handles resolved through this buffer,
/// never owning pointers — see the module doc on `crate::op`.
pub struct HistoryBuffer {
    peer: PeerId,
    next_op_number: u64,
    ops: FxHashMap<Identifier, Operation>,
    /// missing identifier -> operations blocked waiting on it
    pending_index: FxHashMap<Identifier, Vec<Identifier>>,
}

impl HistoryBuffer {
    pub fn new(peer: PeerId, resume_counter: Option<u64>) -> HistoryBuffer {
        return HistoryBuffer {
            peer,
            next_op_number: resume_counter.unwrap_or(0),
            ops: FxHashMap::default(),
            pending_index: FxHashMap::default(),
        };
    }

    pub fn peer(&self) -> &PeerId {
        return &self.peer;
    }

    /// Issue the next identifier for this replica's own peer. Strictly
    /// monotonic for the lifetime of this buffer.
    pub fn next_identifier(&mut self) -> Identifier {
        let op_number = self.next_op_number;
        self.next_op_number += 1;
        return Identifier::new(self.peer.clone(), op_number);
    }

    pub fn contains(&self, id: &Identifier) -> bool {
        return self.ops.contains_key(id);
    }

    pub fn get(&self, id: &Identifier) -> Option<&Operation> {
        return self.ops.get(id);
    }

    fn require(&self, id: &Identifier) -> Result<&Operation, EngineError> {
        return self.ops.get(id).ok_or_else(|| {
            error!(identity = ?id, "impossible linkage: identifier not present in history");
            EngineError::ImpossibleLinkage(id.clone())
        });
    }

    fn require_mut(&mut self, id: &Identifier) -> Result<&mut Operation, EngineError> {
        return self.ops.get_mut(id).ok_or_else(|| {
            error!(identity = ?id, "impossible linkage: identifier not present in history");
            EngineError::ImpossibleLinkage(id.clone())
        });
    }

    /// Register a freshly constructed operation. A duplicate identifier
    /// (the same operation delivered twice) is silently ignored — wire
    /// delivery is at-least-once and this keeps `receive` idempotent.
    pub fn put(&mut self, op: Operation) {
        self.ops.entry(op.id().clone()).or_insert(op);
    }

    pub fn kind(&self, id: &Identifier) -> Result<OpKind, EngineError> {
        return Ok(self.require(id)?.kind());
    }

    pub fn is_executed(&self, id: &Identifier) -> Result<bool, EngineError> {
        return Ok(self.require(id)?.core().is_executed);
    }

    /// Marks the operation executed and fires its `"execute"` listeners
    /// (registered via `OperationCore::on`), in registration order. Only
    /// ever called once per operation — `execute`'s `is_executed` guard
    /// keeps this from firing twice on re-delivery.
    pub fn mark_executed(&mut self, id: &Identifier) -> Result<(), EngineError> {
        let core = self.require_mut(id)?.core_mut();
        core.is_executed = true;
        core.call_event("execute", &());
        return Ok(());
    }

    /// Re-check every pending reference field against the current buffer
    /// contents, resolving whichever now exist. Returns `true` once the
    /// operation is fully resolved.
    pub fn validate(&mut self, id: &Identifier) -> Result<bool, EngineError> {
        let op = self.require(id)?;
        let candidates: Vec<(&'static str, Identifier)> = op
            .core()
            .pending_fields()
            .map(|name| (name, op.field_value(name)))
            .collect();

        let mut still_pending = HashSet::new();
        for (name, target) in candidates {
            if !self.ops.contains_key(&target) {
                still_pending.insert(name);
            }
        }

        let op = self.require_mut(id)?;
        op.core_mut().set_pending(still_pending);
        return Ok(op.core().is_resolved());
    }

    /// The identifiers this operation is still waiting on, after `validate`
    /// has been called.
    pub fn unresolved_refs(&self, id: &Identifier) -> Result<Vec<Identifier>, EngineError> {
        let op = self.require(id)?;
        return Ok(op.core().pending_fields().map(|name| op.field_value(name)).collect());
    }

    pub fn register_pending(&mut self, missing: Identifier, blocked: Identifier) {
        self.pending_index.entry(missing).or_default().push(blocked);
    }

    /// Drain and return every operation that was waiting on `id`.
    pub fn take_awaiting(&mut self, id: &Identifier) -> Vec<Identifier> {
        return self.pending_index.remove(id).unwrap_or_default();
    }

    // -- linked-list accessors -------------------------------------------------

    pub fn prev_cl_of(&self, id: &Identifier) -> Result<Option<Identifier>, EngineError> {
        let op = self.require(id)?;
        return Ok(match op {
            Operation::Insert(f) => Some(f.prev_cl.clone()),
            Operation::ImmutableObject(f) => Some(f.insert.prev_cl.clone()),
            Operation::Delimiter(f) => f.prev_cl.clone(),
            Operation::Delete(_) => None,
        });
    }

    pub fn next_cl_of(&self, id: &Identifier) -> Result<Option<Identifier>, EngineError> {
        let op = self.require(id)?;
        return Ok(match op {
            Operation::Insert(f) => Some(f.next_cl.clone()),
            Operation::ImmutableObject(f) => Some(f.insert.next_cl.clone()),
            Operation::Delimiter(f) => f.next_cl.clone(),
            Operation::Delete(_) => None,
        });
    }

    pub fn origin_of(&self, id: &Identifier) -> Result<Identifier, EngineError> {
        let op = self.require(id)?;
        return match op.insert_fields() {
            Some(f) => Ok(f.origin.clone()),
            None => Err(EngineError::ImpossibleLinkage(id.clone())),
        };
    }

    pub fn set_next_cl(&mut self, id: &Identifier, next: Identifier) -> Result<(), EngineError> {
        let op = self.require_mut(id)?;
        match op {
            Operation::Insert(f) => f.next_cl = next,
            Operation::ImmutableObject(f) => f.insert.next_cl = next,
            Operation::Delimiter(f) => f.next_cl = Some(next),
            Operation::Delete(_) => return Err(EngineError::ImpossibleLinkage(id.clone())),
        }
        return Ok(());
    }

    pub fn set_prev_cl(&mut self, id: &Identifier, prev: Identifier) -> Result<(), EngineError> {
        let op = self.require_mut(id)?;
        match op {
            Operation::Insert(f) => f.prev_cl = prev,
            Operation::ImmutableObject(f) => f.insert.prev_cl = prev,
            Operation::Delimiter(f) => f.prev_cl = Some(prev),
            Operation::Delete(_) => return Err(EngineError::ImpossibleLinkage(id.clone())),
        }
        return Ok(());
    }

    pub fn set_insert_links(
        &mut self,
        id: &Identifier,
        prev: Identifier,
        next: Identifier,
    ) -> Result<(), EngineError> {
        let op = self.require_mut(id)?;
        match op {
            Operation::Insert(f) => {
                f.prev_cl = prev;
                f.next_cl = next;
            }
            Operation::ImmutableObject(f) => {
                f.insert.prev_cl = prev;
                f.insert.next_cl = next;
            }
            _ => return Err(EngineError::ImpossibleLinkage(id.clone())),
        }
        return Ok(());
    }

    pub fn deletes_target(&self, id: &Identifier) -> Result<Identifier, EngineError> {
        let op = self.require(id)?;
        return match op {
            Operation::Delete(f) => Ok(f.deletes.clone()),
            _ => Err(EngineError::ImpossibleLinkage(id.clone())),
        };
    }

    pub fn append_deleted_by(&mut self, target: &Identifier, deleter: Identifier) -> Result<(), EngineError> {
        let op = self.require_mut(target)?;
        match op.insert_fields_mut() {
            Some(f) => f.deleted_by.push(deleter),
            None => return Err(EngineError::ImpossibleLinkage(target.clone())),
        }
        return Ok(());
    }

    pub fn is_tombstoned(&self, id: &Identifier) -> Result<bool, EngineError> {
        let op = self.require(id)?;
        return match op.insert_fields() {
            Some(f) => Ok(f.is_deleted()),
            None => Err(EngineError::ImpossibleLinkage(id.clone())),
        };
    }

    pub fn content(&self, id: &Identifier) -> Result<Option<&Content>, EngineError> {
        let op = self.require(id)?;
        return match op {
            Operation::ImmutableObject(f) => Ok(Some(&f.content)),
            Operation::Insert(_) => Ok(None),
            _ => Err(EngineError::ImpossibleLinkage(id.clone())),
        };
    }

    /// Iterate every live (non-tombstoned) insert from HEAD to TAIL, in CL
    /// order, yielding their identifiers.
    pub fn iter_visible(&self) -> Result<Vec<Identifier>, EngineError> {
        let mut out = Vec::new();
        let mut cur = Identifier::head();
        loop {
            let next = self
                .next_cl_of(&cur)?
                .ok_or_else(|| EngineError::ImpossibleLinkage(cur.clone()))?;
            if next.is_tail() {
                break;
            }
            if !self.is_tombstoned(&next)? {
                out.push(next.clone());
            }
            cur = next;
        }
        return Ok(out);
    }
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
    fn next_identifier_is_monotonic() {
        let mut history = bootstrap();
        let a = history.next_identifier();
        let b = history.next_identifier();
        assert!(a < b);
    }

    #[test]
    fn resume_counter_seeds_above_prior_values() {
        let mut history = HistoryBuffer::new(PeerId::new("a"), Some(42));
        assert_eq!(history.next_identifier().op_number, 42);
    }

    #[test]
    fn empty_cl_has_head_pointing_directly_to_tail() {
        let history = bootstrap();
        assert!(history.iter_visible().unwrap().is_empty());
    }

    #[test]
    fn duplicate_put_is_ignored() {
        let mut history = bootstrap();
        let before = history.ops.len();
        history.put(Operation::Delimiter(DelimiterFields {
            core: OperationCore::new_executed(Identifier::head()),
            prev_cl: None,
            next_cl: None,
        }));
        assert_eq!(history.ops.len(), before);
        // the original linkage survives, not the ignored duplicate's None
        assert_eq!(history.next_cl_of(&Identifier::head()).unwrap(), Some(Identifier::tail()));
    }
}


//! The operation algebra: `Insert`, `ImmutableObject`, `Delete`, `Delimiter`.
//!
//! Every variant embeds an `OperationCore` carrying the envelope common to
//! all operations: identity, execution state, the optional bubbling
//! parent, the set of not-yet-confirmed reference fields, and per-event
//! listeners. Linked-list and dependency fields (`prev_cl`, `next_cl`,
//! `origin`, `deletes`) are stored as plain `Identifier`s — never as
//! owning pointers to other operations — and are always dereferenced
//! through the `HistoryBuffer` that owns them.

use crate::content::Content;
use crate::identifier::Identifier;
use smallvec::SmallVec;
use std::any::Any;
use std::collections::HashSet;
use std::fmt;

/// A listener registered against a named event on a single operation.
pub type EventListener = Box<dyn FnMut(&dyn Any)>;

/// Envelope shared by every operation variant.
pub struct OperationCore {
    pub id: Identifier,
    pub is_executed: bool,
    /// Event bubbling target. Unused by this core's own logic; exposed for
    /// a host that wants to bubble events upward through a parent op.
    pub parent: Option<Identifier>,
    pending: HashSet<&'static str>,
    listeners: std::collections::HashMap<String, Vec<EventListener>>,
}

impl fmt::Debug for OperationCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("OperationCore")
            .field("id", &self.id)
            .field("is_executed", &self.is_executed)
            .field("pending", &self.pending)
            .finish();
    }
}

impl OperationCore {
    pub fn new(id: Identifier, pending: HashSet<&'static str>) -> OperationCore {
        return OperationCore {
            id,
            is_executed: false,
            parent: None,
            pending,
            listeners: std::collections::HashMap::new(),
        };
    }

    /// Construct a core that is already fully resolved and executed — used
    /// only for the bootstrap HEAD/TAIL delimiters, which have no
    /// dependencies to wait on.
    pub fn new_executed(id: Identifier) -> OperationCore {
        let mut core = OperationCore::new(id, HashSet::new());
        core.is_executed = true;
        return core;
    }

    pub fn is_resolved(&self) -> bool {
        return self.pending.is_empty();
    }

    pub(crate) fn pending_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        return self.pending.iter().copied();
    }

    pub(crate) fn set_pending(&mut self, pending: HashSet<&'static str>) {
        self.pending = pending;
    }

    /// Register a listener for `event`. Listeners fire synchronously, in
    /// registration order, and a panicking listener unwinds through the
    /// caller rather than being swallowed.
    pub fn on(&mut self, event: impl Into<String>, listener: EventListener) {
        self.listeners.entry(event.into()).or_default().push(listener);
    }

    pub fn call_event(&mut self, event: &str, arg: &dyn Any) {
        if let Some(listeners) = self.listeners.get_mut(event) {
            for listener in listeners.iter_mut() {
                listener(arg);
            }
        }
    }
}

/// Fields shared by `Insert` and `ImmutableObject` (which extends it with a
/// content payload).
#[derive(Debug)]
pub struct InsertFields {
    pub core: OperationCore,
    /// The left neighbor this operation was conceived relative to.
    /// Immutable once resolved — it records intent, not current position.
    pub origin: Identifier,
    /// Current left neighbor on the complete list. Starts as the
    /// construction-time snapshot used as the integration algorithm's
    /// search bound, and is overwritten with the true splice position once
    /// this operation executes.
    pub prev_cl: Identifier,
    /// Current right neighbor on the complete list. Same caveat as
    /// `prev_cl`.
    pub next_cl: Identifier,
    /// Identifiers of every `Delete` operation that has tombstoned this
    /// insert. Never cleared — history is append-only. Almost always zero
    /// or one entry, so this stays inline rather than heap-allocating.
    pub deleted_by: SmallVec<[Identifier; 1]>,
}

impl InsertFields {
    pub fn is_deleted(&self) -> bool {
        return !self.deleted_by.is_empty();
    }
}

#[derive(Debug)]
pub struct ImmutableObjectFields {
    pub insert: InsertFields,
    pub content: Content,
}

#[derive(Debug)]
pub struct DeleteFields {
    pub core: OperationCore,
    pub deletes: Identifier,
}

#[derive(Debug)]
pub struct DelimiterFields {
    pub core: OperationCore,
    /// `None` is a legitimate, permanent value for HEAD (it has no left
    /// neighbor), not an unresolved reference.
    pub prev_cl: Option<Identifier>,
    /// `None` is a legitimate, permanent value for TAIL (it has no right
    /// neighbor), not an unresolved reference.
    pub next_cl: Option<Identifier>,
}

/// The four operation variants.
#[derive(Debug)]
pub enum Operation {
    Insert(InsertFields),
    ImmutableObject(ImmutableObjectFields),
    Delete(DeleteFields),
    Delimiter(DelimiterFields),
}

/// The four operation kinds, without payload — used for dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    ImmutableObject,
    Delete,
    Delimiter,
}

impl Operation {
    pub fn id(&self) -> &Identifier {
        return &self.core().id;
    }

    pub fn kind(&self) -> OpKind {
        return match self {
            Operation::Insert(_) => OpKind::Insert,
            Operation::ImmutableObject(_) => OpKind::ImmutableObject,
            Operation::Delete(_) => OpKind::Delete,
            Operation::Delimiter(_) => OpKind::Delimiter,
        };
    }

    pub fn core(&self) -> &OperationCore {
        return match self {
            Operation::Insert(f) => &f.core,
            Operation::ImmutableObject(f) => &f.insert.core,
            Operation::Delete(f) => &f.core,
            Operation::Delimiter(f) => &f.core,
        };
    }

    pub fn core_mut(&mut self) -> &mut OperationCore {
        return match self {
            Operation::Insert(f) => &mut f.core,
            Operation::ImmutableObject(f) => &mut f.insert.core,
            Operation::Delete(f) => &mut f.core,
            Operation::Delimiter(f) => &mut f.core,
        };
    }

    pub fn insert_fields(&self) -> Option<&InsertFields> {
        return match self {
            Operation::Insert(f) => Some(f),
            Operation::ImmutableObject(f) => Some(&f.insert),
            _ => None,
        };
    }

    pub fn insert_fields_mut(&mut self) -> Option<&mut InsertFields> {
        return match self {
            Operation::Insert(f) => Some(f),
            Operation::ImmutableObject(f) => Some(&mut f.insert),
            _ => None,
        };
    }

    /// Look up the identifier currently stored under a named reference
    /// field. Panics on an unknown field name or variant mismatch — this is
    /// only ever called with names drawn from this same operation's own
    /// pending set, so such a mismatch is a programming error in this
    /// crate, not a runtime condition.
    pub(crate) fn field_value(&self, name: &str) -> Identifier {
        match (self, name) {
            (Operation::Insert(f), "origin") => f.origin.clone(),
            (Operation::Insert(f), "prev_cl") => f.prev_cl.clone(),
            (Operation::Insert(f), "next_cl") => f.next_cl.clone(),
            (Operation::ImmutableObject(f), "origin") => f.insert.origin.clone(),
            (Operation::ImmutableObject(f), "prev_cl") => f.insert.prev_cl.clone(),
            (Operation::ImmutableObject(f), "next_cl") => f.insert.next_cl.clone(),
            (Operation::Delete(f), "deletes") => f.deletes.clone(),
            (Operation::Delimiter(f), "prev_cl") => f
                .prev_cl
                .clone()
                .expect("prev_cl pending field implies prev_cl is Some"),
            (Operation::Delimiter(f), "next_cl") => f
                .next_cl
                .clone()
                .expect("next_cl pending field implies next_cl is Some"),
            _ => panic!("no such pending reference field {name:?} on {:?}", self.kind()),
        }
    }
}

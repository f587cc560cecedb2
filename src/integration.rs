
//! Reference resolution, the execution lifecycle, and the three per-kind
//! integration routines (insert placement, delete application, delimiter
//! attachment).

use crate::error::EngineError;
use crate::history::HistoryBuffer;
use crate::identifier::Identifier;
use crate::op::OpKind;
use std::cmp::Ordering;
use tracing::{debug, error, trace, trace_span};

/// Outcome of a single attempt to execute an operation.
#[derive(Debug, PartialEq, Eq)]
pub enum ExecOutcome {
    AlreadyExecuted,
    Executed,
    /// A soft outcome: some reference field could not be resolved against
    /// the current history. Never surfaced as an `EngineError`.
    Deferred,
}

/// Idempotent execution entry point. Validates pending references,
/// dispatches to the kind-specific integration routine on success, and
/// marks the operation executed.
pub fn execute(history: &mut HistoryBuffer, id: &Identifier) -> Result<ExecOutcome, EngineError> {
    let span = trace_span!("engine.execute", identity = ?id);
    let _enter = span.enter();

    if history.is_executed(id)? {
        return Ok(ExecOutcome::AlreadyExecuted);
    }

    if !history.validate(id)? {
        debug!(missing = ?history.unresolved_refs(id)?, "deferring operation, unresolved references");
        return Ok(ExecOutcome::Deferred);
    }

    match history.kind(id)? {
        OpKind::Insert | OpKind::ImmutableObject => integrate_insert(history, id)?,
        OpKind::Delete => integrate_delete(history, id)?,
        OpKind::Delimiter => integrate_delimiter(history, id)?,
    }

    history.mark_executed(id)?;
    trace!("executed");
    return Ok(ExecOutcome::Executed);
}

/// Number of `prev_cl` hops from `id` back to (but not including) its
/// origin. Zero iff `id.prev_cl == id.origin`.
fn distance_to_origin(history: &HistoryBuffer, id: &Identifier) -> Result<u64, EngineError> {
    let origin = history.origin_of(id)?;
    let mut count = 0u64;
    let mut cur = id.clone();
    loop {
        let prev = history.prev_cl_of(&cur)?.ok_or_else(|| {
            error!(identity = ?cur, "impossible linkage: no prev_cl while walking to origin");
            EngineError::ImpossibleLinkage(cur.clone())
        })?;
        assert_ne!(
            prev, cur,
            "insert {cur:?} has prev_cl pointing to itself; the replica that \
             constructed it violated the no-self-reference invariant"
        );
        if prev == origin {
            return Ok(count);
        }
        count += 1;
        cur = prev;
    }
}

/// Places a resolved `Insert`/`ImmutableObject` onto the complete list.
///
/// `prev_cl`/`next_cl` are read as the construction-time snapshot (the
/// issuer's left/right neighbor at the moment it was created) and used as
/// the scan's starting point and stopping boundary; they are overwritten
/// with the true splice position once the scan settles. This is the
/// deterministic three-case placement: operations scanned with an equal
/// distance-to-origin are ordered by creator, an
/// operation with a strictly smaller distance is walked past only if fewer
/// than that many hops have been taken since the last move, and an
/// operation with a strictly greater distance ends the scan immediately.
fn integrate_insert(history: &mut HistoryBuffer, id: &Identifier) -> Result<(), EngineError> {
    let given_prev = history.prev_cl_of(id)?.ok_or_else(|| {
        error!(identity = ?id, "impossible linkage: insert has no prev_cl at integration time");
        EngineError::ImpossibleLinkage(id.clone())
    })?;
    let given_next = history.next_cl_of(id)?.ok_or_else(|| {
        error!(identity = ?id, "impossible linkage: insert has no next_cl at integration time");
        EngineError::ImpossibleLinkage(id.clone())
    })?;

    let mut prev_cl = given_prev.clone();
    let first = history.next_cl_of(&prev_cl)?.ok_or_else(|| {
        error!(identity = ?prev_cl, "impossible linkage: prev_cl neighbor has no next_cl");
        EngineError::ImpossibleLinkage(prev_cl.clone())
    })?;
    if first == *id {
        // Already spliced in by a previous (now re-delivered) attempt.
        return Ok(());
    }

    let mut i: i64 = 0;
    let mut i_at_last_move: i64 = 0;
    let mut o = first;

    while o != given_next {
        let d = distance_to_origin(history, &o)? as i64;
        match d.cmp(&i) {
            Ordering::Equal => {
                if o.creator < id.creator {
                    prev_cl = o.clone();
                    i += 1;
                    i_at_last_move = i;
                }
            }
            Ordering::Less => {
                if (i - i_at_last_move) <= d {
                    prev_cl = o.clone();
                    i += 1;
                    i_at_last_move = i;
                }
            }
            Ordering::Greater => break,
        }
        i += 1;
        o = history.next_cl_of(&o)?.ok_or_else(|| {
            error!(identity = ?o, "impossible linkage: scan candidate has no next_cl");
            EngineError::ImpossibleLinkage(o.clone())
        })?;
    }

    let final_next = history.next_cl_of(&prev_cl)?.ok_or_else(|| {
        error!(identity = ?prev_cl, "impossible linkage: final splice neighbor has no next_cl");
        EngineError::ImpossibleLinkage(prev_cl.clone())
    })?;

    history.set_insert_links(id, prev_cl.clone(), final_next.clone())?;
    history.set_next_cl(&prev_cl, id.clone())?;
    history.set_prev_cl(&final_next, id.clone())?;
    return Ok(());
}

/// Applies a resolved `Delete`: appends this delete's own identity to the
/// target's `deleted_by` list. Re-executing the same delete is prevented
/// upstream by `execute`'s `is_executed` guard; two distinct deletes
/// targeting the same insert both append harmlessly.
fn integrate_delete(history: &mut HistoryBuffer, id: &Identifier) -> Result<(), EngineError> {
    let target = history.deletes_target(id)?;
    history.append_deleted_by(&target, id.clone())?;
    return Ok(());
}

/// Attaches a resolved `Delimiter`. In ordinary operation HEAD and TAIL are
/// constructed directly at bootstrap and never pass through here; this
/// exists so a delimiter arriving through the generic decode/execute path
/// (e.g. full-history replay) attaches the same way any other operation
/// would. Exactly one of `prev_cl`/`next_cl` is ever actually mutated by
/// this routine — the other side is either the permanently-absent sentinel
/// edge or was already supplied at construction.
fn integrate_delimiter(history: &mut HistoryBuffer, id: &Identifier) -> Result<(), EngineError> {
    let prev = history.prev_cl_of(id)?;
    let next = history.next_cl_of(id)?;
    match (prev, next) {
        (None, Some(_)) => {
            // This is HEAD: no left neighbor by definition, right neighbor
            // already known. Nothing further to link.
            return Ok(());
        }
        (Some(p), None) => {
            // This is TAIL: attach as p's right neighbor, unless p already
            // has one (two delimiters both claiming the same left anchor).
            if history.next_cl_of(&p)?.is_some() {
                error!(identity = ?p, delimiter = ?id, "duplicate operation: left anchor already has a right neighbor");
                return Err(EngineError::DuplicateOperation(p));
            }
            history.set_next_cl(&p, id.clone())?;
            return Ok(());
        }
        (Some(_), Some(_)) => {
            // Both neighbors already known (e.g. re-delivery); nothing to do.
            return Ok(());
        }
        (None, None) => {
            error!(identity = ?id, "underspecified delimiter: neither prev_cl nor next_cl is known");
            return Err(EngineError::UnderspecifiedDelimiter(id.clone()));
        }
    }
}


//! Error kinds surfaced across the engine boundary.
//!
//! `UnresolvedReference` is deliberately absent here: it is a soft,
//! expected outcome of out-of-order delivery, not a fault. It never leaves
//! the engine as a public error (see `crate::integration::ExecOutcome`).

use crate::identifier::Identifier;

/// Failures that can cross the public `Engine` boundary.
///
/// The three fatal variants indicate the replica's history has become
/// internally inconsistent (a peer violated the uniqueness invariant, or
/// constructed an impossible linkage) and, per the engine's own docs,
/// a host embedding this core should treat them as unrecoverable for the
/// affected replica rather than attempt to paper over them.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("duplicate operation: {0:?} is already linked")]
    DuplicateOperation(Identifier),

    #[error("impossible linkage while walking from {0:?}")]
    ImpossibleLinkage(Identifier),

    #[error("delimiter {0:?} has neither prev_cl nor next_cl")]
    UnderspecifiedDelimiter(Identifier),

    #[error("failed to decode operation: {0}")]
    Decode(String),

    /// Raised by the local issuance entry points (`insert`/`delete`) when
    /// the caller names an identifier that has never been seen by this
    /// replica. Not part of the wire-receive contract, which only ever
    /// defers on an unseen reference rather than rejecting it outright.
    #[error("reference {0:?} is not present in this replica's history")]
    UnknownReference(Identifier),
}

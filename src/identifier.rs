
//! Globally unique operation identities.

use crate::peer::PeerId;
use std::cmp::Ordering;
use std::fmt;

/// Identifies a single operation: the peer that created it, and a
/// strictly-monotonic counter local to that peer.
///
/// Two identifiers are equal iff both fields are equal. Ordering compares
/// `creator` first, then `op_number` — this is the ordering the integration
/// algorithm's tie-break rule relies on.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub creator: PeerId,
    pub op_number: u64,
}

impl Identifier {
    pub fn new(creator: PeerId, op_number: u64) -> Identifier {
        return Identifier { creator, op_number };
    }

    /// The well-known left sentinel, identical on every replica.
    pub fn head() -> Identifier {
        return Identifier::new(PeerId::sentinel(), 0);
    }

    /// The well-known right sentinel, identical on every replica.
    pub fn tail() -> Identifier {
        return Identifier::new(PeerId::sentinel(), 1);
    }

    pub fn is_head(&self) -> bool {
        return *self == Identifier::head();
    }

    pub fn is_tail(&self) -> bool {
        return *self == Identifier::tail();
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{:?}#{}", self.creator, self.op_number);
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> Ordering {
        return match self.creator.cmp(&other.creator) {
            Ordering::Equal => self.op_number.cmp(&other.op_number),
            ord => ord,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_and_tail_are_distinct_and_stable() {
        assert_ne!(Identifier::head(), Identifier::tail());
        assert_eq!(Identifier::head(), Identifier::head());
    }

    #[test]
    fn ordering_prefers_creator_over_op_number() {
        let a = Identifier::new(PeerId::new("a"), 5);
        let b = Identifier::new(PeerId::new("b"), 0);
        assert!(a < b);
    }

    #[test]
    fn ordering_falls_back_to_op_number() {
        let a = Identifier::new(PeerId::new("a"), 1);
        let b = Identifier::new(PeerId::new("a"), 2);
        assert!(a < b);
    }
}


//! concord - a replicated, conflict-free ordered sequence engine.
//!
//! There is no central coordinator: every replica independently receives
//! operations in whatever order they arrive and converges to the same
//! visible sequence regardless of delivery order, per the strong eventual
//! consistency properties exercised in `tests/engine_conformance.rs`.
//!
//! # Quick Start
//!
//! ```
//! use concord::{Engine, PeerId, Content, Identifier};
//!
//! let mut engine = Engine::new(PeerId::new("alice"));
//! let first = engine.insert(Identifier::head(), Some(Content::from("h"))).unwrap();
//! engine.insert(first, Some(Content::from("i"))).unwrap();
//! assert_eq!(engine.visible_content().unwrap(), b"hi");
//! ```

pub mod codec;
pub mod content;
pub mod engine;
pub mod error;
pub mod history;
pub mod identifier;
pub mod integration;
pub mod op;
pub mod peer;

pub use codec::{decode, encode, EncodedId, EncodedOp};
pub use content::Content;
pub use engine::{Engine, EngineConfig};
pub use error::EngineError;
pub use history::HistoryBuffer;
pub use identifier::Identifier;
pub use op::{Operation, OpKind};
pub use peer::PeerId;

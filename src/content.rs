
//! Transport-opaque payload carried by `ImmutableObject` operations.

use serde::{Deserialize, Serialize};

/// An immutable, opaque payload. The engine never inspects or interprets
/// these bytes; a higher layer (e.g. a text or rich-document binding)
/// defines their meaning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content(pub Vec<u8>);

impl Content {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Content {
        return Content(bytes.into());
    }

    pub fn as_bytes(&self) -> &[u8] {
        return &self.0;
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Content {
        return Content(s.as_bytes().to_vec());
    }
}

impl From<String> for Content {
    fn from(s: String) -> Content {
        return Content(s.into_bytes());
    }
}

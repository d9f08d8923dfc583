//! Key and value encoding
//!
//! Keys and values are stored as text. The key column is the table's primary
//! key, so iteration order is the lexicographic order of encoded keys. For
//! string keys under [`JsonCodec`] that is the order of the strings
//! themselves; for integers it is the order of their decimal text.
//!
//! # Example
//!
//! ```
//! use kvstore_core::codec::{Codec, JsonCodec};
//! use serde::{Deserialize, Serialize};
//!
//! # fn main() -> kvstore_core::Result<()> {
//! #[derive(Debug, PartialEq, Serialize, Deserialize)]
//! struct User {
//!     name: String,
//!     age: u32,
//! }
//!
//! let codec = JsonCodec;
//! let text = codec.encode(&User { name: "john".into(), age: 18 })?;
//! let user: User = codec.decode(&text)?;
//! assert_eq!(user.age, 18);
//! # Ok(())
//! # }
//! ```

use crate::{KvError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encoding capability for keys and values
///
/// Implementations must be deterministic and injective: equal inputs encode
/// to equal text, and distinct inputs to distinct text.
pub trait Codec: Send + Sync {
    /// Encode a key or value to text
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String>;

    /// Decode text produced by [`Codec::encode`]
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T>;

    /// Human-facing rendering of an encoded key, used for watch matching
    fn render_key(&self, encoded: &str) -> String {
        encoded.to_string()
    }

    /// Get the codec name
    fn name(&self) -> &str;
}

/// JSON codec (human-readable, structural)
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        serde_json::to_string(value).map_err(|e| KvError::Encoding(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        serde_json::from_str(text).map_err(|e| KvError::Encoding(e.to_string()))
    }

    /// JSON strings render without their quotes; everything else renders as
    /// its JSON text (`42`, `[1,2]`, `{"id":7}`).
    fn render_key(&self, encoded: &str) -> String {
        match serde_json::from_str::<String>(encoded) {
            Ok(s) => s,
            Err(_) => encoded.to_string(),
        }
    }

    fn name(&self) -> &str {
        "json"
    }
}

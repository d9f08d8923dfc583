//! kvstore Prelude
//!
//! Import this to get all commonly used types and traits:
//!
//! ```
//! use kvstore::prelude::*;
//! ```

// Core types
pub use crate::{ChangeEvent, ChangeKind, Direction, KvError, Result};

// Configs
pub use crate::{BackendConfig, PoolConfig, StoreConfig, SynchronousMode};

// Codecs
pub use crate::{Codec, JsonCodec};

// Implementations
pub use crate::{Backend, KvDb, Store};

// Watchers
pub use crate::{CancelHandle, Matcher};

// Transaction API
pub use crate::{Transaction, TransactionContext};

// Re-export common external deps
pub use anyhow;
pub use serde::{Deserialize, Serialize};
pub use std::ops::ControlFlow;
pub use std::sync::Arc;
pub use tracing;

//! kvstore core: types shared by every kvstore backend
//!
//! This crate defines the backend-independent pieces of the store:
//! - Error taxonomy ([`KvError`]) and the crate-wide [`Result`]
//! - Configuration for the backend, its connection pool and each store
//! - The [`Codec`] capability that turns keys and values into text
//! - Change events and the per-store [`WatcherRegistry`] that fans them out
//!
//! The SQLite backend lives in `kvstore-sqlite`; applications normally depend
//! on the `kvstore` facade instead of either crate directly.

pub mod codec;
pub mod config;
pub mod error;
pub mod observe;
pub mod types;
pub mod watch;

pub use codec::{Codec, JsonCodec};
pub use config::{BackendConfig, PoolConfig, StoreConfig, SynchronousMode};
pub use error::{KvError, Result};
pub use types::{ChangeEvent, ChangeKind, Direction};
pub use watch::{CancelHandle, Matcher, WatcherRegistry};

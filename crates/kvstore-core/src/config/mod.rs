pub mod backend;
pub mod location;
pub mod pool;
pub mod store;

pub use backend::{BackendConfig, SynchronousMode};
pub use pool::PoolConfig;
pub use store::StoreConfig;

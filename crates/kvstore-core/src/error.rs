use thiserror::Error;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Rollback failed while unwinding a unit of work that had already failed.
    ///
    /// `Display` carries the rollback failure; the unit of work's own error is
    /// reachable through `source()`.
    #[error("Rollback failed: {rollback} (original error: {source})")]
    RollbackFailed {
        rollback: String,
        #[source]
        source: Box<KvError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl KvError {
    /// True for reads of an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, KvError>;

// Custom Error Types:
//
// Work run inside a transaction returns `kvstore::Result<T>`. Any error
// implementing `std::error::Error + Send + Sync + 'static` converts into
// `KvError::Other` once wrapped in `anyhow::Error`:
//
// #[derive(thiserror::Error, Debug)]
// #[error("insufficient funds: have {have}, need {need}")]
// struct InsufficientFunds { have: i64, need: i64 }
//
// store.run_transaction(|tx| {
//     let have = tx.get("alice")?;
//     if have < 30 {
//         return Err(anyhow::Error::new(InsufficientFunds { have, need: 30 }).into());
//     }
//     tx.set("alice".to_string(), have - 30)?;
//     Ok(())
// })?;

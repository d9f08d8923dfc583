use serde::{Deserialize, Serialize};

/// Iteration order over encoded keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    /// Ascending encoded-key order
    #[default]
    Forward,
    /// Descending encoded-key order
    Backward,
}

impl Direction {
    /// SQL ordering keyword for this direction
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Forward => "ASC",
            Direction::Backward => "DESC",
        }
    }
}

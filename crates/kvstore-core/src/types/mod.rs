pub mod direction;
pub mod event;

pub use direction::Direction;
pub use event::{ChangeEvent, ChangeKind};

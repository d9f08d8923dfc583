use serde::{Deserialize, Serialize};

/// Kind of mutation recorded by a [`ChangeEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Set,
    Delete,
}

/// One mutation of a store, as delivered to matching subscriptions
///
/// `value` is the new value for `Set` and always `None` for `Delete`.
/// `replaced` tells whether a record existed before the mutation; `previous`
/// holds that record's value. A prior record whose value no longer decodes
/// as `V` shows up as `replaced: true` with `previous: None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<K, V> {
    pub kind: ChangeKind,
    pub key: K,
    pub value: Option<V>,
    pub previous: Option<V>,
    #[serde(default)]
    pub replaced: bool,
}

impl<K, V> ChangeEvent<K, V> {
    pub fn set(key: K, value: V, previous: Option<V>) -> Self {
        Self {
            kind: ChangeKind::Set,
            key,
            value: Some(value),
            replaced: previous.is_some(),
            previous,
        }
    }

    pub fn delete(key: K, previous: Option<V>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            key,
            value: None,
            replaced: previous.is_some(),
            previous,
        }
    }

    /// Override whether a prior record existed
    pub fn with_replaced(mut self, replaced: bool) -> Self {
        self.replaced = replaced;
        self
    }

    pub fn is_set(&self) -> bool {
        self.kind == ChangeKind::Set
    }

    pub fn is_delete(&self) -> bool {
        self.kind == ChangeKind::Delete
    }
}

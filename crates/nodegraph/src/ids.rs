//! Entity identity and the id → entity registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Generate a process-unique opaque id (a v4 UUID in simple hex form).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Discriminant for the kinds of items an editor surface can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Scene,
    Node,
    Socket,
    Wire,
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::Scene => write!(f, "scene"),
            ItemKind::Node => write!(f, "node"),
            ItemKind::Socket => write!(f, "socket"),
            ItemKind::Wire => write!(f, "wire"),
        }
    }
}

/// Where a registered id lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Scene,
    Node,
    /// A socket, with the id of the node that owns it.
    Socket { node: String },
    Wire,
}

impl EntityRef {
    pub fn kind(&self) -> ItemKind {
        match self {
            EntityRef::Scene => ItemKind::Scene,
            EntityRef::Node => ItemKind::Node,
            EntityRef::Socket { .. } => ItemKind::Socket,
            EntityRef::Wire => ItemKind::Wire,
        }
    }
}

/// A kind-tagged reference to a selectable item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub kind: ItemKind,
    pub id: String,
}

impl ItemRef {
    pub fn node(id: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Node,
            id: id.into(),
        }
    }

    pub fn wire(id: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::Wire,
            id: id.into(),
        }
    }
}

/// Registry resolving ids to entities in O(1).
///
/// Re-keying always removes the old id before inserting the new one, so a
/// restored id never leaves a stale entry behind.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    entries: HashMap<String, EntityRef>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&EntityRef> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, entity: EntityRef) {
        self.entries.insert(id.into(), entity);
    }

    pub fn remove(&mut self, id: &str) -> Option<EntityRef> {
        self.entries.remove(id)
    }

    /// Move an entry from `old` to `new`.
    pub fn rekey(&mut self, old: &str, new: &str, entity: EntityRef) {
        self.entries.remove(old);
        self.entries.insert(new.to_string(), entity);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Id of the node owning socket `id`, if `id` is a registered socket.
    pub fn socket_owner(&self, id: &str) -> Option<&str> {
        match self.entries.get(id) {
            Some(EntityRef::Socket { node }) => Some(node.as_str()),
            _ => None,
        }
    }
}

use crate::doc::Document;
use crate::error::{GraphError, Result};
use crate::ids::{EntityRef, IdMap, new_id};
use crate::serializable::Serializable;
use crate::types::{SocketPosition, SocketType};
use serde::{Deserialize, Serialize};

/// Mutable fields compared by the differ.
pub const SOCKET_FIELDS: [&str; 3] = ["index", "position", "socket_type"];

/// Persisted shape of a socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocketDoc {
    pub id: String,
    pub index: usize,
    pub position: SocketPosition,
    pub socket_type: SocketType,
}

/// A typed connection point on one side of a node.
#[derive(Debug, Clone)]
pub struct Socket {
    id: String,
    node: String,
    pub index: usize,
    pub position: SocketPosition,
    pub socket_type: SocketType,
    /// Number of sockets on the same side of the owning node.
    pub count_on_side: usize,
    wires: Vec<String>,
}

impl Socket {
    pub fn new(
        node: impl Into<String>,
        index: usize,
        position: SocketPosition,
        socket_type: SocketType,
        count_on_side: usize,
    ) -> Self {
        Self {
            id: new_id(),
            node: node.into(),
            index,
            position,
            socket_type,
            count_on_side,
            wires: Vec::new(),
        }
    }

    /// Build a socket from its persisted shape.
    pub fn from_doc(node: impl Into<String>, doc: &SocketDoc, count_on_side: usize) -> Self {
        Self {
            id: doc.id.clone(),
            node: node.into(),
            index: doc.index,
            position: doc.position,
            socket_type: doc.socket_type,
            count_on_side,
            wires: Vec::new(),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub(crate) fn set_node(&mut self, node: &str) {
        self.node = node.to_string();
    }

    pub fn is_output(&self) -> bool {
        self.position.is_output()
    }

    /// Ids of the wires attached to this socket.
    pub fn wires(&self) -> &[String] {
        &self.wires
    }

    pub fn has_wire(&self) -> bool {
        !self.wires.is_empty()
    }

    pub fn has_wire_id(&self, wire: &str) -> bool {
        self.wires.iter().any(|w| w == wire)
    }

    pub(crate) fn attach_wire(&mut self, wire: &str) {
        if !self.has_wire_id(wire) {
            self.wires.push(wire.to_string());
        }
    }

    pub(crate) fn detach_wire(&mut self, wire: &str) {
        self.wires.retain(|w| w != wire);
    }

    pub fn to_doc(&self) -> SocketDoc {
        SocketDoc {
            id: self.id.clone(),
            index: self.index,
            position: self.position,
            socket_type: self.socket_type,
        }
    }

    /// Apply one side of a socket change record.
    pub(crate) fn apply_change(&mut self, change: &Document, direction: crate::doc::Direction) {
        if let Some(v) = change
            .get("index")
            .and_then(|p| direction.pick(p))
            .and_then(|v| v.as_u64())
        {
            self.index = v as usize;
        }
        if let Some(p) = change
            .get("position")
            .and_then(|p| direction.pick(p))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
        {
            self.position = p;
        }
        if let Some(t) = change
            .get("socket_type")
            .and_then(|p| direction.pick(p))
            .and_then(|v| serde_json::from_value(v.clone()).ok())
        {
            self.socket_type = t;
        }
    }
}

impl Serializable for Socket {
    fn id(&self) -> &str {
        &self.id
    }

    fn serialize(&self) -> Document {
        serde_json::to_value(self.to_doc()).unwrap_or_default()
    }

    fn deserialize(&mut self, doc: &Document, registry: &mut IdMap, restore_id: bool) -> Result<()> {
        let parsed: SocketDoc = serde_json::from_value(doc.clone())
            .map_err(|e| GraphError::malformed(format!("socket: {}", e)))?;

        let entity = EntityRef::Socket {
            node: self.node.clone(),
        };
        if restore_id {
            registry.rekey(&self.id, &parsed.id, entity);
            self.id = parsed.id;
        } else {
            registry.rekey(&self.id, &self.id, entity);
        }
        self.index = parsed.index;
        self.position = parsed.position;
        self.socket_type = parsed.socket_type;
        Ok(())
    }
}

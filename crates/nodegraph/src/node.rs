use crate::content::{JsonContent, NodeContent};
use crate::doc::{Direction, Document};
use crate::error::{GraphError, Result};
use crate::ids::{EntityRef, IdMap, new_id};
use crate::serializable::Serializable;
use crate::socket::{Socket, SocketDoc};
use crate::types::{SocketPosition, SocketType};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Mutable fields compared by the differ.
pub const NODE_FIELDS: [&str; 5] = ["title", "pos_x", "pos_y", "content", "selected"];

/// Title given to nodes built by the default factory before their document
/// is applied.
pub const UNDEFINED_TITLE: &str = "Undefined Node";

#[derive(Deserialize)]
struct NodeFields {
    id: String,
    title: String,
    pos_x: f64,
    pos_y: f64,
    #[serde(default)]
    inputs: Vec<SocketDoc>,
    #[serde(default)]
    outputs: Vec<SocketDoc>,
    #[serde(default)]
    selected: bool,
    #[serde(default)]
    content: Value,
}

/// A graph vertex owning ordered input and output sockets.
#[derive(Debug)]
pub struct Node {
    id: String,
    pub title: String,
    pub x: f64,
    pub y: f64,
    inputs: Vec<Socket>,
    outputs: Vec<Socket>,
    content: Box<dyn NodeContent>,
    pub selected: bool,
    /// Edge new input sockets are created on.
    pub input_position: SocketPosition,
    /// Edge new output sockets are created on.
    pub output_position: SocketPosition,
    dirty: bool,
    invalid: bool,
}

impl Node {
    pub fn new(title: impl Into<String>) -> Self {
        Self::with_content(title, Box::new(JsonContent::default()))
    }

    pub fn with_content(title: impl Into<String>, content: Box<dyn NodeContent>) -> Self {
        Self {
            id: new_id(),
            title: title.into(),
            x: 0.0,
            y: 0.0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            content,
            selected: false,
            input_position: SocketPosition::LeftBottom,
            output_position: SocketPosition::RightTop,
            dirty: false,
            invalid: false,
        }
    }

    /// Append one socket per entry of `inputs` and `outputs`.
    pub fn with_sockets(mut self, inputs: &[SocketType], outputs: &[SocketType]) -> Self {
        for t in inputs {
            self.push_socket(*t, false);
        }
        for t in outputs {
            self.push_socket(*t, true);
        }
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn inputs(&self) -> &[Socket] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Socket] {
        &self.outputs
    }

    /// Inputs followed by outputs.
    pub fn sockets(&self) -> impl Iterator<Item = &Socket> {
        self.inputs.iter().chain(self.outputs.iter())
    }

    pub fn socket(&self, id: &str) -> Option<&Socket> {
        self.sockets().find(|s| s.id() == id)
    }

    pub(crate) fn socket_mut(&mut self, id: &str) -> Option<&mut Socket> {
        self.inputs
            .iter_mut()
            .chain(self.outputs.iter_mut())
            .find(|s| s.id() == id)
    }

    pub(crate) fn sockets_mut(&mut self) -> impl Iterator<Item = &mut Socket> {
        self.inputs.iter_mut().chain(self.outputs.iter_mut())
    }

    pub fn content(&self) -> &dyn NodeContent {
        self.content.as_ref()
    }

    pub(crate) fn content_mut(&mut self) -> &mut dyn NodeContent {
        self.content.as_mut()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        self.dirty = dirty;
    }

    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub fn set_invalid(&mut self, invalid: bool) {
        self.invalid = invalid;
    }

    fn side(&self, output: bool) -> &Vec<Socket> {
        if output { &self.outputs } else { &self.inputs }
    }

    pub(crate) fn side_mut(&mut self, output: bool) -> &mut Vec<Socket> {
        if output {
            &mut self.outputs
        } else {
            &mut self.inputs
        }
    }

    /// Append a socket at the end of one side. Returns its id.
    pub(crate) fn push_socket(&mut self, socket_type: SocketType, output: bool) -> String {
        let position = if output {
            self.output_position
        } else {
            self.input_position
        };
        let index = self.side(output).len();
        let socket = Socket::new(self.id.clone(), index, position, socket_type, index + 1);
        let id = socket.id().to_string();
        self.side_mut(output).push(socket);
        self.recount(output);
        id
    }

    /// Insert a socket keeping the side ordered by index.
    pub(crate) fn insert_socket(&mut self, socket: Socket) {
        let output = socket.is_output();
        let side = self.side_mut(output);
        let at = side
            .iter()
            .position(|s| s.index > socket.index)
            .unwrap_or(side.len());
        side.insert(at, socket);
        self.recount(output);
    }

    /// Detach a socket from this node without touching the others' indices.
    pub(crate) fn take_socket(&mut self, id: &str) -> Option<Socket> {
        for output in [false, true] {
            let side = self.side_mut(output);
            if let Some(pos) = side.iter().position(|s| s.id() == id) {
                let socket = side.remove(pos);
                self.recount(output);
                return Some(socket);
            }
        }
        None
    }

    /// Renumber one side 0..n in its current order.
    pub(crate) fn reindex(&mut self, output: bool) {
        for (i, s) in self.side_mut(output).iter_mut().enumerate() {
            s.index = i;
        }
    }

    fn recount(&mut self, output: bool) {
        let n = self.side(output).len();
        for s in self.side_mut(output) {
            s.count_on_side = n;
        }
    }

    /// Apply one side of a node change record to the scalar fields.
    ///
    /// Socket children are replayed by the scene, which also owns wires.
    pub(crate) fn apply_change(&mut self, change: &Document, direction: Direction) -> Result<()> {
        let pick = |key: &str| change.get(key).and_then(|p| direction.pick(p));
        if let Some(title) = pick("title").and_then(Value::as_str) {
            self.title = title.to_string();
        }
        if let Some(x) = pick("pos_x").and_then(Value::as_f64) {
            self.x = x;
        }
        if let Some(y) = pick("pos_y").and_then(Value::as_f64) {
            self.y = y;
        }
        if let Some(selected) = pick("selected").and_then(Value::as_bool) {
            self.selected = selected;
        }
        if let Some(content) = pick("content") {
            self.content.deserialize(content)?;
        }
        Ok(())
    }

    /// Full deserialization that also reports which live socket each socket
    /// document ended up in, keyed by the document's socket id.
    pub(crate) fn deserialize_with_remap(
        &mut self,
        doc: &Document,
        registry: &mut IdMap,
        restore_id: bool,
        remap: &mut HashMap<String, String>,
    ) -> Result<()> {
        let fields: NodeFields = serde_json::from_value(doc.clone())
            .map_err(|e| GraphError::malformed(format!("node: {}", e)))?;

        if restore_id {
            registry.rekey(&self.id, &fields.id, EntityRef::Node);
            self.id = fields.id;
        } else {
            registry.rekey(&self.id, &self.id, EntityRef::Node);
        }
        let node_id = self.id.clone();
        for s in self.sockets_mut() {
            s.set_node(&node_id);
        }

        self.title = fields.title;
        self.x = fields.pos_x;
        self.y = fields.pos_y;

        for (output, docs) in [(false, &fields.inputs), (true, &fields.outputs)] {
            let mut existing = std::mem::take(self.side_mut(output));
            let mut rebuilt = Vec::with_capacity(docs.len());
            for sdoc in docs {
                let matched = existing.iter().position(|s| {
                    s.index == sdoc.index
                        && s.position == sdoc.position
                        && s.socket_type == sdoc.socket_type
                });
                let mut socket = match matched {
                    Some(pos) => existing.remove(pos),
                    None => Socket::new(
                        node_id.clone(),
                        sdoc.index,
                        sdoc.position,
                        sdoc.socket_type,
                        docs.len(),
                    ),
                };
                let raw = serde_json::to_value(sdoc)?;
                socket.deserialize(&raw, registry, restore_id)?;
                remap.insert(sdoc.id.clone(), socket.id().to_string());
                rebuilt.push(socket);
            }
            for stale in existing {
                registry.remove(stale.id());
            }
            *self.side_mut(output) = rebuilt;
            self.recount(output);
        }

        self.selected = fields.selected;
        if !fields.content.is_null() {
            self.content.deserialize(&fields.content)?;
        }
        Ok(())
    }
}

impl Serializable for Node {
    fn id(&self) -> &str {
        &self.id
    }

    fn serialize(&self) -> Document {
        json!({
            "id": self.id,
            "title": self.title,
            "pos_x": self.x,
            "pos_y": self.y,
            "inputs": self.inputs.iter().map(Serializable::serialize).collect::<Vec<_>>(),
            "outputs": self.outputs.iter().map(Serializable::serialize).collect::<Vec<_>>(),
            "selected": self.selected,
            "content": self.content.serialize(),
        })
    }

    fn deserialize(&mut self, doc: &Document, registry: &mut IdMap, restore_id: bool) -> Result<()> {
        let mut remap = HashMap::new();
        self.deserialize_with_remap(doc, registry, restore_id, &mut remap)
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Chooses the concrete node (content flavour, socket edges) to build for a
/// node document before the document is applied to it.
pub trait NodeFactory {
    fn create(&self, doc: &Document) -> Node;
}

/// Builds plain nodes with [`JsonContent`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainNodeFactory;

impl NodeFactory for PlainNodeFactory {
    fn create(&self, _doc: &Document) -> Node {
        Node::new(UNDEFINED_TITLE)
    }
}

impl<F> NodeFactory for F
where
    F: Fn(&Document) -> Node,
{
    fn create(&self, doc: &Document) -> Node {
        self(doc)
    }
}

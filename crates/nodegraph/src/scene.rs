use crate::config::EditorConfig;
use crate::doc::{self, Direction, Document, INPUTS, NODES, OUTPUTS, RemovalKind, WIRES};
use crate::error::{GraphError, Result};
use crate::ids::{EntityRef, IdMap, ItemKind, ItemRef, new_id};
use crate::node::{Node, NodeFactory, PlainNodeFactory};
use crate::serializable::Serializable;
use crate::socket::{Socket, SocketDoc};
use crate::types::{SocketType, WireType};
use crate::wire::Wire;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

type ModifiedListener = Box<dyn FnMut(bool)>;

/// The graph: nodes, the wires between their sockets, and the id registry.
pub struct Scene {
    id: String,
    pub width: u32,
    pub height: u32,
    nodes: Vec<Node>,
    wires: Vec<Wire>,
    registry: IdMap,
    factory: Box<dyn NodeFactory>,
    modified: bool,
    modified_listeners: Vec<ModifiedListener>,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("nodes", &self.nodes)
            .field("wires", &self.wires)
            .field("modified", &self.modified)
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// An empty scene with the default canvas size.
    pub fn new() -> Self {
        Self::with_config(&EditorConfig::default())
    }

    /// An empty scene sized from `config`, with a fresh id.
    pub fn with_config(config: &EditorConfig) -> Self {
        let id = new_id();
        let mut registry = IdMap::new();
        registry.insert(id.clone(), EntityRef::Scene);
        Self {
            id,
            width: config.scene_width,
            height: config.scene_height,
            nodes: Vec::new(),
            wires: Vec::new(),
            registry,
            factory: Box::new(PlainNodeFactory),
            modified: false,
            modified_listeners: Vec::new(),
        }
    }

    // ── lookup ────────────────────────────────────────────────────────

    /// Nodes in insertion order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Wires in insertion order.
    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    /// Every live id: the scene, its nodes, sockets and wires.
    pub fn registry(&self) -> &IdMap {
        &self.registry
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub(crate) fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id() == id)
    }

    /// Look up a wire by id.
    pub fn wire(&self, id: &str) -> Option<&Wire> {
        self.wires.iter().find(|w| w.id() == id)
    }

    fn wire_mut(&mut self, id: &str) -> Option<&mut Wire> {
        self.wires.iter_mut().find(|w| w.id() == id)
    }

    /// Look up a socket by id through its owning node.
    pub fn socket(&self, id: &str) -> Option<&Socket> {
        let owner = self.registry.socket_owner(id)?;
        self.node(owner)?.socket(id)
    }

    fn socket_mut(&mut self, id: &str) -> Option<&mut Socket> {
        let owner = self.registry.socket_owner(id)?.to_string();
        self.node_mut(&owner)?.socket_mut(id)
    }

    fn require_node(&mut self, id: &str) -> Result<&mut Node> {
        self.node_mut(id)
            .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))
    }

    // ── factory & modified flag ───────────────────────────────────────

    /// Replace the factory used to build nodes from documents.
    pub fn set_node_factory(&mut self, factory: impl NodeFactory + 'static) {
        self.factory = Box::new(factory);
    }

    /// Whether the scene differs from what was last saved or loaded.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Set the modified flag, notifying listeners when it flips.
    pub fn set_modified(&mut self, modified: bool) {
        if self.modified != modified {
            self.modified = modified;
            for listener in &mut self.modified_listeners {
                listener(modified);
            }
        }
    }

    /// Register a callback run with the new value whenever the modified
    /// flag flips.
    pub fn add_modified_listener(&mut self, listener: impl FnMut(bool) + 'static) {
        self.modified_listeners.push(Box::new(listener));
    }

    // ── mutation ──────────────────────────────────────────────────────

    /// Build a node through the factory and add it. Returns the node id.
    pub fn create_node(
        &mut self,
        title: &str,
        inputs: &[SocketType],
        outputs: &[SocketType],
    ) -> Result<String> {
        let mut node = self.factory.create(&json!({ "title": title }));
        node.title = title.to_string();
        let node = node.with_sockets(inputs, outputs);
        self.add_node(node)
    }

    /// Add an already built node. Fails when any of its ids is taken.
    pub fn add_node(&mut self, node: Node) -> Result<String> {
        if self.registry.contains(node.id()) {
            return Err(GraphError::malformed(format!("duplicate id {}", node.id())));
        }
        let id = node.id().to_string();
        self.register_node(&node);
        self.nodes.push(node);
        Ok(id)
    }

    fn register_node(&mut self, node: &Node) {
        self.registry.insert(node.id(), EntityRef::Node);
        for s in node.sockets() {
            self.registry.insert(
                s.id(),
                EntityRef::Socket {
                    node: node.id().to_string(),
                },
            );
        }
    }

    fn unregister_node(&mut self, node: &Node) {
        self.registry.remove(node.id());
        for s in node.sockets() {
            self.registry.remove(s.id());
        }
    }

    /// Append a socket to one side of a node. Returns the socket id.
    pub fn add_socket(&mut self, node: &str, socket_type: SocketType, output: bool) -> Result<String> {
        let id = self.require_node(node)?.push_socket(socket_type, output);
        self.registry.insert(
            id.clone(),
            EntityRef::Socket {
                node: node.to_string(),
            },
        );
        Ok(id)
    }

    /// Remove a socket with its wires and renumber the remaining sockets on
    /// that side.
    pub fn remove_socket(&mut self, id: &str) -> Result<()> {
        let socket = self
            .socket(id)
            .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))?;
        let owner = socket.node().to_string();
        let output = socket.is_output();
        for wire in socket.wires().to_vec() {
            self.remove_wire(&wire)?;
        }
        let node = self.require_node(&owner)?;
        node.take_socket(id);
        node.reindex(output);
        self.registry.remove(id);
        Ok(())
    }

    fn check_endpoints(&self, a: &str, b: &str) -> Result<(bool, bool)> {
        let sa = self
            .socket(a)
            .ok_or_else(|| GraphError::UnknownEntity(a.to_string()))?;
        let sb = self
            .socket(b)
            .ok_or_else(|| GraphError::UnknownEntity(b.to_string()))?;
        if sa.node() == sb.node() {
            return Err(GraphError::SameNode(sa.node().to_string()));
        }
        if sa.is_output() == sb.is_output() {
            return Err(GraphError::IncompatibleSockets(a.to_string(), b.to_string()));
        }
        Ok((sa.is_output(), sb.is_output()))
    }

    /// Wire an output socket to an input socket, in either argument order.
    ///
    /// The stored wire always starts at the output. Any wire already on the
    /// input is removed first. Returns the wire id.
    pub fn connect(&mut self, a: &str, b: &str, wire_type: WireType) -> Result<String> {
        let (a_out, _) = self.check_endpoints(a, b)?;
        let (start, end) = if a_out { (a, b) } else { (b, a) };

        let occupied = self
            .socket(end)
            .map(|s| s.wires().to_vec())
            .unwrap_or_default();
        for wire in occupied {
            debug!(wire = %wire, input = %end, "freeing input for new wire");
            self.remove_wire(&wire)?;
        }

        let mut wire = Wire::new(wire_type);
        wire.set_start(Some(start.to_string()));
        wire.set_end(Some(end.to_string()));
        let id = wire.id().to_string();
        self.bind(&wire);
        self.registry.insert(id.clone(), EntityRef::Wire);
        self.wires.push(wire);
        Ok(id)
    }

    /// Attach the wire id to the sockets it names.
    fn bind(&mut self, wire: &Wire) {
        let id = wire.id().to_string();
        for socket in [wire.start(), wire.end()].into_iter().flatten() {
            let socket = socket.to_string();
            if let Some(s) = self.socket_mut(&socket) {
                s.attach_wire(&id);
            }
        }
    }

    fn unbind(&mut self, wire: &str, socket: Option<&str>) {
        if let Some(socket) = socket {
            let socket = socket.to_string();
            if let Some(s) = self.socket_mut(&socket) {
                s.detach_wire(wire);
            }
        }
    }

    /// Detach one end of a wire (or both with `None`), leaving it dangling.
    /// Dangling wires are not persisted.
    pub fn detach_wire(&mut self, wire: &str, socket: Option<&str>) -> Result<()> {
        let w = self
            .wire(wire)
            .ok_or_else(|| GraphError::UnknownEntity(wire.to_string()))?;
        let start = w.start().map(str::to_string);
        let end = w.end().map(str::to_string);
        let (detach_start, detach_end) = match socket {
            None => (true, true),
            Some(s) if start.as_deref() == Some(s) => (true, false),
            Some(s) if end.as_deref() == Some(s) => (false, true),
            Some(s) => return Err(GraphError::UnknownEntity(s.to_string())),
        };
        if detach_start {
            self.unbind(wire, start.as_deref());
        }
        if detach_end {
            self.unbind(wire, end.as_deref());
        }
        if let Some(w) = self.wire_mut(wire) {
            if detach_start {
                w.set_start(None);
            }
            if detach_end {
                w.set_end(None);
            }
        }
        Ok(())
    }

    /// Remove a wire and unbind it from both of its sockets.
    pub fn remove_wire(&mut self, id: &str) -> Result<()> {
        let pos = self
            .wires
            .iter()
            .position(|w| w.id() == id)
            .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))?;
        let mut wire = self.wires.remove(pos);
        self.unbind(id, wire.start());
        self.unbind(id, wire.end());
        wire.kill();
        self.registry.remove(id);
        Ok(())
    }

    /// Remove a node and every wire attached to any of its sockets.
    pub fn remove_node(&mut self, id: &str) -> Result<()> {
        let node = self
            .node(id)
            .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))?;
        let attached: Vec<String> = node
            .sockets()
            .flat_map(|s| s.wires().iter().cloned())
            .collect();
        for wire in attached {
            if self.wire(&wire).is_some() {
                self.remove_wire(&wire)?;
            }
        }
        let pos = self
            .nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| GraphError::UnknownEntity(id.to_string()))?;
        let node = self.nodes.remove(pos);
        self.unregister_node(&node);
        Ok(())
    }

    /// Put a node at `(x, y)`.
    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> Result<()> {
        let node = self.require_node(id)?;
        node.x = x;
        node.y = y;
        Ok(())
    }

    /// Rename a node.
    pub fn set_title(&mut self, id: &str, title: &str) -> Result<()> {
        self.require_node(id)?.title = title.to_string();
        Ok(())
    }

    /// Replace a node's content from its document form.
    pub fn set_content(&mut self, id: &str, content: &Value) -> Result<()> {
        self.require_node(id)?.content_mut().deserialize(content)
    }

    /// Change a node's or wire's selection flag without recording history.
    pub fn set_selected_silently(&mut self, id: &str, selected: bool) -> Result<()> {
        match self.registry.get(id).map(EntityRef::kind) {
            Some(ItemKind::Node) => self.require_node(id)?.selected = selected,
            Some(ItemKind::Wire) => {
                if let Some(w) = self.wire_mut(id) {
                    w.set_selected(selected);
                }
            }
            _ => return Err(GraphError::UnknownEntity(id.to_string())),
        }
        Ok(())
    }

    /// Deselect every node and wire without recording history.
    pub fn clear_selection(&mut self) {
        for n in &mut self.nodes {
            n.selected = false;
        }
        for w in &mut self.wires {
            w.set_selected(false);
        }
    }

    /// Selected nodes in scene order, then selected wires.
    pub fn selected_items(&self) -> Vec<ItemRef> {
        self.nodes
            .iter()
            .filter(|n| n.selected)
            .map(|n| ItemRef::node(n.id()))
            .chain(
                self.wires
                    .iter()
                    .filter(|w| w.is_selected())
                    .map(|w| ItemRef::wire(w.id())),
            )
            .collect()
    }

    /// Drop every node and wire. The scene keeps its id and listeners.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.wires.clear();
        self.registry.clear();
        self.registry.insert(self.id.clone(), EntityRef::Scene);
    }

    // ── fragments ─────────────────────────────────────────────────────

    /// Insert a `{nodes, wires}` fragment, offsetting node positions.
    ///
    /// With `restore_id = false` every entity gets a fresh id and wire
    /// endpoints are re-targeted to the fresh socket ids. A wire whose
    /// endpoint does not resolve is logged and skipped. On any other error
    /// nothing from the fragment is left in the scene.
    pub fn insert_fragment(
        &mut self,
        fragment: &Document,
        restore_id: bool,
        offset: (f64, f64),
    ) -> Result<Vec<ItemRef>> {
        let mut inserted = Vec::new();
        match self.insert_fragment_items(fragment, restore_id, offset, &mut inserted) {
            Ok(()) => Ok(inserted),
            Err(e) => {
                for item in inserted.iter().rev() {
                    let _ = match item.kind {
                        ItemKind::Wire => self.remove_wire(&item.id),
                        _ => self.remove_node(&item.id),
                    };
                }
                Err(e)
            }
        }
    }

    fn insert_fragment_items(
        &mut self,
        fragment: &Document,
        restore_id: bool,
        (dx, dy): (f64, f64),
        inserted: &mut Vec<ItemRef>,
    ) -> Result<()> {
        let nodes = fragment
            .get(NODES)
            .and_then(Value::as_array)
            .ok_or_else(|| GraphError::malformed("missing nodes array"))?;
        let wires = fragment
            .get(WIRES)
            .and_then(Value::as_array)
            .ok_or_else(|| GraphError::malformed("missing wires array"))?;

        let mut remap = HashMap::new();
        for ndoc in nodes {
            let id = self.insert_node_doc(ndoc, restore_id, &mut remap)?;
            inserted.push(ItemRef::node(id.clone()));
            if dx != 0.0 || dy != 0.0 {
                self.move_by(&id, dx, dy);
            }
        }
        for wdoc in wires {
            match self.insert_wire_doc(wdoc, restore_id, &remap) {
                Ok(id) => inserted.push(ItemRef::wire(id)),
                Err(GraphError::DanglingId(socket)) => {
                    warn!(socket = %socket, "skipping wire with an unresolved endpoint");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn move_by(&mut self, id: &str, dx: f64, dy: f64) {
        if let Some(n) = self.node_mut(id) {
            n.x += dx;
            n.y += dy;
        }
    }

    /// Build a node from its document, or refresh the existing node when the
    /// id is already live. Returns the node id.
    fn insert_node_doc(
        &mut self,
        doc: &Document,
        restore_id: bool,
        remap: &mut HashMap<String, String>,
    ) -> Result<String> {
        let existing = if restore_id { doc::id_of(doc) } else { None };
        if let Some(id) = existing {
            match self.registry.get(id) {
                Some(EntityRef::Node) => {
                    let id = id.to_string();
                    let Self {
                        nodes, registry, ..
                    } = self;
                    if let Some(node) = nodes.iter_mut().find(|n| n.id() == id) {
                        node.deserialize_with_remap(doc, registry, true, remap)?;
                    }
                    return Ok(id);
                }
                Some(_) => return Err(GraphError::malformed(format!("duplicate id {}", id))),
                None => {}
            }
        }

        let mut node = self.factory.create(doc);
        if let Err(e) = node.deserialize_with_remap(doc, &mut self.registry, restore_id, remap) {
            self.unregister_node(&node);
            return Err(e);
        }
        let id = node.id().to_string();
        self.nodes.push(node);
        Ok(id)
    }

    /// Build a wire from its document, replacing a live wire with the same
    /// id. Endpoints are translated through `remap` first.
    fn insert_wire_doc(
        &mut self,
        doc: &Document,
        restore_id: bool,
        remap: &HashMap<String, String>,
    ) -> Result<String> {
        let mut doc = doc.clone();
        for key in ["start", "end"] {
            let mapped = doc
                .get(key)
                .and_then(Value::as_str)
                .and_then(|old| remap.get(old))
                .cloned();
            if let Some(new) = mapped {
                doc[key] = Value::String(new);
            }
        }

        if restore_id {
            if let Some(id) = doc::id_of(&doc) {
                if self.wire(id).is_some() {
                    let id = id.to_string();
                    self.remove_wire(&id)?;
                }
            }
        }

        let mut wire = Wire::new(WireType::default());
        wire.deserialize(&doc, &mut self.registry, restore_id)?;
        let (start, end) = (
            wire.start().unwrap_or_default().to_string(),
            wire.end().unwrap_or_default().to_string(),
        );
        if let Err(e) = self.check_endpoints(&start, &end) {
            self.registry.remove(wire.id());
            return Err(e);
        }
        let id = wire.id().to_string();
        self.bind(&wire);
        self.wires.push(wire);
        Ok(id)
    }

    // ── documents ─────────────────────────────────────────────────────

    /// Replace the whole scene with `doc`.
    ///
    /// The document is built into a staging scene first, so a malformed
    /// document leaves this scene untouched.
    pub fn load_document(&mut self, doc: &Document, restore_id: bool) -> Result<()> {
        let width = size_field(doc, "scene_width")?.unwrap_or(self.width);
        let height = size_field(doc, "scene_height")?.unwrap_or(self.height);
        if restore_id {
            check_unique_node_ids(doc)?;
        }

        let factory = std::mem::replace(&mut self.factory, Box::new(PlainNodeFactory));
        let mut staged = Scene::new();
        staged.factory = factory;
        if let Some(id) = doc::id_of(doc).filter(|_| restore_id) {
            staged.registry.rekey(&staged.id.clone(), id, EntityRef::Scene);
            staged.id = id.to_string();
        }
        staged.width = width;
        staged.height = height;

        let result = staged.insert_fragment(doc, restore_id, (0.0, 0.0));
        std::mem::swap(&mut self.factory, &mut staged.factory);
        result?;

        self.id = staged.id;
        self.width = staged.width;
        self.height = staged.height;
        self.nodes = staged.nodes;
        self.wires = staged.wires;
        self.registry = staged.registry;
        debug!(
            nodes = self.nodes.len(),
            wires = self.wires.len(),
            "scene rebuilt from document"
        );
        Ok(())
    }

    /// Write the scene as pretty-printed JSON and clear the modified flag.
    pub fn save_to_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.serialize())?;
        std::fs::write(path, text)?;
        self.set_modified(false);
        Ok(())
    }

    /// Load a scene file. The text is fully parsed before the scene changes.
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&text)?;
        self.load_document(&doc, true)?;
        self.set_modified(false);
        Ok(())
    }

    // ── incremental replay ────────────────────────────────────────────

    /// Replay one history increment against the live scene.
    ///
    /// Redo applies removals (wires, then nodes) and then changes (nodes,
    /// then wires). Undo walks the same steps in exact reverse. Ids that no
    /// longer resolve are logged and skipped.
    pub fn deserialize_incremental(
        &mut self,
        change: &Document,
        removal: &Document,
        direction: Direction,
    ) -> Result<()> {
        debug!(?direction, "replaying increment");
        match direction {
            Direction::Redo => {
                for w in doc::items(removal, WIRES) {
                    self.replay_wire_removal(w, direction)?;
                }
                for n in doc::items(removal, NODES) {
                    self.replay_node_removal(n, direction)?;
                }
                self.replay_scene_fields(change, direction);
                for n in doc::items(change, NODES) {
                    self.replay_node_change(n, direction)?;
                }
                for w in doc::items(change, WIRES) {
                    self.replay_wire_change(w, direction)?;
                }
            }
            Direction::Undo => {
                for w in doc::items(change, WIRES).iter().rev() {
                    self.replay_wire_change(w, direction)?;
                }
                for n in doc::items(change, NODES).iter().rev() {
                    self.replay_node_change(n, direction)?;
                }
                self.replay_scene_fields(change, direction);
                for n in doc::items(removal, NODES).iter().rev() {
                    self.replay_node_removal(n, direction)?;
                }
                for w in doc::items(removal, WIRES).iter().rev() {
                    self.replay_wire_removal(w, direction)?;
                }
            }
        }
        Ok(())
    }

    fn replay_scene_fields(&mut self, change: &Document, direction: Direction) {
        let pick = |key: &str| {
            change
                .get(key)
                .and_then(|p| direction.pick(p))
                .and_then(Value::as_u64)
                .and_then(|v| u32::try_from(v).ok())
        };
        if let Some(w) = pick("scene_width") {
            self.width = w;
        }
        if let Some(h) = pick("scene_height") {
            self.height = h;
        }
    }

    fn replay_wire_removal(&mut self, doc: &Document, direction: Direction) -> Result<()> {
        let id = record_id(doc)?;
        match direction {
            Direction::Redo => {
                if self.wire(id).is_some() {
                    self.remove_wire(id)?;
                } else {
                    warn!(wire = %id, "wire to remove is not in the scene");
                }
            }
            Direction::Undo => self.restore_wire(doc)?,
        }
        Ok(())
    }

    fn restore_wire(&mut self, doc: &Document) -> Result<()> {
        match self.insert_wire_doc(doc, true, &HashMap::new()) {
            Err(GraphError::DanglingId(id)) => {
                warn!(socket = %id, "skipping wire with an unresolved endpoint");
                Ok(())
            }
            other => other.map(|_| ()),
        }
    }

    fn replay_node_removal(&mut self, doc: &Document, direction: Direction) -> Result<()> {
        let id = record_id(doc)?;
        match (RemovalKind::of(doc), direction) {
            (RemovalKind::Node, Direction::Redo) => {
                if self.node(id).is_some() {
                    self.remove_node(id)?;
                } else {
                    warn!(node = %id, "node to remove is not in the scene");
                }
            }
            (RemovalKind::Node, Direction::Undo) => {
                self.insert_node_doc(doc, true, &mut HashMap::new())?;
            }
            (RemovalKind::Sockets, _) => {
                if self.node(id).is_none() {
                    warn!(node = %id, "socket carrier names a missing node");
                    return Ok(());
                }
                for key in [INPUTS, OUTPUTS] {
                    let sockets = doc::items(doc, key);
                    let ordered: Box<dyn Iterator<Item = &Value> + '_> = match direction {
                        Direction::Redo => Box::new(sockets.iter()),
                        Direction::Undo => Box::new(sockets.iter().rev()),
                    };
                    for sdoc in ordered {
                        match direction {
                            Direction::Redo => self.drop_socket(record_id(sdoc)?)?,
                            Direction::Undo => self.restore_socket(id, sdoc)?,
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove a socket and its wires without renumbering its siblings;
    /// history records carry the indices.
    fn drop_socket(&mut self, id: &str) -> Result<()> {
        let Some(socket) = self.socket(id) else {
            warn!(socket = %id, "socket to remove is not in the scene");
            return Ok(());
        };
        let owner = socket.node().to_string();
        for wire in socket.wires().to_vec() {
            if self.wire(&wire).is_some() {
                self.remove_wire(&wire)?;
            }
        }
        if let Some(node) = self.node_mut(&owner) {
            node.take_socket(id);
        }
        self.registry.remove(id);
        Ok(())
    }

    fn restore_socket(&mut self, node: &str, doc: &Document) -> Result<()> {
        let sdoc: SocketDoc = serde_json::from_value(doc.clone())
            .map_err(|e| GraphError::malformed(format!("socket: {}", e)))?;
        if self.registry.contains(&sdoc.id) {
            return Ok(());
        }
        let socket = Socket::from_doc(node, &sdoc, 0);
        self.require_node(node)?.insert_socket(socket);
        self.registry.insert(
            sdoc.id,
            EntityRef::Socket {
                node: node.to_string(),
            },
        );
        Ok(())
    }

    fn replay_node_change(&mut self, record: &Document, direction: Direction) -> Result<()> {
        let id = record_id(record)?;
        if !doc::is_modified(record) {
            return match direction {
                Direction::Redo => self.insert_node_doc(record, true, &mut HashMap::new()).map(|_| ()),
                Direction::Undo => match self.node(id) {
                    Some(_) => self.remove_node(id),
                    None => {
                        warn!(node = %id, "added node is not in the scene");
                        Ok(())
                    }
                },
            };
        }

        let Some(node) = self.node_mut(id) else {
            warn!(node = %id, "changed node is not in the scene");
            return Ok(());
        };
        node.apply_change(record, direction)?;

        for (output, key) in [(false, INPUTS), (true, OUTPUTS)] {
            let children = doc::items(record, key);
            let ordered: Box<dyn Iterator<Item = &Value> + '_> = match direction {
                Direction::Redo => Box::new(children.iter()),
                Direction::Undo => Box::new(children.iter().rev()),
            };
            for child in ordered {
                let sid = record_id(child)?;
                if doc::is_modified(child) {
                    match self.socket_mut(sid) {
                        Some(s) => s.apply_change(child, direction),
                        None => warn!(socket = %sid, "changed socket is not in the scene"),
                    }
                } else {
                    match direction {
                        Direction::Redo => self.restore_socket(id, child)?,
                        Direction::Undo => self.drop_socket(sid)?,
                    }
                }
            }
            if let Some(node) = self.node_mut(id) {
                node.side_mut(output).sort_by_key(|s| s.index);
            }
        }
        Ok(())
    }

    fn replay_wire_change(&mut self, record: &Document, direction: Direction) -> Result<()> {
        let id = record_id(record)?;
        if !doc::is_modified(record) {
            return match direction {
                Direction::Redo => self.restore_wire(record),
                Direction::Undo => match self.wire(id) {
                    Some(_) => self.remove_wire(id),
                    None => {
                        warn!(wire = %id, "added wire is not in the scene");
                        Ok(())
                    }
                },
            };
        }

        let Some(wire) = self.wire_mut(id) else {
            warn!(wire = %id, "changed wire is not in the scene");
            return Ok(());
        };
        wire.apply_change(record, direction);
        let (old_start, old_end) = (
            wire.start().map(str::to_string),
            wire.end().map(str::to_string),
        );

        let (start, end) = Wire::endpoint_change(record, direction);
        for (new, old, is_start) in [(start, old_start, true), (end, old_end, false)] {
            let Some(new) = new else { continue };
            if self.socket(&new).is_none() {
                warn!(wire = %id, socket = %new, "skipping unresolved wire endpoint");
                continue;
            }
            self.unbind(id, old.as_deref());
            if let Some(s) = self.socket_mut(&new) {
                s.attach_wire(id);
            }
            if let Some(w) = self.wire_mut(id) {
                if is_start {
                    w.set_start(Some(new));
                } else {
                    w.set_end(Some(new));
                }
            }
        }
        Ok(())
    }
}

fn check_unique_node_ids(doc: &Document) -> Result<()> {
    let mut seen = HashSet::new();
    for id in doc::items(doc, NODES).iter().filter_map(doc::id_of) {
        if !seen.insert(id) {
            return Err(GraphError::malformed(format!("duplicate node id {}", id)));
        }
    }
    Ok(())
}

fn record_id(record: &Document) -> Result<&str> {
    doc::id_of(record).ok_or_else(|| GraphError::malformed("record without id"))
}

fn size_field(doc: &Document, key: &str) -> Result<Option<u32>> {
    match doc.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| GraphError::malformed(format!("{} is not a size", key))),
    }
}

impl Serializable for Scene {
    fn id(&self) -> &str {
        &self.id
    }

    /// Wires with an unbound end are left out.
    fn serialize(&self) -> Document {
        json!({
            "id": self.id,
            "scene_width": self.width,
            "scene_height": self.height,
            "nodes": self.nodes.iter().map(Serializable::serialize).collect::<Vec<_>>(),
            "wires": self
                .wires
                .iter()
                .filter(|w| w.is_bound())
                .map(Serializable::serialize)
                .collect::<Vec<_>>(),
        })
    }

    /// Rebuild from `doc`. Nodes and wires go into the scene's own registry;
    /// `registry` only receives the scene id.
    fn deserialize(&mut self, doc: &Document, registry: &mut IdMap, restore_id: bool) -> Result<()> {
        let previous = self.id.clone();
        self.load_document(doc, restore_id)?;
        registry.rekey(&previous, &self.id, EntityRef::Scene);
        Ok(())
    }
}

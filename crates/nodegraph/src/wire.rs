use crate::doc::{Direction, Document};
use crate::error::{GraphError, Result};
use crate::ids::{EntityRef, IdMap, new_id};
use crate::serializable::Serializable;
use crate::types::{WireState, WireType};
use serde::Deserialize;
use serde_json::{Value, json};

/// Mutable fields compared by the differ.
pub const WIRE_FIELDS: [&str; 4] = ["wire_type", "start", "end", "selected"];

#[derive(Deserialize)]
struct WireFields {
    id: String,
    #[serde(default)]
    wire_type: WireType,
    start: String,
    end: String,
    #[serde(default)]
    selected: bool,
}

/// A connection between an output socket (`start`) and an input socket
/// (`end`).
#[derive(Debug, Clone)]
pub struct Wire {
    id: String,
    start: Option<String>,
    end: Option<String>,
    pub wire_type: WireType,
    state: WireState,
}

impl Wire {
    /// A wire with no bound endpoints.
    pub fn new(wire_type: WireType) -> Self {
        Self {
            id: new_id(),
            start: None,
            end: None,
            wire_type,
            state: WireState::ALIVE | WireState::VISIBLE,
        }
    }

    pub fn start(&self) -> Option<&str> {
        self.start.as_deref()
    }

    pub fn end(&self) -> Option<&str> {
        self.end.as_deref()
    }

    pub fn state(&self) -> WireState {
        self.state
    }

    pub fn is_selected(&self) -> bool {
        self.state.contains(WireState::SELECTED)
    }

    pub fn set_selected(&mut self, selected: bool) {
        self.state.set(WireState::SELECTED, selected);
    }

    /// Both endpoints bound. Only such wires are persisted.
    pub fn is_bound(&self) -> bool {
        self.state
            .contains(WireState::START_BOUND | WireState::END_BOUND)
    }

    pub fn touches(&self, socket: &str) -> bool {
        self.start() == Some(socket) || self.end() == Some(socket)
    }

    pub(crate) fn set_start(&mut self, socket: Option<String>) {
        self.state.set(WireState::START_BOUND, socket.is_some());
        self.start = socket;
        self.refresh_dangling();
    }

    pub(crate) fn set_end(&mut self, socket: Option<String>) {
        self.state.set(WireState::END_BOUND, socket.is_some());
        self.end = socket;
        self.refresh_dangling();
    }

    pub(crate) fn kill(&mut self) {
        self.state.remove(WireState::ALIVE | WireState::VISIBLE);
    }

    fn refresh_dangling(&mut self) {
        let bound = self.start.is_some() as u8 + self.end.is_some() as u8;
        self.state.set(WireState::DANGLING, bound == 1);
    }

    /// Endpoint ids named by one side of a change record, for the fields the
    /// record touches. The scene rebinds sockets from these.
    pub(crate) fn endpoint_change(change: &Document, direction: Direction) -> (Option<String>, Option<String>) {
        let pick = |key: &str| {
            change
                .get(key)
                .and_then(|p| direction.pick(p))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        (pick("start"), pick("end"))
    }

    /// Apply the non-endpoint fields of one side of a change record.
    pub(crate) fn apply_change(&mut self, change: &Document, direction: Direction) {
        let pick = |key: &str| change.get(key).and_then(|p| direction.pick(p));
        if let Some(t) = pick("wire_type").and_then(|v| serde_json::from_value(v.clone()).ok()) {
            self.wire_type = t;
        }
        if let Some(selected) = pick("selected").and_then(Value::as_bool) {
            self.set_selected(selected);
        }
    }
}

impl Serializable for Wire {
    fn id(&self) -> &str {
        &self.id
    }

    fn serialize(&self) -> Document {
        json!({
            "id": self.id,
            "wire_type": self.wire_type,
            "start": self.start,
            "end": self.end,
            "selected": self.is_selected(),
        })
    }

    /// Endpoints must already be registered sockets; binding them to the
    /// sockets is left to the scene.
    fn deserialize(&mut self, doc: &Document, registry: &mut IdMap, restore_id: bool) -> Result<()> {
        let fields: WireFields = serde_json::from_value(doc.clone())
            .map_err(|e| GraphError::malformed(format!("wire: {}", e)))?;

        for endpoint in [&fields.start, &fields.end] {
            if registry.socket_owner(endpoint).is_none() {
                return Err(GraphError::DanglingId(endpoint.clone()));
            }
        }

        if restore_id {
            registry.rekey(&self.id, &fields.id, EntityRef::Wire);
            self.id = fields.id;
        } else {
            registry.rekey(&self.id, &self.id, EntityRef::Wire);
        }
        self.wire_type = fields.wire_type;
        self.set_start(Some(fields.start));
        self.set_end(Some(fields.end));
        self.set_selected(fields.selected);
        self.state.insert(WireState::ALIVE | WireState::VISIBLE);
        Ok(())
    }
}

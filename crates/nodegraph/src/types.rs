//! Enumerations and bit-flag words shared by the entity model.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

// ============================================================================
// Socket
// ============================================================================

/// Which edge of a node a socket renders on, and from which end the socket
/// list is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SocketPosition {
    LeftTop = 1,
    LeftCenter = 2,
    LeftBottom = 3,
    RightTop = 4,
    RightCenter = 5,
    RightBottom = 6,
}

impl SocketPosition {
    /// Right-edge sockets are outputs, left-edge sockets are inputs.
    pub fn is_output(self) -> bool {
        matches!(
            self,
            SocketPosition::RightTop | SocketPosition::RightCenter | SocketPosition::RightBottom
        )
    }
}

impl From<SocketPosition> for u8 {
    fn from(p: SocketPosition) -> u8 {
        p as u8
    }
}

impl TryFrom<u8> for SocketPosition {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(SocketPosition::LeftTop),
            2 => Ok(SocketPosition::LeftCenter),
            3 => Ok(SocketPosition::LeftBottom),
            4 => Ok(SocketPosition::RightTop),
            5 => Ok(SocketPosition::RightCenter),
            6 => Ok(SocketPosition::RightBottom),
            other => Err(format!("invalid socket position: {}", other)),
        }
    }
}

/// Socket data type, used for connection compatibility and colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SocketType {
    Type1 = 0,
    Type2 = 1,
    Type3 = 2,
    Type4 = 3,
    Type5 = 4,
    Type6 = 5,
}

impl From<SocketType> for u8 {
    fn from(t: SocketType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for SocketType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(SocketType::Type1),
            1 => Ok(SocketType::Type2),
            2 => Ok(SocketType::Type3),
            3 => Ok(SocketType::Type4),
            4 => Ok(SocketType::Type5),
            5 => Ok(SocketType::Type6),
            other => Err(format!("invalid socket type: {}", other)),
        }
    }
}

// ============================================================================
// Wire
// ============================================================================

/// How a wire is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WireType {
    Direct = 0,
    #[default]
    Bezier = 1,
}

impl From<WireType> for u8 {
    fn from(t: WireType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for WireType {
    type Error = String;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(WireType::Direct),
            1 => Ok(WireType::Bezier),
            other => Err(format!("invalid wire type: {}", other)),
        }
    }
}

bitflags! {
    /// Lifecycle and presentation state of a wire.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct WireState: u8 {
        /// Live instance (cleared once removed).
        const ALIVE = 0x01;
        /// Start socket bound.
        const START_BOUND = 0x02;
        /// End socket bound.
        const END_BOUND = 0x04;
        /// One endpoint is hanging in free space.
        const DANGLING = 0x08;
        /// Drag preview: the hovered socket accepts this wire.
        const CONNECTABLE = 0x10;
        const SELECTED = 0x20;
        const VISIBLE = 0x40;
    }
}

// ============================================================================
// History
// ============================================================================

bitflags! {
    /// Operation kinds recorded in a history entry. Combined entries OR them.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct HistoryFlags: u32 {
        const INIT_VIEW = 0x01;
        const SELECT_ITEMS = 0x02;
        const DESELECT_ITEMS = 0x04;
        const MOVE_ITEMS = 0x08;
        const CREATE_ITEMS = 0x10;
        const DELETE_ITEMS = 0x20;
        const CUT_ITEMS = 0x40;
        const PASTE_ITEMS = 0x80;
        /// Query mask only, never recorded on its own.
        const SEL_DESEL_ITEMS = Self::SELECT_ITEMS.bits() | Self::DESELECT_ITEMS.bits();
    }
}

impl HistoryFlags {
    /// Whether an entry of this kind changes the document, as opposed to
    /// only changing the selection.
    pub fn modifies_document(self) -> bool {
        !self.difference(HistoryFlags::SEL_DESEL_ITEMS).is_empty()
    }
}

// Stored as the raw bit word so history files stay compact.
impl Serialize for HistoryFlags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

impl<'de> Deserialize<'de> for HistoryFlags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bits = u32::deserialize(deserializer)?;
        Ok(HistoryFlags::from_bits_retain(bits))
    }
}

#![doc = include_str!("../README.md")]

mod clipboard;
mod combine;
mod config;
mod content;
mod diff;
mod doc;
mod error;
mod history;
mod ids;
mod merge;
mod node;
mod query;
mod scene;
mod selection;
mod serializable;
mod socket;
mod types;
mod wire;

pub mod v1 {
    //! Versioned public API for the node-graph model and its history.
    //!
    //! Everything you need is re-exported from this module. Types are
    //! organized into four groups:
    //!
    //! # Graph
    //!
    //! - [`Scene`] owns nodes, wires and the id registry
    //! - [`Node`] with its input and output [`Socket`]s
    //! - [`Wire`] connecting an output socket to an input socket
    //! - [`NodeContent`] / [`JsonContent`] for the opaque per-node payload
    //! - [`NodeFactory`] to customise how nodes are built from documents
    //!
    //! # Persistence
    //!
    //! - [`Serializable`] is implemented by every entity
    //! - [`Document`] is the JSON form, see [`doc`] for the field helpers
    //! - [`IdMap`] resolves ids to the entities that own them
    //!
    //! # History
    //!
    //! - [`SceneHistory`] is the bounded undo/redo stack of [`HistoryEntry`]s
    //! - [`diff`], [`merge`] and [`combine`] compute and fold increments
    //! - [`HistoryFlags`] classify each entry
    //! - [`SelectionTracker`] turns selection changes into entries
    //!
    //! # Editing helpers
    //!
    //! - [`clipboard`] copies, cuts, deletes and pastes the selection
    //! - [`query`] walks the graph downstream and maintains eval flags
    //! - [`EditorConfig`] carries tunables loaded from JSON
    //!
    //! # Example: connect, move, undo
    //!
    //! ```
    //! use nodegraph::v1::*;
    //!
    //! let mut scene = Scene::new();
    //! let mut history = SceneHistory::default();
    //! let a = scene.create_node("A", &[], &[SocketType::Type1]).unwrap();
    //! let b = scene.create_node("B", &[SocketType::Type1], &[]).unwrap();
    //! history.store_initial_history(&mut scene).unwrap();
    //!
    //! let out = scene.node(&a).unwrap().outputs()[0].id().to_string();
    //! let inp = scene.node(&b).unwrap().inputs()[0].id().to_string();
    //! let wire = scene.connect(&out, &inp, WireType::Bezier).unwrap();
    //! history
    //!     .store_history(&mut scene, "Created wire", HistoryFlags::CREATE_ITEMS, true, false)
    //!     .unwrap();
    //!
    //! scene.move_node(&b, 120.0, 40.0).unwrap();
    //! history
    //!     .store_history(&mut scene, "Node moved", HistoryFlags::MOVE_ITEMS, true, false)
    //!     .unwrap();
    //!
    //! history.undo(&mut scene).unwrap();
    //! assert_eq!(scene.node(&b).unwrap().x, 0.0);
    //! assert!(scene.wire(&wire).is_some());
    //!
    //! history.undo(&mut scene).unwrap();
    //! assert!(scene.wire(&wire).is_none());
    //! ```

    /// Copy, cut, delete and paste of the selected sub-graph.
    ///
    /// # Example: copy and paste a node
    ///
    /// ```
    /// use nodegraph::v1::{Scene, SceneHistory, SocketType, clipboard};
    ///
    /// let mut scene = Scene::new();
    /// let mut history = SceneHistory::default();
    /// let a = scene.create_node("A", &[], &[SocketType::Type1]).unwrap();
    /// history.store_initial_history(&mut scene).unwrap();
    ///
    /// scene.set_selected_silently(&a, true).unwrap();
    /// let data = clipboard::serialize_selected(&scene);
    /// let pasted = clipboard::paste(&mut scene, &mut history, &data, (500.0, 500.0)).unwrap();
    ///
    /// assert_eq!(scene.nodes().len(), 2);
    /// assert_eq!(scene.node(&pasted[0].id).unwrap().x, 500.0);
    /// assert_eq!(history.len(), 2);
    /// ```
    pub mod clipboard {
        pub use crate::clipboard::{
            CUT_DESC, DELETE_DESC, PASTE_DESC, cut, delete_selected, paste, serialize_selected,
        };
    }

    /// Downstream traversal and dirty/invalid flag propagation.
    pub mod query {
        pub use crate::query::{
            children, descendants, eval, eval_children, mark_children_dirty,
            mark_children_invalid, mark_descendants_dirty, mark_descendants_invalid, mark_dirty,
            mark_invalid,
        };
    }

    /// Document constants and array helpers.
    pub mod doc {
        pub use crate::doc::*;
    }

    /// Structural diff between two snapshots.
    pub mod diff {
        pub use crate::diff::{
            Diff, SCENE_FIELDS, diff_node, diff_scene, diff_socket, diff_wire,
            is_empty_increment, is_unchanged,
        };
    }

    /// Apply increments to snapshot documents, forward or backward.
    pub mod merge {
        pub use crate::merge::{
            apply_scene_increment, merge_fields, merge_node, merge_socket_removal,
            strip_removal_tag,
        };
    }

    /// Fold consecutive history entries into one.
    pub mod combine {
        pub use crate::combine::{COMBINED_PREFIX, combine, combine_increments};
    }

    pub use crate::config::{
        DEFAULT_HISTORY_LIMIT, DEFAULT_JUMP_SELECT_WINDOW_MS, DEFAULT_SCENE_SIZE, EditorConfig,
    };
    pub use crate::content::{JsonContent, NodeContent};
    pub use crate::doc::{Direction, Document, RemovalKind};
    pub use crate::error::{GraphError, Result};
    pub use crate::history::{EntryRecord, HistoryEntry, INITIAL_STATE, SceneHistory};
    pub use crate::ids::{EntityRef, IdMap, ItemKind, ItemRef, new_id};
    pub use crate::node::{NODE_FIELDS, Node, NodeFactory, PlainNodeFactory, UNDEFINED_TITLE};
    pub use crate::scene::Scene;
    pub use crate::selection::{DESELECTION, SELECTION_CHANGED, SelectionTracker};
    pub use crate::serializable::Serializable;
    pub use crate::socket::{SOCKET_FIELDS, Socket, SocketDoc};
    pub use crate::types::{HistoryFlags, SocketPosition, SocketType, WireState, WireType};
    pub use crate::wire::{WIRE_FIELDS, Wire};
}

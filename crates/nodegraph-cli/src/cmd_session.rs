use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Subcommand;
use nodegraph::v1::{
    Document, EditorConfig, HistoryFlags, Scene, SceneHistory, SelectionTracker, Serializable,
    SocketType, WireType, clipboard,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

// ============================================================================
// CLI argument types
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SessionOp {
    /// Start an editing session, empty or from an existing scene file
    Init {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Scene file to start from
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Overwrite an existing session file
        #[arg(long)]
        force: bool,
    },
    /// Add a node; prints the node document
    AddNode {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Node title
        #[arg(long)]
        title: String,

        /// Input socket types (0-5), comma separated
        #[arg(long, value_delimiter = ',')]
        inputs: Vec<u8>,

        /// Output socket types (0-5), comma separated
        #[arg(long, value_delimiter = ',')]
        outputs: Vec<u8>,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        y: f64,
    },
    /// Wire two sockets together, in either order; prints the wire id
    Connect {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// First socket id
        #[arg(long)]
        from: String,

        /// Second socket id
        #[arg(long)]
        to: String,

        /// Draw as a straight wire instead of a bezier curve
        #[arg(long)]
        direct: bool,
    },
    /// Move a node to a new scene position
    Move {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Node id
        #[arg(long)]
        node: String,

        #[arg(long, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },
    /// Remove a node together with its wires
    RemoveNode {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Node id
        #[arg(long)]
        node: String,
    },
    /// Remove a wire
    RemoveWire {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Wire id
        #[arg(long)]
        wire: String,
    },
    /// Replace the selection with the given nodes and wires (none deselects)
    Select {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Node or wire ids
        ids: Vec<String>,
    },
    /// Delete the selection
    Delete {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,
    },
    /// Print the selection as clipboard data
    Copy {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the selection as clipboard data and delete it
    Cut {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Paste clipboard data centred on a point (reads stdin if no input)
    Paste {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Clipboard data file
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        y: f64,
    },
    /// Undo the current step
    Undo {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,
    },
    /// Redo the next step
    Redo {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,
    },
    /// List the history steps
    Log {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Emit the scene, live or as it was at a history step
    Export {
        /// Path to session state file
        #[arg(long)]
        session: PathBuf,

        /// History step to export instead of the live scene
        #[arg(long)]
        at: Option<usize>,

        /// Write output to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

const ADD_NODE_DESC: &str = "Created new node";
const CONNECT_DESC: &str = "Create new wire";
const MOVE_DESC: &str = "Node Moved";
const REMOVE_NODE_DESC: &str = "Delete node";
const REMOVE_WIRE_DESC: &str = "Delete wire";

const SESSION_VERSION: u32 = 1;

// ============================================================================
// Session state
// ============================================================================

/// On-disk form of a session: the live scene plus its history.
#[derive(Deserialize)]
struct SessionFile {
    version: u32,
    modified: bool,
    scene: Document,
    history: SceneHistory,
}

#[derive(Serialize)]
struct SessionFileRef<'a> {
    version: u32,
    modified: bool,
    scene: Document,
    history: &'a SceneHistory,
}

struct Session {
    scene: Scene,
    history: SceneHistory,
}

fn load_session(path: &Path, config: &EditorConfig) -> Result<Session> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session file: {}", path.display()))?;
    let file: SessionFile = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse session file: {}", path.display()))?;
    if file.version != SESSION_VERSION {
        anyhow::bail!(
            "unsupported session version {} in {}",
            file.version,
            path.display()
        );
    }
    let mut scene = Scene::with_config(config);
    scene
        .load_document(&file.scene, true)
        .with_context(|| format!("invalid scene in session file: {}", path.display()))?;
    scene.set_modified(file.modified);
    Ok(Session {
        scene,
        history: file.history,
    })
}

/// Write the session through a temp file in the same directory, then
/// rename it over the target.
fn save_session(path: &Path, session: &Session) -> Result<()> {
    let file = SessionFileRef {
        version: SESSION_VERSION,
        modified: session.scene.is_modified(),
        scene: session.scene.serialize(),
        history: &session.history,
    };
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)
        .context("failed to create temp file for atomic write")?;
    serde_json::to_writer_pretty(&tmp, &file).context("failed to serialize session")?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist session file: {}", path.display()))?;
    debug!(path = %path.display(), steps = session.history.len(), "session saved");
    Ok(())
}

/// Load a session, apply one edit, record it as a history step and save.
fn edit<T>(
    path: &Path,
    config: &EditorConfig,
    desc: &str,
    op: HistoryFlags,
    apply: impl FnOnce(&mut Scene) -> Result<T>,
) -> Result<T> {
    let mut session = load_session(path, config)?;
    let out = apply(&mut session.scene)?;
    session
        .history
        .store_history(&mut session.scene, desc, op, true, false)?;
    save_session(path, &session)?;
    Ok(out)
}

// ============================================================================
// Helpers
// ============================================================================

fn read_input(input: Option<&PathBuf>) -> Result<String> {
    match input {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {:?}", path))
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read stdin")?;
            Ok(buf)
        }
    }
}

fn write_output(text: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {:?}", path))
        }
        None => {
            println!("{}", text);
            Ok(())
        }
    }
}

fn format_json(doc: &impl Serialize, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    }
    .context("failed to serialize output")
}

fn socket_types(raw: &[u8]) -> Result<Vec<SocketType>> {
    raw.iter()
        .map(|v| SocketType::try_from(*v).map_err(anyhow::Error::msg))
        .collect()
}

fn flag_names(op: HistoryFlags) -> String {
    op.iter_names()
        .map(|(name, _)| name)
        .collect::<Vec<_>>()
        .join("|")
}

// ============================================================================
// Subcommand implementations
// ============================================================================

fn init_session(
    path: &Path,
    input: Option<&Path>,
    force: bool,
    config: &EditorConfig,
) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "session file already exists: {} (use --force to overwrite)",
            path.display()
        );
    }
    let mut scene = Scene::with_config(config);
    if let Some(input) = input {
        scene
            .load_from_file(input)
            .with_context(|| format!("failed to load scene {}", input.display()))?;
    }
    let mut history = SceneHistory::with_config(config);
    history.store_initial_history(&mut scene)?;
    save_session(path, &Session { scene, history })
}

fn add_node(
    path: &Path,
    config: &EditorConfig,
    title: &str,
    inputs: &[u8],
    outputs: &[u8],
    at: (f64, f64),
) -> Result<Document> {
    let (inputs, outputs) = (socket_types(inputs)?, socket_types(outputs)?);
    edit(path, config, ADD_NODE_DESC, HistoryFlags::CREATE_ITEMS, |scene| {
        let id = scene.create_node(title, &inputs, &outputs)?;
        scene.move_node(&id, at.0, at.1)?;
        let node = scene
            .node(&id)
            .with_context(|| format!("node {} vanished after creation", id))?;
        Ok(node.serialize())
    })
}

/// Replace the selection with `ids`, recording it the way an editor does
/// when the pointer jumps from one item to another.
fn select(
    path: &Path,
    config: &EditorConfig,
    ids: &[String],
    now: DateTime<Utc>,
) -> Result<bool> {
    let mut session = load_session(path, config)?;
    let Session { scene, history } = &mut session;

    for id in ids {
        if scene.node(id).is_none() && scene.wire(id).is_none() {
            anyhow::bail!("unknown node or wire: {}", id);
        }
    }
    let previous = scene.selected_items();
    let before: HashSet<&str> = previous.iter().map(|i| i.id.as_str()).collect();
    let after: HashSet<&str> = ids.iter().map(String::as_str).collect();
    if before == after {
        return Ok(false);
    }

    let mut tracker = SelectionTracker::with_config(config).with_selection(previous.clone());
    let mut stored = false;
    if !previous.is_empty() {
        scene.clear_selection();
        stored |= tracker.on_selection_changed(scene, history, now)?;
    }
    if !ids.is_empty() {
        for id in ids {
            scene.set_selected_silently(id, true)?;
        }
        stored |= tracker.on_selection_changed(scene, history, now)?;
    }
    save_session(path, &session)?;
    Ok(stored)
}

fn run_clipboard_out(
    path: &Path,
    config: &EditorConfig,
    cut: bool,
    output: Option<&PathBuf>,
    pretty: bool,
) -> Result<()> {
    let mut session = load_session(path, config)?;
    let data = if cut {
        let data = clipboard::cut(&mut session.scene, &mut session.history)?;
        save_session(path, &session)?;
        data
    } else {
        clipboard::serialize_selected(&session.scene)
    };
    write_output(&format_json(&data, pretty)?, output)
}

fn paste(
    path: &Path,
    config: &EditorConfig,
    data: &str,
    pointer: (f64, f64),
) -> Result<usize> {
    let data: Document = serde_json::from_str(data).context("failed to parse clipboard data")?;
    let mut session = load_session(path, config)?;
    let items = clipboard::paste(&mut session.scene, &mut session.history, &data, pointer)?;
    save_session(path, &session)?;
    Ok(items.len())
}

/// Step the history once in either direction, returning the description of
/// the step crossed.
fn step(path: &Path, config: &EditorConfig, undo: bool) -> Result<Option<String>> {
    let mut session = load_session(path, config)?;
    let Session { scene, history } = &mut session;
    let crossed = match (undo, history.cur_step()) {
        (true, Some(cur)) => cur,
        (false, Some(cur)) => cur + 1,
        (_, None) => return Ok(None),
    };
    let desc = history.entries().get(crossed).map(|e| e.desc.clone());
    let moved = if undo {
        history.undo(scene)?
    } else {
        history.redo(scene)?
    };
    if !moved {
        return Ok(None);
    }
    save_session(path, &session)?;
    Ok(desc)
}

#[derive(Serialize)]
struct LogEntry<'a> {
    step: usize,
    desc: &'a str,
    #[serde(rename = "type")]
    op: u32,
    current: bool,
}

fn log_entries(history: &SceneHistory) -> Vec<LogEntry<'_>> {
    history
        .entries()
        .iter()
        .enumerate()
        .map(|(step, e)| LogEntry {
            step,
            desc: &e.desc,
            op: e.op.bits(),
            current: history.cur_step() == Some(step),
        })
        .collect()
}

fn run_log(path: &Path, config: &EditorConfig, json: bool, pretty: bool) -> Result<()> {
    let session = load_session(path, config)?;
    let entries = log_entries(&session.history);
    if json {
        println!("{}", format_json(&entries, pretty)?);
        return Ok(());
    }
    for e in entries {
        let marker = if e.current { "*" } else { " " };
        let op = HistoryFlags::from_bits_truncate(e.op);
        println!("{} {:>3}  {}  [{}]", marker, e.step, e.desc, flag_names(op));
    }
    Ok(())
}

fn export(path: &Path, config: &EditorConfig, at: Option<usize>) -> Result<Document> {
    let session = load_session(path, config)?;
    match at {
        Some(step) => session
            .history
            .snapshot_at(step)
            .with_context(|| format!("no history step {}", step)),
        None => Ok(session.scene.serialize()),
    }
}

// ============================================================================
// Entry point
// ============================================================================

pub fn run(op: SessionOp, config: &EditorConfig, pretty: bool) -> Result<()> {
    match op {
        SessionOp::Init {
            session,
            input,
            force,
        } => {
            init_session(&session, input.as_deref(), force, config)?;
            println!("{}", session.display());
            Ok(())
        }
        SessionOp::AddNode {
            session,
            title,
            inputs,
            outputs,
            x,
            y,
        } => {
            let node = add_node(&session, config, &title, &inputs, &outputs, (x, y))?;
            println!("{}", format_json(&node, pretty)?);
            Ok(())
        }
        SessionOp::Connect {
            session,
            from,
            to,
            direct,
        } => {
            let wire_type = if direct {
                WireType::Direct
            } else {
                WireType::Bezier
            };
            let id = edit(&session, config, CONNECT_DESC, HistoryFlags::CREATE_ITEMS, |scene| {
                Ok(scene.connect(&from, &to, wire_type)?)
            })?;
            println!("{}", id);
            Ok(())
        }
        SessionOp::Move { session, node, x, y } => {
            edit(&session, config, MOVE_DESC, HistoryFlags::MOVE_ITEMS, |scene| {
                Ok(scene.move_node(&node, x, y)?)
            })
        }
        SessionOp::RemoveNode { session, node } => edit(
            &session,
            config,
            REMOVE_NODE_DESC,
            HistoryFlags::DELETE_ITEMS,
            |scene| Ok(scene.remove_node(&node)?),
        ),
        SessionOp::RemoveWire { session, wire } => edit(
            &session,
            config,
            REMOVE_WIRE_DESC,
            HistoryFlags::DELETE_ITEMS,
            |scene| Ok(scene.remove_wire(&wire)?),
        ),
        SessionOp::Select { session, ids } => {
            if !select(&session, config, &ids, Utc::now())? {
                eprintln!("Selection unchanged");
            }
            Ok(())
        }
        SessionOp::Delete { session } => {
            let mut state = load_session(&session, config)?;
            if clipboard::delete_selected(&mut state.scene, &mut state.history)? {
                save_session(&session, &state)?;
            } else {
                eprintln!("Nothing selected");
            }
            Ok(())
        }
        SessionOp::Copy { session, output } => {
            run_clipboard_out(&session, config, false, output.as_ref(), pretty)
        }
        SessionOp::Cut { session, output } => {
            run_clipboard_out(&session, config, true, output.as_ref(), pretty)
        }
        SessionOp::Paste {
            session,
            input,
            x,
            y,
        } => {
            let data = read_input(input.as_ref())?;
            let count = paste(&session, config, &data, (x, y))?;
            println!("Pasted {} items", count);
            Ok(())
        }
        SessionOp::Undo { session } => {
            match step(&session, config, true)? {
                Some(desc) => println!("Undid: {}", desc),
                None => eprintln!("Nothing to undo"),
            }
            Ok(())
        }
        SessionOp::Redo { session } => {
            match step(&session, config, false)? {
                Some(desc) => println!("Redid: {}", desc),
                None => eprintln!("Nothing to redo"),
            }
            Ok(())
        }
        SessionOp::Log { session, json } => run_log(&session, config, json, pretty),
        SessionOp::Export {
            session,
            at,
            output,
        } => {
            let doc = export(&session, config, at)?;
            write_output(&format_json(&doc, pretty)?, output.as_ref())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use nodegraph::v1::doc;
    use tempfile::TempDir;

    fn config() -> EditorConfig {
        EditorConfig::default()
    }

    fn new_session(dir: &Path) -> PathBuf {
        let path = dir.join("session.json");
        init_session(&path, None, false, &config()).unwrap();
        path
    }

    fn socket_id(node: &Document, side: &str) -> String {
        doc::id_of(&doc::items(node, side)[0]).unwrap().to_string()
    }

    /// Two nodes A → B wired together; returns (node a, node b, wire).
    fn wired(path: &Path) -> (Document, Document, String) {
        let a = add_node(path, &config(), "A", &[], &[0], (0.0, 0.0)).unwrap();
        let b = add_node(path, &config(), "B", &[0], &[], (200.0, 0.0)).unwrap();
        let (out, inp) = (socket_id(&a, "outputs"), socket_id(&b, "inputs"));
        let wire = edit(path, &config(), CONNECT_DESC, HistoryFlags::CREATE_ITEMS, |s| {
            Ok(s.connect(&inp, &out, WireType::Bezier)?)
        })
        .unwrap();
        (a, b, wire)
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    #[test]
    fn test_socket_types_parse() {
        assert_eq!(
            socket_types(&[0, 5]).unwrap(),
            vec![SocketType::Type1, SocketType::Type6]
        );
        assert!(socket_types(&[6]).is_err());
    }

    #[test]
    fn test_flag_names() {
        assert_eq!(flag_names(HistoryFlags::MOVE_ITEMS), "MOVE_ITEMS");
        let both = HistoryFlags::SELECT_ITEMS | HistoryFlags::CREATE_ITEMS;
        assert_eq!(flag_names(both), "SELECT_ITEMS|CREATE_ITEMS");
    }

    // ── Session persistence ──────────────────────────────────────────────

    #[test]
    fn test_init_creates_session_with_baseline() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.history.cur_step(), Some(0));
        assert!(session.scene.nodes().is_empty());
        assert!(!session.scene.is_modified());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        assert!(init_session(&path, None, false, &config()).is_err());
        assert!(init_session(&path, None, true, &config()).is_ok());
    }

    #[test]
    fn test_init_from_scene_file() {
        let dir = TempDir::new().unwrap();
        let scene_path = dir.path().join("scene.json");
        let mut scene = Scene::new();
        scene.create_node("Loaded", &[], &[]).unwrap();
        scene.save_to_file(&scene_path).unwrap();

        let path = dir.path().join("session.json");
        init_session(&path, Some(&scene_path), false, &config()).unwrap();
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.scene.nodes()[0].title, "Loaded");
    }

    #[test]
    fn test_load_session_nonexistent() {
        assert!(load_session(Path::new("/nonexistent/session.json"), &config()).is_err());
    }

    #[test]
    fn test_load_session_corrupt_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load_session(&path, &config()).is_err());
    }

    #[test]
    fn test_history_limit_comes_from_config_at_init() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let small = EditorConfig {
            history_limit: 3,
            ..EditorConfig::default()
        };
        init_session(&path, None, false, &small).unwrap();
        for i in 0..5 {
            add_node(&path, &config(), &format!("N{i}"), &[], &[], (0.0, 0.0)).unwrap();
        }
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.history.len(), 3);
        assert_eq!(session.scene.nodes().len(), 5);
        assert_eq!(export(&path, &config(), Some(0)).unwrap()["nodes"].as_array().unwrap().len(), 3);
    }

    // ── Editing ──────────────────────────────────────────────────────────

    #[test]
    fn test_connect_move_undo_scenario() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let (_, b, wire) = wired(&path);
        let b_id = doc::id_of(&b).unwrap().to_string();
        edit(&path, &config(), MOVE_DESC, HistoryFlags::MOVE_ITEMS, |s| {
            Ok(s.move_node(&b_id, 50.0, 60.0)?)
        })
        .unwrap();

        assert_eq!(step(&path, &config(), true).unwrap().as_deref(), Some(MOVE_DESC));
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.scene.node(&b_id).unwrap().x, 200.0);
        assert!(session.scene.wire(&wire).is_some());

        assert_eq!(step(&path, &config(), true).unwrap().as_deref(), Some(CONNECT_DESC));
        let session = load_session(&path, &config()).unwrap();
        assert!(session.scene.wire(&wire).is_none());
        let b_in = socket_id(&b, "inputs");
        assert!(!session.scene.socket(&b_in).unwrap().has_wire());

        assert_eq!(step(&path, &config(), false).unwrap().as_deref(), Some(CONNECT_DESC));
        let session = load_session(&path, &config()).unwrap();
        assert!(session.scene.wire(&wire).is_some());
        assert!(session.scene.is_modified());
    }

    #[test]
    fn test_remove_node_then_undo_restores_wires() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let (a, _, wire) = wired(&path);
        let a_id = doc::id_of(&a).unwrap().to_string();
        edit(&path, &config(), REMOVE_NODE_DESC, HistoryFlags::DELETE_ITEMS, |s| {
            Ok(s.remove_node(&a_id)?)
        })
        .unwrap();
        assert!(load_session(&path, &config()).unwrap().scene.wire(&wire).is_none());

        step(&path, &config(), true).unwrap();
        let session = load_session(&path, &config()).unwrap();
        let restored = session.scene.wire(&wire).unwrap();
        assert_eq!(restored.start(), Some(socket_id(&a, "outputs").as_str()));
    }

    #[test]
    fn test_failed_edit_records_nothing() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let result = edit(&path, &config(), MOVE_DESC, HistoryFlags::MOVE_ITEMS, |s| {
            Ok(s.move_node("ghost", 1.0, 1.0)?)
        });
        assert!(result.is_err());
        assert_eq!(load_session(&path, &config()).unwrap().history.len(), 1);
    }

    #[test]
    fn test_undo_at_baseline_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        assert_eq!(step(&path, &config(), true).unwrap(), None);
        assert_eq!(step(&path, &config(), false).unwrap(), None);
    }

    // ── Selection & clipboard ────────────────────────────────────────────

    #[test]
    fn test_select_jump_merges_into_one_entry() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let (a, b, _) = wired(&path);
        let a_id = doc::id_of(&a).unwrap().to_string();
        let b_id = doc::id_of(&b).unwrap().to_string();
        let now = Utc::now();

        assert!(select(&path, &config(), std::slice::from_ref(&a_id), now).unwrap());
        assert!(!select(&path, &config(), std::slice::from_ref(&a_id), now).unwrap());
        let before = load_session(&path, &config()).unwrap().history.len();

        assert!(select(&path, &config(), &[b_id.clone()], now).unwrap());
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.history.len(), before + 1);
        let top = session.history.entries().last().unwrap();
        assert!(top.op.contains(HistoryFlags::SELECT_ITEMS | HistoryFlags::DESELECT_ITEMS));
        assert!(session.scene.node(&b_id).unwrap().selected);
        assert!(!session.scene.node(&a_id).unwrap().selected);

        assert!(select(&path, &config(), &[], now).unwrap());
        let session = load_session(&path, &config()).unwrap();
        assert!(session.scene.selected_items().is_empty());
        assert!(select(&path, &config(), &["ghost".to_string()], now).is_err());
    }

    #[test]
    fn test_copy_and_paste_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let (a, b, wire) = wired(&path);
        let ids = [doc::id_of(&a).unwrap().to_string(), doc::id_of(&b).unwrap().to_string(), wire];
        select(&path, &config(), &ids, Utc::now()).unwrap();

        let out = dir.path().join("clip.json");
        run_clipboard_out(&path, &config(), false, Some(&out), false).unwrap();
        let data = std::fs::read_to_string(&out).unwrap();
        assert_eq!(paste(&path, &config(), &data, (1000.0, 0.0)).unwrap(), 3);

        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.scene.nodes().len(), 4);
        assert_eq!(session.scene.wires().len(), 2);
        assert_eq!(session.history.entries().last().unwrap().desc, clipboard::PASTE_DESC);
    }

    #[test]
    fn test_cut_removes_selection() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        let (a, _, _) = wired(&path);
        select(&path, &config(), &[doc::id_of(&a).unwrap().to_string()], Utc::now()).unwrap();

        let out = dir.path().join("clip.json");
        run_clipboard_out(&path, &config(), true, Some(&out), true).unwrap();
        let session = load_session(&path, &config()).unwrap();
        assert_eq!(session.scene.nodes().len(), 1);
        assert!(session.scene.wires().is_empty());
        assert_eq!(session.history.entries().last().unwrap().desc, clipboard::CUT_DESC);
    }

    #[test]
    fn test_malformed_paste_leaves_session_alone() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        assert!(paste(&path, &config(), "not json", (0.0, 0.0)).is_err());
        assert!(paste(&path, &config(), r#"{"wires": []}"#, (0.0, 0.0)).is_err());
        assert_eq!(load_session(&path, &config()).unwrap().history.len(), 1);
    }

    // ── Log & export ─────────────────────────────────────────────────────

    #[test]
    fn test_log_marks_current_step() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        wired(&path);
        step(&path, &config(), true).unwrap();
        let session = load_session(&path, &config()).unwrap();
        let entries = log_entries(&session.history);
        assert_eq!(entries.len(), 4);
        assert!(entries[2].current);
        assert_eq!(entries[0].desc, "Initial State");
        assert_eq!(entries[3].op, HistoryFlags::CREATE_ITEMS.bits());
    }

    #[test]
    fn test_export_at_step() {
        let dir = TempDir::new().unwrap();
        let path = new_session(dir.path());
        wired(&path);
        let live = export(&path, &config(), None).unwrap();
        assert_eq!(doc::items(&live, "wires").len(), 1);
        let first = export(&path, &config(), Some(1)).unwrap();
        assert_eq!(doc::items(&first, "nodes").len(), 1);
        assert!(doc::items(&first, "wires").is_empty());
        assert!(export(&path, &config(), Some(9)).is_err());
    }
}

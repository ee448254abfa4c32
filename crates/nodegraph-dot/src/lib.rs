//! Generate Graphviz DOT visualizations from node-graph scene documents.
//!
//! Renders a serialized [`Document`] scene as a left-to-right digraph.
//! Each node becomes an HTML-table box with its inputs in the left column
//! and its outputs in the right column, every socket a port. Wires become
//! edges from the output port to the input port. Selected nodes and wires
//! are drawn bold and orange, and sockets can be coloured by type.
//!
//! # Example
//!
//! ```
//! use nodegraph::v1::{Scene, Serializable, SocketType, WireType};
//! use nodegraph_dot::{render, RenderOptions};
//!
//! let mut scene = Scene::new();
//! let a = scene.create_node("Source", &[], &[SocketType::Type1]).unwrap();
//! let b = scene.create_node("Sink", &[SocketType::Type1], &[]).unwrap();
//! let out = scene.node(&a).unwrap().outputs()[0].id().to_string();
//! let inp = scene.node(&b).unwrap().inputs()[0].id().to_string();
//! scene.connect(&out, &inp, WireType::Bezier).unwrap();
//!
//! let dot = render(&scene.serialize(), &RenderOptions::default());
//! assert!(dot.contains("digraph nodegraph"));
//! assert!(dot.contains("Source"));
//! ```
//!
//! Pipe the output through Graphviz to produce images:
//!
//! ```bash
//! nodegraph render dot -i scene.json | dot -Tpng -o scene.png
//! ```

use std::collections::{BTreeSet, HashMap};

use nodegraph::v1::doc::{self, INPUTS, NODES, OUTPUTS, WIRES};
use nodegraph::v1::{Document, SocketType};
use serde_json::Value;

const SELECTED_COLOR: &str = "#ff8c00";
const NODE_FILL: &str = "#f8f9fa";
const TITLE_FILL: &str = "#dde3ea";

/// Options controlling what information is rendered in the DOT output.
pub struct RenderOptions {
    /// Fill each socket port with the colour of its socket type.
    pub show_socket_types: bool,
    /// Include each node's scene position under its title.
    pub show_positions: bool,
    /// Draw selected nodes and wires bold and orange.
    pub highlight_selection: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            show_socket_types: false,
            show_positions: false,
            highlight_selection: true,
        }
    }
}

/// Where a socket sits: the owning node and the port name inside it.
struct PortRef<'a> {
    node: &'a str,
    port: String,
    output: bool,
}

/// Render a scene document to a Graphviz DOT string.
///
/// Entries without an id are skipped. Wires whose endpoints do not resolve
/// to sockets in the document, or that do not join an output to an input,
/// are left out.
pub fn render(scene: &Document, options: &RenderOptions) -> String {
    let mut dot = String::new();
    dot.push_str("digraph nodegraph {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=plaintext, fontname=\"Helvetica\"];\n");
    dot.push_str("  edge [color=\"#666666\", arrowsize=0.7];\n\n");

    if let Some(id) = doc::id_of(scene) {
        dot.push_str(&format!("  // scene {}\n", escape_dot(id)));
    }

    let mut ports: HashMap<&str, PortRef> = HashMap::new();
    let mut types_used = BTreeSet::new();

    for node in doc::items(scene, NODES) {
        let Some(node_id) = doc::id_of(node) else {
            continue;
        };
        for (key, output) in [(INPUTS, false), (OUTPUTS, true)] {
            for socket in doc::items(node, key) {
                if let Some(sid) = doc::id_of(socket) {
                    ports.insert(
                        sid,
                        PortRef {
                            node: node_id,
                            port: port_name(sid),
                            output,
                        },
                    );
                }
                if let Some(t) = socket_type(socket) {
                    types_used.insert(u8::from(t));
                }
            }
        }

        let selected = options.highlight_selection && is_selected(node);
        let (color, penwidth) = if selected {
            (SELECTED_COLOR, "3")
        } else {
            ("#333333", "1")
        };
        dot.push_str(&format!(
            "  \"{}\" [label={}, color=\"{}\", penwidth={}];\n",
            escape_dot(node_id),
            format_node_label_html(node, options),
            color,
            penwidth
        ));
    }

    dot.push('\n');

    for wire in doc::items(scene, WIRES) {
        let endpoint = |key: &str| {
            wire.get(key)
                .and_then(Value::as_str)
                .and_then(|s| ports.get(s))
        };
        let (Some(a), Some(b)) = (endpoint("start"), endpoint("end")) else {
            continue;
        };
        let (from, to) = match (a.output, b.output) {
            (true, false) => (a, b),
            (false, true) => (b, a),
            _ => continue,
        };
        let style = if options.highlight_selection && is_selected(wire) {
            format!(" [color=\"{}\", penwidth=2.5]", SELECTED_COLOR)
        } else {
            String::new()
        };
        dot.push_str(&format!(
            "  \"{}\":\"{}\":e -> \"{}\":\"{}\":w{};\n",
            escape_dot(from.node),
            from.port,
            escape_dot(to.node),
            to.port,
            style
        ));
    }

    if options.show_socket_types && !types_used.is_empty() {
        dot.push_str("\n  // Legend\n");
        dot.push_str("  subgraph cluster_legend {\n");
        dot.push_str("    label=\"Socket types\";\n");
        dot.push_str("    fontname=\"Helvetica-Bold\";\n");
        dot.push_str("    style=filled;\n");
        dot.push_str("    fillcolor=\"#f8f8f8\";\n");
        dot.push_str("    node [shape=box, style=\"rounded,filled\", width=0.6, fontsize=10];\n");
        for raw in &types_used {
            if let Ok(t) = SocketType::try_from(*raw) {
                dot.push_str(&format!(
                    "    leg_type{} [label=\"{}\", fillcolor=\"{}\"];\n",
                    raw,
                    raw,
                    socket_color(t)
                ));
            }
        }
        dot.push_str("  }\n");
    }

    dot.push_str("}\n");
    dot
}

fn format_node_label_html(node: &Value, options: &RenderOptions) -> String {
    let title = node.get("title").and_then(Value::as_str).unwrap_or("");
    let inputs = doc::items(node, INPUTS);
    let outputs = doc::items(node, OUTPUTS);

    let mut label = String::from("<<table border=\"0\" cellborder=\"1\" cellspacing=\"0\" cellpadding=\"4\"");
    label.push_str(&format!(" bgcolor=\"{}\">", NODE_FILL));
    label.push_str(&format!(
        "<tr><td colspan=\"2\" bgcolor=\"{}\"><b>{}</b>",
        TITLE_FILL,
        escape_html(title)
    ));
    if options.show_positions {
        let coord = |k: &str| node.get(k).and_then(Value::as_f64).unwrap_or(0.0);
        label.push_str(&format!(
            "<br/><font point-size=\"9\" color=\"#666666\">({}, {})</font>",
            coord("pos_x"),
            coord("pos_y")
        ));
    }
    label.push_str("</td></tr>");

    for row in 0..inputs.len().max(outputs.len()) {
        label.push_str("<tr>");
        for side in [inputs, outputs] {
            match side.get(row) {
                Some(socket) => label.push_str(&socket_cell(socket, options)),
                None => label.push_str("<td border=\"0\"></td>"),
            }
        }
        label.push_str("</tr>");
    }

    label.push_str("</table>>");
    label
}

fn socket_cell(socket: &Value, options: &RenderOptions) -> String {
    let port = doc::id_of(socket).map(port_name).unwrap_or_default();
    let index = socket.get("index").and_then(Value::as_u64).unwrap_or(0);
    let fill = match socket_type(socket) {
        Some(t) if options.show_socket_types => format!(" bgcolor=\"{}\"", socket_color(t)),
        _ => String::new(),
    };
    format!(
        "<td port=\"{}\"{}><font point-size=\"9\">{}</font></td>",
        port, fill, index
    )
}

fn socket_type(socket: &Value) -> Option<SocketType> {
    socket
        .get("socket_type")
        .and_then(Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
        .and_then(|v| SocketType::try_from(v).ok())
}

fn is_selected(item: &Value) -> bool {
    item.get("selected").and_then(Value::as_bool).unwrap_or(false)
}

/// Port name for a socket id, restricted to characters DOT accepts unquoted.
fn port_name(socket_id: &str) -> String {
    let clean: String = socket_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("p_{}", clean)
}

/// Map a socket type to its fill color.
pub fn socket_color(socket_type: SocketType) -> &'static str {
    match socket_type {
        SocketType::Type1 => "#ff7700", // Orange
        SocketType::Type2 => "#52e220", // Green
        SocketType::Type3 => "#0056a6", // Blue
        SocketType::Type4 => "#a86db1", // Purple
        SocketType::Type5 => "#b54747", // Red
        SocketType::Type6 => "#dbe220", // Yellow
    }
}

/// Escape a string for use in DOT label attributes (double-quoted context).
pub fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Escape a string for use inside HTML-like DOT labels.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn socket(id: &str, index: u64, socket_type: u64) -> Value {
        json!({"id": id, "index": index, "position": 1, "socket_type": socket_type})
    }

    fn make_scene() -> Value {
        json!({
            "id": "scene-1",
            "scene_width": 64000,
            "scene_height": 64000,
            "nodes": [
                {
                    "id": "n1", "title": "Add <int>", "pos_x": 10.0, "pos_y": -20.0,
                    "inputs": [], "outputs": [socket("o1", 0, 1)],
                    "selected": true, "content": {}
                },
                {
                    "id": "n2", "title": "Print", "pos_x": 200.0, "pos_y": 0.0,
                    "inputs": [socket("i1", 0, 1), socket("i2", 1, 3)], "outputs": [],
                    "selected": false, "content": {}
                }
            ],
            "wires": [
                {"id": "w1", "wire_type": 1, "start": "i1", "end": "o1", "selected": true}
            ]
        })
    }

    // ── escape_dot ─────────────────────────────────────────────────────

    #[test]
    fn test_escape_dot_quotes() {
        assert_eq!(escape_dot(r#"say "hello""#), r#"say \"hello\""#);
    }

    #[test]
    fn test_escape_dot_backslash_and_newline() {
        assert_eq!(escape_dot("a\\b\nc"), r"a\\b\nc");
    }

    #[test]
    fn test_escape_dot_passthrough() {
        assert_eq!(escape_dot("simple text"), "simple text");
    }

    // ── escape_html ────────────────────────────────────────────────────

    #[test]
    fn test_escape_html_combined() {
        assert_eq!(
            escape_html(r#"<a href="x">&</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&lt;/a&gt;"
        );
    }

    // ── ports & colours ────────────────────────────────────────────────

    #[test]
    fn test_port_name_sanitizes() {
        assert_eq!(port_name("abc123"), "p_abc123");
        assert_eq!(port_name("a-b:c"), "p_a_b_c");
    }

    #[test]
    fn test_socket_colors_are_distinct() {
        let all = [
            SocketType::Type1,
            SocketType::Type2,
            SocketType::Type3,
            SocketType::Type4,
            SocketType::Type5,
            SocketType::Type6,
        ];
        let colors: BTreeSet<_> = all.iter().map(|t| socket_color(*t)).collect();
        assert_eq!(colors.len(), 6);
    }

    // ── render ─────────────────────────────────────────────────────────

    #[test]
    fn test_render_basic() {
        let dot = render(&make_scene(), &RenderOptions::default());
        assert!(dot.starts_with("digraph nodegraph {"));
        assert!(dot.contains("rankdir=LR"));
        assert!(dot.contains("// scene scene-1"));
        assert!(dot.contains("\"n1\" [label=<"));
        assert!(dot.contains("\"n2\" [label=<"));
        assert!(dot.contains("Add &lt;int&gt;"));
        assert!(dot.contains("port=\"p_i2\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_edge_runs_from_output_to_input() {
        let dot = render(&make_scene(), &RenderOptions::default());
        assert!(dot.contains("\"n1\":\"p_o1\":e -> \"n2\":\"p_i1\":w"));
        assert!(!dot.contains("\"n2\":\"p_i1\":e"));
    }

    #[test]
    fn test_selection_highlight() {
        let dot = render(&make_scene(), &RenderOptions::default());
        assert!(dot.contains(&format!("color=\"{}\", penwidth=3", SELECTED_COLOR)));
        assert!(dot.contains(&format!("[color=\"{}\", penwidth=2.5]", SELECTED_COLOR)));

        let plain = render(
            &make_scene(),
            &RenderOptions {
                highlight_selection: false,
                ..RenderOptions::default()
            },
        );
        assert!(!plain.contains(SELECTED_COLOR));
    }

    #[test]
    fn test_socket_types_and_legend() {
        let dot = render(&make_scene(), &RenderOptions::default());
        assert!(!dot.contains("cluster_legend"));

        let opts = RenderOptions {
            show_socket_types: true,
            ..RenderOptions::default()
        };
        let dot = render(&make_scene(), &opts);
        assert!(dot.contains(&format!("bgcolor=\"{}\"", socket_color(SocketType::Type2))));
        assert!(dot.contains("cluster_legend"));
        assert!(dot.contains("leg_type1"));
        assert!(dot.contains("leg_type3"));
        assert!(!dot.contains("leg_type0"));
    }

    #[test]
    fn test_show_positions() {
        let opts = RenderOptions {
            show_positions: true,
            ..RenderOptions::default()
        };
        let dot = render(&make_scene(), &opts);
        assert!(dot.contains("(10, -20)"));
    }

    #[test]
    fn test_unresolved_and_same_side_wires_are_skipped() {
        let mut scene = make_scene();
        scene["wires"] = json!([
            {"id": "w2", "wire_type": 1, "start": "o1", "end": "ghost", "selected": false},
            {"id": "w3", "wire_type": 1, "start": "i1", "end": "i2", "selected": false}
        ]);
        let dot = render(&scene, &RenderOptions::default());
        assert!(!dot.contains("->"));
    }

    #[test]
    fn test_render_empty_scene() {
        let dot = render(&json!({"nodes": [], "wires": []}), &RenderOptions::default());
        assert!(dot.contains("digraph nodegraph"));
        assert!(!dot.contains("// scene"));
        assert!(!dot.contains("->"));
    }
}

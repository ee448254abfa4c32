use anyhow::{Context, Result};
use clap::Subcommand;
use nodegraph::v1::{Document, Scene, Serializable};
use std::path::PathBuf;

#[derive(Subcommand, Debug)]
pub enum RenderFormat {
    /// Render as Graphviz DOT
    Dot {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file (writes to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Colour socket ports by socket type
        #[arg(long)]
        show_socket_types: bool,

        /// Show node positions in node labels
        #[arg(long)]
        show_positions: bool,

        /// Draw selected nodes and wires like the rest
        #[arg(long)]
        no_highlight: bool,
    },
}

pub fn run(format: RenderFormat) -> Result<()> {
    match format {
        RenderFormat::Dot {
            input,
            output,
            show_socket_types,
            show_positions,
            no_highlight,
        } => run_dot(
            input,
            output,
            nodegraph_dot::RenderOptions {
                show_socket_types,
                show_positions,
                highlight_selection: !no_highlight,
            },
        ),
    }
}

fn run_dot(
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    options: nodegraph_dot::RenderOptions,
) -> Result<()> {
    let content = if let Some(path) = &input {
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?
    } else {
        use std::io::Read;
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read from stdin")?;
        buf
    };

    let doc: Document = serde_json::from_str(&content).context("Failed to parse scene document")?;
    let mut scene = Scene::new();
    scene
        .load_document(&doc, true)
        .context("Invalid scene document")?;

    let dot = nodegraph_dot::render(&scene.serialize(), &options);

    if let Some(path) = &output {
        std::fs::write(path, &dot).with_context(|| format!("Failed to write {:?}", path))?;
    } else {
        print!("{}", dot);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodegraph::v1::{SocketType, WireType};
    use nodegraph_dot::RenderOptions;
    use std::io::Write;

    fn scene_file() -> tempfile::NamedTempFile {
        let mut scene = Scene::new();
        let a = scene.create_node("A", &[], &[SocketType::Type2]).unwrap();
        let b = scene.create_node("B", &[SocketType::Type2], &[]).unwrap();
        let out = scene.node(&a).unwrap().outputs()[0].id().to_string();
        let inp = scene.node(&b).unwrap().inputs()[0].id().to_string();
        scene.connect(&out, &inp, WireType::Bezier).unwrap();

        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", scene.serialize()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn test_run_dot_with_input_file() {
        let f = scene_file();
        let result = run_dot(Some(f.path().to_path_buf()), None, RenderOptions::default());
        assert!(result.is_ok());
    }

    #[test]
    fn test_run_dot_with_output_file() {
        let f = scene_file();
        let out = tempfile::NamedTempFile::new().unwrap();
        let result = run_dot(
            Some(f.path().to_path_buf()),
            Some(out.path().to_path_buf()),
            RenderOptions {
                show_socket_types: true,
                ..RenderOptions::default()
            },
        );
        assert!(result.is_ok());

        let content = std::fs::read_to_string(out.path()).unwrap();
        assert!(content.contains("digraph nodegraph"));
        assert!(content.contains("->"));
        assert!(content.contains("cluster_legend"));
    }

    #[test]
    fn test_run_dot_invalid_input() {
        let result = run_dot(Some(PathBuf::from("/nonexistent")), None, RenderOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_run_dot_invalid_json() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not valid json").unwrap();
        f.flush().unwrap();

        let result = run_dot(Some(f.path().to_path_buf()), None, RenderOptions::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_run_dot_rejects_malformed_scene() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"nodes": [{{"id": "n"}}], "wires": []}}"#).unwrap();
        f.flush().unwrap();

        let result = run_dot(Some(f.path().to_path_buf()), None, RenderOptions::default());
        assert!(result.is_err());
    }
}

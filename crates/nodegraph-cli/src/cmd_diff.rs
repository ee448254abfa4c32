use anyhow::{Context, Result};
use nodegraph::v1::{Document, Scene, Serializable, diff};
use serde_json::json;
use std::path::{Path, PathBuf};

pub fn run(old: PathBuf, new: PathBuf, pretty: bool) -> Result<()> {
    let previous = load_scene(&old)?;
    let current = load_scene(&new)?;
    println!("{}", format_output(&increment(&previous, &current), pretty)?);
    Ok(())
}

/// Read a scene file and rebuild it, so both sides are compared in their
/// canonical serialized form.
fn load_scene(path: &Path) -> Result<Document> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let doc: Document = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {:?}", path))?;
    let mut scene = Scene::new();
    scene
        .load_document(&doc, true)
        .with_context(|| format!("Invalid scene document {:?}", path))?;
    Ok(scene.serialize())
}

fn increment(previous: &Document, current: &Document) -> Document {
    let (change, remove) = diff::diff_scene(previous, current);
    json!({ "change": change, "remove": remove })
}

fn format_output(doc: &Document, pretty: bool) -> Result<String> {
    if pretty {
        serde_json::to_string_pretty(doc)
    } else {
        serde_json::to_string(doc)
    }
    .context("failed to serialize increment")
}

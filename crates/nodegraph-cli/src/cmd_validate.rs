use anyhow::{Context, Result};
use nodegraph::v1::{Scene, Serializable};
use std::path::PathBuf;

pub fn run(input: PathBuf) -> Result<()> {
    let content =
        std::fs::read_to_string(&input).with_context(|| format!("Failed to read {:?}", input))?;
    println!("{}", validate_content(&content)?);
    Ok(())
}

/// Parse and rebuild a scene, returning a one-line summary.
fn validate_content(content: &str) -> Result<String> {
    let doc: serde_json::Value =
        serde_json::from_str(content).map_err(|e| anyhow::anyhow!("Invalid: {}", e))?;
    let mut scene = Scene::new();
    scene
        .load_document(&doc, true)
        .map_err(|e| anyhow::anyhow!("Invalid: {}", e))?;
    let sockets: usize = scene.nodes().iter().map(|n| n.sockets().count()).sum();
    let listed = doc["wires"].as_array().map_or(0, Vec::len);
    let skipped = listed.saturating_sub(scene.wires().len());
    let mut summary = format!(
        "Valid: Scene (id: {}, {} nodes, {} sockets, {} wires",
        scene.id(),
        scene.nodes().len(),
        sockets,
        scene.wires().len()
    );
    if skipped > 0 {
        summary.push_str(&format!(", {} dangling wires skipped", skipped));
    }
    summary.push(')');
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SCENE: &str = r#"{
        "id": "s1", "scene_width": 64000, "scene_height": 64000,
        "nodes": [
            {"id": "a", "title": "A", "pos_x": 0, "pos_y": 0, "selected": false, "content": {},
             "inputs": [], "outputs": [{"id": "ao", "index": 0, "position": 4, "socket_type": 0}]},
            {"id": "b", "title": "B", "pos_x": 100, "pos_y": 0, "selected": false, "content": {},
             "inputs": [{"id": "bi", "index": 0, "position": 3, "socket_type": 0}], "outputs": []}
        ],
        "wires": [{"id": "w", "wire_type": 1, "start": "ao", "end": "bi", "selected": false}]
    }"#;

    #[test]
    fn test_validate_valid_scene() {
        let summary = validate_content(SCENE).unwrap();
        assert_eq!(summary, "Valid: Scene (id: s1, 2 nodes, 2 sockets, 1 wires)");
    }

    #[test]
    fn test_validate_empty_scene() {
        let summary = validate_content(r#"{"id": "e", "nodes": [], "wires": []}"#).unwrap();
        assert!(summary.contains("0 nodes"));
    }

    #[test]
    fn test_validate_invalid_json() {
        assert!(validate_content("not json").is_err());
    }

    #[test]
    fn test_validate_skips_dangling_wire() {
        let dangling = SCENE.replace(r#""end": "bi""#, r#""end": "nowhere""#);
        let summary = validate_content(&dangling).unwrap();
        assert_eq!(
            summary,
            "Valid: Scene (id: s1, 2 nodes, 2 sockets, 0 wires, 1 dangling wires skipped)"
        );
    }

    #[test]
    fn test_validate_missing_title() {
        let bad = SCENE.replace(r#""title": "A", "#, "");
        assert!(validate_content(&bad).is_err());
    }

    #[test]
    fn test_run_with_temp_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "{}", SCENE).unwrap();
        f.flush().unwrap();
        assert!(run(f.path().to_path_buf()).is_ok());
    }

    #[test]
    fn test_run_nonexistent_file() {
        assert!(run(PathBuf::from("/nonexistent/file.json")).is_err());
    }
}

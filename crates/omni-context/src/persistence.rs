use std::path::Path;

use chrono::Utc;
use omni_types::ProjectStructure;
use serde_json::Value;
use tokio::fs;

use crate::error::ContextError;

const CONTEXT_DIR: &str = ".omni/context";
const PROJECT_STRUCTURE_FILE: &str = "project-structure.json";

/// Persists the project structure under `<workspace>/.omni/context/`, the
/// same dot-directory convention the engine uses for all of its on-disk
/// state.
pub async fn save_project_structure(
    workspace_root: &Path,
    structure: &ProjectStructure,
) -> Result<(), ContextError> {
    let dir = workspace_root.join(CONTEXT_DIR);
    fs::create_dir_all(&dir).await?;
    let payload = serde_json::to_string_pretty(structure)?;
    fs::write(dir.join(PROJECT_STRUCTURE_FILE), payload).await?;
    Ok(())
}

/// Loads a previously persisted project structure, if any. A missing file
/// is not an error: callers treat it as "no structure yet" — and so is a
/// file that fails to parse, since a corrupt or stale persistence file
/// should never block a session from starting; it's logged and otherwise
/// swallowed. Legacy files whose per-file entries are bare strings (an
/// older on-disk shape) are upgraded to minimal structured summaries
/// before deserialization.
pub async fn load_project_structure(
    workspace_root: &Path,
) -> Result<Option<ProjectStructure>, ContextError> {
    let path = workspace_root.join(CONTEXT_DIR).join(PROJECT_STRUCTURE_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path).await?;

    let value: Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "persisted project structure is not valid JSON, ignoring");
            return Ok(None);
        }
    };
    let value = upgrade_legacy_summaries(value);

    match serde_json::from_value(value) {
        Ok(structure) => Ok(Some(structure)),
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "persisted project structure does not match the current shape, ignoring");
            Ok(None)
        }
    }
}

/// Upgrades `files` entries that are bare strings (a legacy summary shape
/// predating structured file summaries) into minimal `FileSummary` objects,
/// so an old persistence file from before structured summaries existed can
/// still be loaded instead of discarded outright.
fn upgrade_legacy_summaries(mut value: Value) -> Value {
    let Some(files) = value.get_mut("files").and_then(Value::as_object_mut) else {
        return value;
    };
    for (path, entry) in files.iter_mut() {
        if let Some(purpose) = entry.as_str() {
            let purpose = purpose.to_string();
            *entry = serde_json::json!({
                "path": path,
                "rel_path": path,
                "language": guess_language(path),
                "loc": 0,
                "purpose": purpose,
                "last_analyzed": Utc::now().to_rfc3339(),
            });
        }
    }
    value
}

/// Best-effort language guess from a file's extension, for the rare legacy
/// summary that carries no language of its own.
fn guess_language(path: &str) -> &'static str {
    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or_default();
    match ext {
        "py" => "python",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" => "javascript",
        "java" => "java",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" => "kotlin",
        "dart" => "dart",
        "vue" => "vue",
        "svelte" => "svelte",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::fs as tokio_fs;

    #[tokio::test]
    async fn round_trips_project_structure_through_disk() {
        let dir = tempdir().unwrap();
        let base = dir.path();
        let structure = ProjectStructure::default();

        assert!(load_project_structure(base).await.unwrap().is_none());

        save_project_structure(base, &structure).await.unwrap();
        let restored = load_project_structure(base).await.unwrap();
        assert_eq!(restored.unwrap().version, structure.version);
    }

    #[tokio::test]
    async fn missing_workspace_is_not_an_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("does-not-exist-yet");
        assert!(load_project_structure(&missing).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_json_is_treated_as_no_persisted_state() {
        let dir = tempdir().unwrap();
        let context_dir = dir.path().join(CONTEXT_DIR);
        tokio_fs::create_dir_all(&context_dir).await.unwrap();
        tokio_fs::write(context_dir.join(PROJECT_STRUCTURE_FILE), b"not json at all")
            .await
            .unwrap();

        assert!(load_project_structure(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn legacy_short_string_summaries_are_upgraded() {
        let dir = tempdir().unwrap();
        let context_dir = dir.path().join(CONTEXT_DIR);
        tokio_fs::create_dir_all(&context_dir).await.unwrap();
        let legacy = serde_json::json!({
            "project_type": "backend",
            "files": {
                "src/main.rs": "entry point",
            },
            "version": 3,
            "last_updated": Utc::now().to_rfc3339(),
        });
        tokio_fs::write(context_dir.join(PROJECT_STRUCTURE_FILE), legacy.to_string())
            .await
            .unwrap();

        let restored = load_project_structure(dir.path()).await.unwrap().unwrap();
        let summary = restored.files.get("src/main.rs").unwrap();
        assert_eq!(summary.purpose, "entry point");
        assert_eq!(summary.language, "rust");
        assert_eq!(summary.loc, 0);
    }
}

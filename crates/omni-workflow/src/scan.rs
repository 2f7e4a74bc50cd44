use std::path::{Path, PathBuf};

/// Directory names skipped regardless of `.gitignore` content — the
/// baseline ignore list (see the filesystem-layout section).
const BASELINE_IGNORE_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "dist",
    "build",
    ".next",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
    ".mypy_cache",
    ".pytest_cache",
    ".tox",
    ".cache",
    "coverage",
    "htmlcov",
];

/// File-name suffixes skipped regardless of `.gitignore` content.
const BASELINE_IGNORE_SUFFIXES: &[&str] = &[".pyc", ".egg-info", ".DS_Store", ".log"];

fn is_baseline_ignored(path: &Path) -> bool {
    let in_ignored_dir = path.components().any(|component| {
        let name = component.as_os_str().to_string_lossy();
        BASELINE_IGNORE_DIRS.contains(&name.as_ref())
    });
    if in_ignored_dir {
        return true;
    }
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    BASELINE_IGNORE_SUFFIXES.iter().any(|suffix| file_name.ends_with(suffix))
}

/// Walks `root`, honoring `.gitignore` via the `ignore` crate's default
/// wildmatch behavior plus the hardcoded baseline list, returning at most
/// `max_files` regular file paths in traversal order.
pub fn scan_workspace(root: &Path, max_files: usize) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut walker = ignore::WalkBuilder::new(root).build();
    while let Some(Ok(entry)) = walker.next() {
        if files.len() >= max_files {
            break;
        }
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let path = entry.path();
        if is_baseline_ignored(path) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_baseline_ignored_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::fs::write(root.join("node_modules/lib.js"), "x").unwrap();
        std::fs::write(root.join("main.rs"), "fn main() {}").unwrap();

        let files = scan_workspace(root, 50);
        assert!(files.iter().any(|p| p.ends_with("main.rs")));
        assert!(!files.iter().any(|p| p.to_string_lossy().contains("node_modules")));
    }

    #[test]
    fn caps_at_max_files() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        for i in 0..10 {
            std::fs::write(root.join(format!("f{i}.txt")), "x").unwrap();
        }
        let files = scan_workspace(root, 3);
        assert_eq!(files.len(), 3);
    }
}

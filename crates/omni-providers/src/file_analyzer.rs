use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Structured analysis of a single file's content, used to populate a
/// `FileSummary`. Produced by the file-analyzer collaborator, out of scope
/// for this specification beyond this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub language: String,
    pub loc: usize,
    pub classes: Vec<String>,
    pub functions: Vec<String>,
    pub imports_internal: Vec<String>,
    pub imports_external: Vec<String>,
    pub purpose: String,
    pub responsibilities: Vec<String>,
}

#[async_trait]
pub trait FileAnalyzer: Send + Sync {
    async fn analyze(&self, path: &str, content: &str) -> Result<FileAnalysis, String>;
}

/// Heuristic analyzer: extension-derived language, line count, and a handful
/// of regex-free substring scans for class/function/import tokens across the
/// common languages this runtime's workspaces are made of. A production
/// deployment can swap this for a language-server-backed analyzer behind
/// the same trait.
pub struct HeuristicFileAnalyzer;

fn language_for_extension(ext: &str) -> &'static str {
    match ext {
        "py" => "python",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        "php" => "php",
        "ts" => "typescript",
        "tsx" => "tsx",
        "js" => "javascript",
        "jsx" => "jsx",
        "vue" => "vue",
        "svelte" => "svelte",
        "c" => "c",
        "cpp" | "cc" | "cxx" => "cpp",
        "h" | "hpp" => "c-header",
        "cs" => "csharp",
        "md" => "markdown",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "toml" => "toml",
        _ => "unknown",
    }
}

#[async_trait]
impl FileAnalyzer for HeuristicFileAnalyzer {
    async fn analyze(&self, path: &str, content: &str) -> Result<FileAnalysis, String> {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        let language = language_for_extension(ext).to_string();
        let loc = content.lines().count();

        let mut classes = Vec::new();
        let mut functions = Vec::new();
        let mut imports_internal = Vec::new();
        let mut imports_external = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed
                .strip_prefix("class ")
                .or_else(|| trimmed.strip_prefix("pub struct "))
                .or_else(|| trimmed.strip_prefix("struct "))
            {
                if let Some(name) = first_identifier(rest) {
                    classes.push(name);
                }
            }
            if let Some(rest) = trimmed
                .strip_prefix("def ")
                .or_else(|| trimmed.strip_prefix("fn "))
                .or_else(|| trimmed.strip_prefix("pub fn "))
                .or_else(|| trimmed.strip_prefix("async fn "))
                .or_else(|| trimmed.strip_prefix("function "))
            {
                if let Some(name) = first_identifier(rest) {
                    functions.push(name);
                }
            }
            if trimmed.starts_with("import ") || trimmed.starts_with("from ") || trimmed.starts_with("use ") {
                let is_internal = trimmed.contains("./") || trimmed.contains("crate::") || trimmed.contains("self::");
                let target = trimmed.to_string();
                if is_internal {
                    imports_internal.push(target);
                } else {
                    imports_external.push(target);
                }
            }
        }

        let purpose = format!("{language} source file with {} declared function(s)", functions.len());
        let mut responsibilities = Vec::new();
        if !classes.is_empty() {
            responsibilities.push(format!("defines {} type(s)", classes.len()));
        }
        if !functions.is_empty() {
            responsibilities.push(format!("implements {} function(s)", functions.len()));
        }

        Ok(FileAnalysis {
            language,
            loc,
            classes,
            functions,
            imports_internal,
            imports_external,
            purpose,
            responsibilities,
        })
    }
}

fn first_identifier(rest: &str) -> Option<String> {
    let ident: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn analyzes_a_python_file() {
        let analyzer = HeuristicFileAnalyzer;
        let content = "import os\n\nclass Widget:\n    def render(self):\n        pass\n";
        let analysis = analyzer.analyze("widgets.py", content).await.unwrap();
        assert_eq!(analysis.language, "python");
        assert!(analysis.classes.contains(&"Widget".to_string()));
        assert!(analysis.functions.contains(&"render".to_string()));
        assert!(analysis.imports_external.iter().any(|i| i.contains("import os")));
    }
}

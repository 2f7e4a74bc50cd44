use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

/// One compliance rule, as loaded from a JSON or YAML rule file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub severity: String,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regulation: Option<String>,
    #[serde(default)]
    pub remediation: Option<String>,
}

/// Loads compliance rules from files in configured rule-file directories.
/// An empty rule set is legal: the Compliance agent treats it as "no custom
/// rules", not an error.
#[async_trait]
pub trait RuleFileParser: Send + Sync {
    async fn load_dir(&self, dir: &Path) -> Result<Vec<Rule>, String>;
}

/// Accepts both JSON (`.json`) and YAML (`.yml`/`.yaml`) rule files in a
/// directory; files that fail to parse are skipped with a warning rather
/// than aborting the whole load.
pub struct JsonYamlRuleParser;

#[async_trait]
impl RuleFileParser for JsonYamlRuleParser {
    async fn load_dir(&self, dir: &Path) -> Result<Vec<Rule>, String> {
        let mut rules = Vec::new();
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(rules),
            Err(err) => return Err(err.to_string()),
        };

        while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
            let path = entry.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            let raw = match fs::read_to_string(&path).await {
                Ok(raw) => raw,
                Err(_) => continue,
            };
            let parsed: Result<Vec<Rule>, _> = match ext {
                "json" => serde_json::from_str(&raw).map_err(|e| e.to_string()),
                "yml" | "yaml" => serde_yaml::from_str(&raw).map_err(|e| e.to_string()),
                _ => continue,
            };
            match parsed {
                Ok(loaded) => rules.extend(loaded),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unparsable rule file");
                }
            }
        }

        Ok(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_directory_yields_empty_rules() {
        let parser = JsonYamlRuleParser;
        let rules = parser
            .load_dir(Path::new("/nonexistent/rules/dir/for/tests"))
            .await
            .unwrap();
        assert!(rules.is_empty());
    }
}

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

/// Layered configuration: built-in defaults, then an optional
/// `--config` YAML file, then `OMNI_`-prefixed environment overrides
/// (`__` nests, e.g. `OMNI_SERVER__PORT`), then CLI flags. Each layer
/// merges into the last via [`merge`], so later layers win key-by-key
/// without clobbering sibling keys the way a flat overwrite would.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 7890, cors_origins: Vec::new(), debug: false, log_level: default_log_level() }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentsConfig {
    #[serde(default)]
    pub plugin_dirs: Vec<String>,
    #[serde(default = "default_agents")]
    pub default_agents: Vec<String>,
}

fn default_agents() -> Vec<String> {
    vec!["context".into(), "security".into(), "compliance".into(), "retrieval".into(), "coding".into()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturesConfig {
    #[serde(default = "default_true")]
    pub enable_streaming: bool,
    #[serde(default = "default_true")]
    pub enable_tool_use: bool,
    #[serde(default = "default_true")]
    pub enable_multi_agent: bool,
    #[serde(default = "default_true")]
    pub enable_rag: bool,
    #[serde(default)]
    pub enable_code_execution: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            enable_streaming: true,
            enable_tool_use: true,
            enable_multi_agent: true,
            enable_rag: true,
            enable_code_execution: false,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

fn default_log_format() -> String {
    "json".into()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            agents: AgentsConfig::default(),
            features: FeaturesConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Loads `RuntimeConfig`, merging built-in defaults with an optional YAML
/// file and `OMNI_`-prefixed environment overrides. `${VAR}` / `${VAR:default}`
/// tokens inside YAML string scalars are substituted against the process
/// environment before parsing.
pub fn load(config_path: Option<&Path>) -> anyhow::Result<RuntimeConfig> {
    let defaults = serde_yaml::to_value(RuntimeConfig::default())?;
    let mut merged = defaults;

    if let Some(path) = config_path {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config file {}: {e}", path.display()))?;
        let substituted = substitute_env(&raw);
        let file_value: Value = serde_yaml::from_str(&substituted)
            .map_err(|e| anyhow::anyhow!("parsing config file {}: {e}", path.display()))?;
        merge(&mut merged, file_value);
    }

    let env_value = env_overrides();
    merge(&mut merged, env_value);

    Ok(serde_yaml::from_value(merged)?)
}

/// Replaces `${VAR}` and `${VAR:default}` tokens with the named
/// environment variable, falling back to `default` (or the literal empty
/// string) when it is unset.
fn substitute_env(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '$' && input[i + 1..].starts_with('{') {
            if let Some(end) = input[i..].find('}') {
                let token = &input[i + 2..i + end];
                let (name, default) = match token.split_once(':') {
                    Some((n, d)) => (n, Some(d)),
                    None => (token, None),
                };
                let value = std::env::var(name).ok().or_else(|| default.map(str::to_string)).unwrap_or_default();
                out.push_str(&value);
                for _ in 0..end {
                    chars.next();
                }
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Builds a nested YAML mapping from `OMNI_`-prefixed environment
/// variables, splitting each remaining segment on `__` into a path of
/// lowercased keys (e.g. `OMNI_SERVER__PORT=9000` becomes
/// `{server: {port: "9000"}}`).
fn env_overrides() -> Value {
    let mut root: HashMap<String, Value> = HashMap::new();
    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix("OMNI_") else { continue };
        let segments: Vec<String> = rest.split("__").map(|s| s.to_lowercase()).collect();
        if segments.is_empty() {
            continue;
        }
        insert_path(&mut root, &segments, Value::String(value));
    }
    serde_yaml::to_value(root).unwrap_or(Value::Mapping(Default::default()))
}

fn insert_path(map: &mut HashMap<String, Value>, segments: &[String], leaf: Value) {
    if segments.len() == 1 {
        map.insert(segments[0].clone(), leaf);
        return;
    }
    let entry = map.entry(segments[0].clone()).or_insert_with(|| Value::Mapping(Default::default()));
    let mut nested = match entry.as_mapping() {
        Some(m) => m
            .iter()
            .filter_map(|(k, v)| k.as_str().map(|k| (k.to_string(), v.clone())))
            .collect::<HashMap<_, _>>(),
        None => HashMap::new(),
    };
    insert_path(&mut nested, &segments[1..], leaf);
    *entry = serde_yaml::to_value(nested).unwrap_or(Value::Mapping(Default::default()));
}

/// Recursively merges `overlay` into `base`, with `overlay`'s scalars and
/// sequences replacing `base`'s and mappings merging key-by-key.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_yaml() {
        let value = serde_yaml::to_value(RuntimeConfig::default()).unwrap();
        let parsed: RuntimeConfig = serde_yaml::from_value(value).unwrap();
        assert_eq!(parsed.server.port, 7890);
        assert_eq!(parsed.agents.default_agents.len(), 5);
    }

    #[test]
    fn env_substitution_uses_fallback_when_unset() {
        let input = "host: ${OMNI_TEST_HOST_NOT_SET:0.0.0.0}";
        assert_eq!(substitute_env(input), "host: 0.0.0.0");
    }

    #[test]
    fn merge_overwrites_only_named_keys() {
        let mut base = serde_yaml::to_value(RuntimeConfig::default()).unwrap();
        let overlay: Value = serde_yaml::from_str("server:\n  port: 9000\n").unwrap();
        merge(&mut base, overlay);
        let merged: RuntimeConfig = serde_yaml::from_value(base).unwrap();
        assert_eq!(merged.server.port, 9000);
        assert_eq!(merged.server.host, "127.0.0.1");
    }
}

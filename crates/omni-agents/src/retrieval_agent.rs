use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use omni_context::SharedContext;
use omni_errors::Result;
use omni_providers::{ChatMessage, LlmConfig, LlmProvider, SearchConfig, SearchResult, VectorStore};
use omni_types::{AgentCapability, AgentMessage, AgentMessageKind, AgentMetadata, AgentStatus};
use parking_lot::RwLock;

use crate::contract::{Agent, StatusCell};

/// Keyword patterns that route a query to a collection ("domain") before
/// any LLM fallback is considered. `general` is not listed here; it is the
/// always-searched fallback domain when nothing else matches.
const DOMAIN_KEYWORDS: &[(&str, &[&str])] = &[
    ("security", &["vulnerability", "cve", "exploit", "auth", "secret", "encryption"]),
    ("api", &["endpoint", "route", "api", "request", "response", "rest"]),
    ("database", &["schema", "query", "migration", "table", "index", "sql"]),
    ("frontend", &["component", "render", "ui", "view", "style", "layout"]),
];

const NOISE_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "of", "to", "for", "in", "on", "and", "or", "please", "can",
    "you", "me", "i", "it", "this", "that", "with", "how", "do", "does",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Compact,
    Raw,
}

/// Removes the closed noise-word set from `query`, case-insensitively,
/// preserving the order of the remaining tokens.
pub fn optimize_query(query: &str) -> String {
    query
        .split_whitespace()
        .filter(|word| {
            let lower = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            !lower.is_empty() && !NOISE_WORDS.contains(&lower.as_str())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Selects the collections to search: keyword matches first, then the
/// context's detected task intent as a hint, falling back to `general`.
pub fn select_domains(query: &str, task_hint: Option<&str>) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut domains: Vec<String> = DOMAIN_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| lower.contains(kw)))
        .map(|(domain, _)| domain.to_string())
        .collect();

    if domains.is_empty() {
        if let Some(hint) = task_hint {
            let hint_lower = hint.to_lowercase();
            if let Some((domain, _)) = DOMAIN_KEYWORDS.iter().find(|(_, kws)| kws.iter().any(|kw| hint_lower.contains(kw))) {
                domains.push(domain.to_string());
            }
        }
    }

    if domains.is_empty() {
        domains.push("general".to_string());
    } else if !domains.contains(&"general".to_string()) {
        domains.push("general".to_string());
    }
    domains
}

fn fallback_embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; 8];
    for (i, byte) in text.bytes().enumerate() {
        vector[i % vector.len()] += byte as f32;
    }
    vector
}

struct CacheEntry {
    inserted_at: Instant,
    results: Vec<SearchResult>,
}

/// Indexes and retrieves context snippets across domain collections:
/// keyword-then-hint domain selection, noise-word-stripped queries,
/// cross-domain prefix dedup, and a TTL + size-capped query cache.
pub struct RetrievalAgent {
    metadata: AgentMetadata,
    status: StatusCell,
    store: Arc<dyn VectorStore>,
    llm: RwLock<Option<Arc<dyn LlmProvider>>>,
    llm_domain_fallback_enabled: bool,
    cache: RwLock<VecDeque<(String, CacheEntry)>>,
    cache_ttl: Duration,
    cache_max_size: usize,
    output_mode: OutputMode,
}

impl RetrievalAgent {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            metadata: AgentMetadata {
                id: "retrieval".to_string(),
                name: "Retrieval Agent".to_string(),
                description: "Selects domains, optimizes queries, and retrieves indexed context".to_string(),
                version: "1.0.0".to_string(),
                capabilities: vec![
                    AgentCapability::Retrieval,
                    AgentCapability::AcceptsLlm,
                    AgentCapability::AcceptsContext,
                ],
                dependencies: vec!["context".to_string()],
                provides: vec!["relevant_summaries".to_string()],
                tags: vec!["retrieval".to_string(), "rag".to_string()],
            },
            status: StatusCell::new(),
            store,
            llm: RwLock::new(None),
            llm_domain_fallback_enabled: false,
            cache: RwLock::new(VecDeque::new()),
            cache_ttl: Duration::from_secs(300),
            cache_max_size: 100,
            output_mode: OutputMode::Compact,
        }
    }

    pub fn with_llm_domain_fallback(mut self, enabled: bool) -> Self {
        self.llm_domain_fallback_enabled = enabled;
        self
    }

    pub fn with_cache_limits(mut self, ttl: Duration, max_size: usize) -> Self {
        self.cache_ttl = ttl;
        self.cache_max_size = max_size;
        self
    }

    pub async fn index(&self, collection: &str, id: &str, content: &str, metadata: serde_json::Value) -> Result<()> {
        let embedding = self.embed(content).await;
        let _ = self.store.create_collection(collection, embedding.len()).await;
        self.store
            .upsert(
                collection,
                vec![omni_providers::Document {
                    id: id.to_string(),
                    content: content.to_string(),
                    embedding,
                    metadata,
                }],
            )
            .await
            .map_err(|e| omni_errors::OmniError::new(omni_errors::ErrorKind::RagIndex, e))?;
        Ok(())
    }

    async fn embed(&self, text: &str) -> Vec<f32> {
        if let Some(llm) = self.llm.read().clone() {
            if let Ok(mut vectors) = llm.embed(&[text.to_string()]).await {
                if let Some(vector) = vectors.pop() {
                    return vector;
                }
            }
        }
        fallback_embed(text)
    }

    async fn llm_domain_hint(&self, query: &str) -> Option<String> {
        if !self.llm_domain_fallback_enabled {
            return None;
        }
        let llm = self.llm.read().clone()?;
        let known: Vec<&str> = DOMAIN_KEYWORDS.iter().map(|(d, _)| *d).chain(["general"]).collect();
        let prompt = format!(
            "Classify this query into exactly one of {known:?}, respond with just the domain name: {query}"
        );
        let response = llm
            .complete(
                &[ChatMessage { role: "user".to_string(), content: prompt }],
                &LlmConfig::default(),
            )
            .await
            .ok()?;
        let content = response.content?;
        let candidate = content.trim().to_lowercase();
        known.iter().find(|d| **d == candidate).map(|d| d.to_string())
    }

    fn cache_key(query: &str, domains: &[String]) -> String {
        format!("{}::{}", domains.join(","), query)
    }

    fn cache_get(&self, key: &str) -> Option<Vec<SearchResult>> {
        let cache = self.cache.read();
        cache.iter().find(|(k, _)| k == key).and_then(|(_, entry)| {
            if entry.inserted_at.elapsed() < self.cache_ttl {
                Some(entry.results.clone())
            } else {
                None
            }
        })
    }

    fn cache_put(&self, key: String, results: Vec<SearchResult>) {
        let mut cache = self.cache.write();
        cache.retain(|(k, _)| k != &key);
        while cache.len() >= self.cache_max_size {
            cache.pop_front();
        }
        cache.push_back((key, CacheEntry { inserted_at: Instant::now(), results }));
    }

    /// Runs the full retrieval pipeline: domain selection, query
    /// optimization, per-domain search with prefix dedup, threshold
    /// filtering, and cache lookup/population.
    pub async fn retrieve(&self, raw_query: &str, task_hint: Option<&str>, top_k: usize) -> Vec<SearchResult> {
        let optimized = optimize_query(raw_query);
        let mut domains = select_domains(&optimized, task_hint);
        if let Some(hint_domain) = self.llm_domain_hint(&optimized).await {
            if !domains.contains(&hint_domain) {
                domains.push(hint_domain);
            }
        }

        let key = Self::cache_key(&optimized, &domains);
        if let Some(cached) = self.cache_get(&key) {
            return cached;
        }

        let embedding = self.embed(&optimized).await;
        let config = SearchConfig {
            top_k,
            score_threshold: Some(0.2),
            filter: None,
            include_metadata: true,
            include_embeddings: false,
        };

        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let mut merged = Vec::new();
        for domain in &domains {
            if let Ok(results) = self.store.search(domain, &embedding, &config).await {
                for result in results {
                    let prefix: String = result.document.content.chars().take(48).collect();
                    if seen_prefixes.insert(prefix) {
                        merged.push(result);
                    }
                }
            }
        }
        merged.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        merged.truncate(if top_k == 0 { merged.len() } else { top_k });

        self.cache_put(key, merged.clone());
        merged
    }

    pub fn format_results(&self, results: &[SearchResult]) -> String {
        match self.output_mode {
            OutputMode::Compact => results
                .iter()
                .map(|r| format!("- {} (score {:.2})", truncate(&r.document.content, 96), r.score))
                .collect::<Vec<_>>()
                .join("\n"),
            OutputMode::Raw => results
                .iter()
                .map(|r| r.document.content.clone())
                .collect::<Vec<_>>()
                .join("\n---\n"),
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}…", &s[..max])
    }
}

#[async_trait]
impl Agent for RetrievalAgent {
    fn metadata(&self) -> &AgentMetadata {
        &self.metadata
    }

    fn status(&self) -> AgentStatus {
        self.status.get()
    }

    async fn process(&self, message: AgentMessage, context: &SharedContext) -> Result<AgentMessage> {
        self.status.set(AgentStatus::Thinking);

        if let Some(path) = message.metadata.get("generated_file_path").and_then(|v| v.as_str()) {
            let path = path.to_string();
            self.index("general", &path, &message.content, serde_json::json!({ "path": path })).await?;
            self.status.set(AgentStatus::Idle);
            return Ok(AgentMessage::new(
                AgentMessageKind::Status,
                &self.metadata.id,
                format!("indexed generated file {path}"),
            ));
        }

        let task_hint = context
            .get_project_structure()
            .await
            .and_then(|s| s.conventions.get("current_task").and_then(|v| v.as_str().map(str::to_string)));

        let results = self.retrieve(&message.content, task_hint.as_deref(), 5).await;
        let formatted = self.format_results(&results);
        let summaries: Vec<String> = results.iter().map(|r| r.document.content.clone()).collect();
        context.set_relevant_summaries(summaries).await;

        self.status.set(AgentStatus::Idle);
        Ok(AgentMessage::new(AgentMessageKind::ToolResult, &self.metadata.id, formatted)
            .with_metadata(serde_json::json!({ "result_count": results.len() })))
    }

    fn accepts_llm(&self) -> bool {
        true
    }

    fn set_llm(&self, llm: Arc<dyn LlmProvider>) {
        *self.llm.write() = Some(llm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use omni_providers::InMemoryVectorStore;

    #[test]
    fn optimize_query_strips_noise_words() {
        assert_eq!(optimize_query("can you explain the auth flow"), "explain auth flow");
    }

    #[test]
    fn select_domains_matches_security_keywords() {
        let domains = select_domains("how does the auth token get validated", None);
        assert!(domains.contains(&"security".to_string()));
    }

    #[tokio::test]
    async fn retrieve_dedups_across_domains_and_caches() {
        let store = Arc::new(InMemoryVectorStore::new());
        let agent = RetrievalAgent::new(store.clone());
        agent
            .index("general", "doc-1", "auth flow uses JWT tokens", serde_json::Value::Null)
            .await
            .unwrap();

        let first = agent.retrieve("explain auth flow", None, 5).await;
        assert_eq!(first.len(), 1);
        let second = agent.retrieve("explain auth flow", None, 5).await;
        assert_eq!(second.len(), 1);
    }
}

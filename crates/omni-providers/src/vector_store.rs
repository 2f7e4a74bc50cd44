use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

/// One embedded unit in the vector store, keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    pub top_k: usize,
    pub score_threshold: Option<f32>,
    pub filter: Option<Value>,
    pub include_metadata: bool,
    pub include_embeddings: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: Document,
    pub score: f32,
}

/// The vector-store collaborator named in the external-interfaces section.
/// Collections are namespaces the Retrieval agent indexes per "domain".
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), String>;
    async fn delete_collection(&self, name: &str) -> Result<(), String>;
    async fn collection_exists(&self, name: &str) -> bool;
    async fn list_collections(&self) -> Vec<String>;
    async fn upsert(&self, collection: &str, documents: Vec<Document>) -> Result<usize, String>;
    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, String>;
    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        config: &SearchConfig,
    ) -> Result<Vec<SearchResult>, String>;
    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>, String>;
    async fn count(&self, collection: &str) -> Result<usize, String>;
}

#[derive(Default)]
struct Collection {
    dimension: usize,
    documents: HashMap<String, Document>,
}

/// In-process vector store backed by cosine similarity over held-in-memory
/// embeddings. Used for tests and `demo` mode; a real deployment would
/// point `VectorStore` at qdrant/chroma/faiss instead.
#[derive(Clone, Default)]
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<(), String> {
        self.collections.write().await.entry(name.to_string()).or_insert_with(|| Collection {
            dimension,
            documents: HashMap::new(),
        });
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<(), String> {
        self.collections.write().await.remove(name);
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> bool {
        self.collections.read().await.contains_key(name)
    }

    async fn list_collections(&self) -> Vec<String> {
        self.collections.read().await.keys().cloned().collect()
    }

    async fn upsert(&self, collection: &str, documents: Vec<Document>) -> Result<usize, String> {
        let mut collections = self.collections.write().await;
        let entry = collections
            .entry(collection.to_string())
            .or_insert_with(Collection::default);
        let count = documents.len();
        for document in documents {
            if entry.dimension == 0 {
                entry.dimension = document.embedding.len();
            }
            entry.documents.insert(document.id.clone(), document);
        }
        Ok(count)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<usize, String> {
        let mut collections = self.collections.write().await;
        let Some(entry) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let mut removed = 0;
        for id in ids {
            if entry.documents.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn search(
        &self,
        collection: &str,
        query_embedding: &[f32],
        config: &SearchConfig,
    ) -> Result<Vec<SearchResult>, String> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<SearchResult> = entry
            .documents
            .values()
            .map(|doc| SearchResult {
                document: doc.clone(),
                score: cosine_similarity(query_embedding, &doc.embedding),
            })
            .filter(|r| config.score_threshold.map(|t| r.score >= t).unwrap_or(true))
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let top_k = if config.top_k == 0 { scored.len() } else { config.top_k };
        scored.truncate(top_k);
        if !config.include_embeddings {
            for result in &mut scored {
                result.document.embedding.clear();
            }
        }
        if !config.include_metadata {
            for result in &mut scored {
                result.document.metadata = Value::Null;
            }
        }
        Ok(scored)
    }

    async fn get(&self, collection: &str, ids: &[String]) -> Result<Vec<Document>, String> {
        let collections = self.collections.read().await;
        let Some(entry) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(ids.iter().filter_map(|id| entry.documents.get(id).cloned()).collect())
    }

    async fn count(&self, collection: &str) -> Result<usize, String> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|c| c.documents.len())
            .unwrap_or(0))
    }
}

//! In-memory vector store.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector
//! store backed by a `HashMap` protected by a `tokio::sync::RwLock`. It ranks
//! by each collection's configured [`Distance`] and evaluates [`Filter`]s
//! locally, which makes it suitable for development, testing, and small
//! single-process deployments.
//!
//! [`Filter`]: crate::filter::Filter

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Point, SearchResult};
use crate::embedding::{cosine_similarity, dot_product, euclidean_distance};
use crate::error::{RagError, Result};
use crate::vectorstore::{
    CollectionConfig, CollectionInfo, CollectionUpdate, Distance, SearchRequest, VectorStore,
};

const BACKEND: &str = "in-memory vector store";

#[derive(Debug)]
struct StoredCollection {
    config: CollectionConfig,
    settings: CollectionUpdate,
    points: HashMap<String, Point>,
}

/// An in-memory vector store.
///
/// Collections are stored as nested `HashMap`s: collection name → point ID → point.
/// The outer map is `None` once [`shutdown`](VectorStore::shutdown) has run.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::{CollectionConfig, Distance, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", CollectionConfig::new(384, Distance::Cosine)).await?;
/// ```
#[derive(Debug)]
pub struct InMemoryVectorStore {
    collections: RwLock<Option<HashMap<String, StoredCollection>>>,
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self { collections: RwLock::new(Some(HashMap::new())) }
    }
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_initialized() -> RagError {
    RagError::NotInitialized(BACKEND.to_string())
}

fn not_found(name: &str) -> RagError {
    RagError::CollectionNotFound(name.to_string())
}

/// Score a stored vector against the query; higher is always more similar.
fn score(distance: Distance, stored: &[f32], query: &[f32]) -> f32 {
    match distance {
        Distance::Cosine => cosine_similarity(stored, query),
        Distance::Dot => dot_product(stored, query),
        Distance::Euclid => -euclidean_distance(stored, query),
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()> {
        if config.vector_size == 0 {
            return Err(RagError::ConfigError("vector_size must be greater than zero".into()));
        }
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(not_initialized)?;
        if collections.contains_key(name) {
            debug!(collection = name, "collection already exists, skipping creation");
            return Ok(());
        }
        collections.insert(
            name.to_string(),
            StoredCollection { config, settings: CollectionUpdate::default(), points: HashMap::new() },
        );
        debug!(
            collection = name,
            vector_size = config.vector_size,
            distance = %config.distance,
            "created collection"
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(not_initialized)?;
        collections.remove(name).ok_or_else(|| not_found(name))?;
        debug!(collection = name, "deleted collection");
        Ok(())
    }

    async fn update_collection(&self, name: &str, update: CollectionUpdate) -> Result<()> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(not_initialized)?;
        let stored = collections.get_mut(name).ok_or_else(|| not_found(name))?;
        if let Some(threshold) = update.indexing_threshold {
            stored.settings.indexing_threshold = Some(threshold);
        }
        if let Some(on_disk) = update.on_disk_payload {
            stored.settings.on_disk_payload = Some(on_disk);
        }
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(not_initialized)?;
        let stored = collections.get(name).ok_or_else(|| not_found(name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            vector_size: stored.config.vector_size,
            distance: stored.config.distance,
            points_count: stored.points.len() as u64,
            settings: stored.settings.clone(),
        })
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(not_initialized)?;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        let mut guard = self.collections.write().await;
        let collections = guard.as_mut().ok_or_else(not_initialized)?;
        let stored = collections.get_mut(collection).ok_or_else(|| not_found(collection))?;

        let expected = stored.config.vector_size;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != expected) {
            return Err(RagError::DimensionMismatch { expected, actual: bad.vector.len() });
        }

        for point in points {
            stored.points.insert(point.id.clone(), point.clone());
        }
        debug!(collection, count = points.len(), "upserted points");
        Ok(())
    }

    async fn search(&self, collection: &str, request: SearchRequest) -> Result<Vec<SearchResult>> {
        let guard = self.collections.read().await;
        let collections = guard.as_ref().ok_or_else(not_initialized)?;
        let stored = collections.get(collection).ok_or_else(|| not_found(collection))?;

        let expected = stored.config.vector_size;
        if request.vector.len() != expected {
            return Err(RagError::DimensionMismatch { expected, actual: request.vector.len() });
        }

        let distance = stored.config.distance;
        let mut scored: Vec<SearchResult> = stored
            .points
            .values()
            .filter(|point| request.filter.as_ref().is_none_or(|f| f.matches(&point.payload)))
            .map(|point| SearchResult {
                id: point.id.clone(),
                score: score(distance, &point.vector, &request.vector),
                payload: point.payload.clone(),
            })
            .filter(|result| request.score_threshold.is_none_or(|t| result.score >= t))
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(request.limit);
        Ok(scored)
    }

    async fn shutdown(&self) -> Result<()> {
        let mut guard = self.collections.write().await;
        if guard.take().is_some() {
            debug!("in-memory vector store shut down");
        }
        Ok(())
    }
}

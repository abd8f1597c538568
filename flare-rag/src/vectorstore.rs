//! Vector store trait and collection-level types.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::{Point, SearchResult};
use crate::error::{RagError, Result};
use crate::filter::Filter;

/// The similarity function a collection ranks vectors by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity, in `[-1, 1]`.
    #[default]
    Cosine,
    /// Raw dot product.
    Dot,
    /// Euclidean distance, scored as its negation so higher is closer.
    Euclid,
}

impl FromStr for Distance {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Distance::Cosine),
            "dot" => Ok(Distance::Dot),
            "euclid" | "euclidean" => Ok(Distance::Euclid),
            _ => Err(RagError::UnknownDistance(s.to_string())),
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Distance::Cosine => "cosine",
            Distance::Dot => "dot",
            Distance::Euclid => "euclid",
        })
    }
}

/// Vector parameters fixed at collection creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Dimensionality of every vector in the collection.
    pub vector_size: usize,
    /// Ranking metric.
    pub distance: Distance,
}

impl CollectionConfig {
    /// Create a collection config.
    pub fn new(vector_size: usize, distance: Distance) -> Self {
        Self { vector_size, distance }
    }
}

/// Mutable collection settings. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionUpdate {
    /// Number of vectors after which the backend builds an ANN index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexing_threshold: Option<u64>,
    /// Keep payloads on disk instead of in memory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_disk_payload: Option<bool>,
}

/// A snapshot of a collection's configuration and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Vector size.
    pub vector_size: usize,
    /// Ranking metric.
    pub distance: Distance,
    /// Number of stored points.
    pub points_count: u64,
    /// Current mutable settings.
    pub settings: CollectionUpdate,
}

/// Parameters of a nearest-neighbour search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query vector.
    pub vector: Vec<f32>,
    /// Maximum number of results.
    pub limit: usize,
    /// Results scoring below this are dropped.
    pub score_threshold: Option<f32>,
    /// Payload filter.
    pub filter: Option<Filter>,
}

impl SearchRequest {
    /// A plain top-`limit` search.
    pub fn new(vector: Vec<f32>, limit: usize) -> Self {
        Self { vector, limit, score_threshold: None, filter: None }
    }

    /// Drop results scoring below `threshold`.
    pub fn with_score_threshold(mut self, threshold: Option<f32>) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Restrict results to payloads accepted by `filter`.
    pub fn with_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }
}

/// A collection management action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionAction {
    /// Drop the collection and its points.
    Delete,
    /// Change mutable settings.
    Update(CollectionUpdate),
    /// Describe the collection.
    GetInfo,
}

impl CollectionAction {
    /// Parse an action name (`delete`, `update`, `get_info`), attaching
    /// `update` settings when the action needs them.
    pub fn parse(name: &str, update: Option<CollectionUpdate>) -> Result<Self> {
        match name {
            "delete" => Ok(CollectionAction::Delete),
            "update" => Ok(CollectionAction::Update(update.unwrap_or_default())),
            "get_info" => Ok(CollectionAction::GetInfo),
            other => Err(RagError::UnknownAction(other.to_string())),
        }
    }
}

/// What a [`VectorStore::manage`] call did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManageOutcome {
    /// The collection was deleted.
    Deleted,
    /// The collection settings were updated.
    Updated,
    /// The collection description.
    Info(CollectionInfo),
}

/// A storage backend for vector points with filtered similarity search.
///
/// Implementations manage named collections of [`Point`]s. All operations
/// fail with [`RagError::NotInitialized`] once the store has been shut down.
///
/// # Example
///
/// ```rust,ignore
/// use flare_rag::{CollectionConfig, InMemoryVectorStore, SearchRequest, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("docs", CollectionConfig::new(1024, Distance::Cosine)).await?;
/// store.upsert("docs", &points).await?;
/// let results = store.search("docs", SearchRequest::new(query, 5)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Change mutable collection settings.
    async fn update_collection(&self, name: &str, update: CollectionUpdate) -> Result<()>;

    /// Describe a collection.
    async fn collection_info(&self, name: &str) -> Result<CollectionInfo>;

    /// List collection names.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Insert or overwrite points by id.
    ///
    /// Every vector must match the collection's configured size.
    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()>;

    /// Search for the most similar points.
    ///
    /// Returns results ordered by descending score, at most `limit` of them,
    /// none below the score threshold.
    async fn search(&self, collection: &str, request: SearchRequest) -> Result<Vec<SearchResult>>;

    /// Dispatch a management action.
    async fn manage(&self, name: &str, action: CollectionAction) -> Result<ManageOutcome> {
        match action {
            CollectionAction::Delete => {
                self.delete_collection(name).await?;
                Ok(ManageOutcome::Deleted)
            }
            CollectionAction::Update(update) => {
                self.update_collection(name, update).await?;
                Ok(ManageOutcome::Updated)
            }
            CollectionAction::GetInfo => Ok(ManageOutcome::Info(self.collection_info(name).await?)),
        }
    }

    /// Release the backend connection. Later calls fail with `NotInitialized`.
    async fn shutdown(&self) -> Result<()>;
}

//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//! Filters are translated to native Qdrant filters so they are evaluated
//! server-side.
//!
//! Qdrant reports raw Euclidean distance for `Euclid` collections. Scores and
//! thresholds are negated at this boundary so that, as with every other
//! store, a higher score is always closer.
//!
//! # Example
//!
//! ```rust,ignore
//! use flare_rag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::connect("http://localhost:6334", None)?;
//! store.create_collection("docs", CollectionConfig::new(1024, Distance::Cosine)).await?;
//! ```

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::vectors_config::Config as VectorsConfigKind;
use qdrant_client::qdrant::{
    CollectionParamsDiff, Condition, CreateCollectionBuilder, Distance as QdrantDistance,
    Filter as QdrantFilter, OptimizersConfigDiff, PointStruct, Range as QdrantRange, ScoredPoint,
    SearchPointsBuilder, UpdateCollectionBuilder, UpsertPointsBuilder, Value as QdrantValue,
    VectorParamsBuilder,
};
use qdrant_client::{Payload as QdrantPayload, Qdrant, QdrantError};
use serde_json::{Number, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Payload, Point, SearchResult};
use crate::error::{RagError, Result};
use crate::filter::{Combinator, FieldCondition, Filter, MatchValue};
use crate::vectorstore::{
    CollectionConfig, CollectionInfo, CollectionUpdate, Distance, SearchRequest, VectorStore,
};

/// The default Qdrant gRPC address.
pub const DEFAULT_URL: &str = "http://localhost:6334";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
pub struct QdrantVectorStore {
    client: RwLock<Option<Qdrant>>,
}

impl QdrantVectorStore {
    /// Connect to the given URL with an optional API key.
    pub fn connect(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).api_key(api_key).build().map_err(map_err)?;
        debug!(url, "qdrant client configured");
        Ok(Self::from_client(client))
    }

    /// Connect to `http://localhost:6334` without authentication.
    pub fn default_url() -> Result<Self> {
        Self::connect(DEFAULT_URL, None)
    }

    /// Wrap an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client: RwLock::new(Some(client)) }
    }

    async fn exists(client: &Qdrant, name: &str) -> Result<bool> {
        let collections = client.list_collections().await.map_err(map_err)?;
        Ok(collections.collections.iter().any(|c| c.name == name))
    }

    async fn info(client: &Qdrant, name: &str) -> Result<CollectionInfo> {
        let response = client.collection_info(name).await.map_err(|e| map_named_err(e, name))?;
        let info = response.result.ok_or_else(|| not_found(name))?;
        let config = info.config.unwrap_or_default();
        let params = config.params.unwrap_or_default();

        let (vector_size, distance) = match params.vectors_config.and_then(|v| v.config) {
            Some(VectorsConfigKind::Params(p)) => {
                let distance = QdrantDistance::try_from(p.distance).map_err(|_| {
                    upstream(format!("collection '{name}' has unknown distance {}", p.distance))
                })?;
                (p.size as usize, from_qdrant_distance(distance)?)
            }
            _ => {
                return Err(upstream(format!("collection '{name}' has no single vector config")));
            }
        };

        Ok(CollectionInfo {
            name: name.to_string(),
            vector_size,
            distance,
            points_count: info.points_count.unwrap_or(0),
            settings: CollectionUpdate {
                indexing_threshold: config.optimizer_config.and_then(|o| o.indexing_threshold),
                on_disk_payload: Some(params.on_disk_payload),
            },
        })
    }
}

fn upstream(message: String) -> RagError {
    RagError::VectorStoreError { backend: "qdrant".to_string(), message }
}

fn map_err(e: QdrantError) -> RagError {
    upstream(e.to_string())
}

fn not_found(name: &str) -> RagError {
    RagError::CollectionNotFound(name.to_string())
}

/// Map "collection missing" responses onto [`RagError::CollectionNotFound`].
fn map_named_err(e: QdrantError, name: &str) -> RagError {
    let message = e.to_string();
    let lower = message.to_ascii_lowercase();
    if lower.contains("not found") || lower.contains("doesn't exist") {
        not_found(name)
    } else {
        upstream(message)
    }
}

/// Vector size check run before any request reaches Qdrant.
fn ensure_dimension(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RagError::DimensionMismatch { expected, actual })
    }
}

fn not_initialized() -> RagError {
    RagError::NotInitialized("qdrant vector store".to_string())
}

fn to_qdrant_distance(distance: Distance) -> QdrantDistance {
    match distance {
        Distance::Cosine => QdrantDistance::Cosine,
        Distance::Dot => QdrantDistance::Dot,
        Distance::Euclid => QdrantDistance::Euclid,
    }
}

fn from_qdrant_distance(distance: QdrantDistance) -> Result<Distance> {
    match distance {
        QdrantDistance::Cosine => Ok(Distance::Cosine),
        QdrantDistance::Dot => Ok(Distance::Dot),
        QdrantDistance::Euclid => Ok(Distance::Euclid),
        other => Err(RagError::UnknownDistance(other.as_str_name().to_string())),
    }
}

/// The threshold to send to Qdrant for a caller's minimum score.
fn native_threshold(distance: Distance, threshold: Option<f32>) -> Option<f32> {
    match distance {
        Distance::Euclid => threshold.map(|t| -t),
        Distance::Cosine | Distance::Dot => threshold,
    }
}

/// The caller-facing score for a native Qdrant score; higher is closer.
fn normalized_score(distance: Distance, score: f32) -> f32 {
    match distance {
        Distance::Euclid => -score,
        Distance::Cosine | Distance::Dot => score,
    }
}

fn to_qdrant_condition(condition: &FieldCondition) -> Condition {
    match condition {
        FieldCondition::ExactMatch { key, value } => match value {
            MatchValue::Keyword(s) => Condition::matches(key.as_str(), s.clone()),
            MatchValue::Integer(i) => Condition::matches(key.as_str(), *i),
            MatchValue::Bool(b) => Condition::matches(key.as_str(), *b),
        },
        FieldCondition::Range { key, range } => Condition::range(
            key.as_str(),
            QdrantRange { gt: range.gt, gte: range.gte, lt: range.lt, lte: range.lte },
        ),
    }
}

pub(crate) fn to_qdrant_filter(filter: &Filter) -> QdrantFilter {
    let conditions: Vec<Condition> = filter.conditions.iter().map(to_qdrant_condition).collect();
    match filter.combinator {
        Combinator::Must => QdrantFilter::must(conditions),
        Combinator::Should => QdrantFilter::should(conditions),
        Combinator::MustNot => QdrantFilter::must_not(conditions),
    }
}

/// Convert a Qdrant payload value back to JSON.
pub(crate) fn to_json(value: QdrantValue) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        Some(Kind::IntegerValue(i)) => Value::Number(i.into()),
        Some(Kind::DoubleValue(d)) => Number::from_f64(d).map_or(Value::Null, Value::Number),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => Value::Array(list.values.into_iter().map(to_json).collect()),
        Some(Kind::StructValue(s)) => {
            Value::Object(s.fields.into_iter().map(|(k, v)| (k, to_json(v))).collect())
        }
    }
}

fn to_search_result(point: ScoredPoint, distance: Distance) -> SearchResult {
    let id = point
        .id
        .and_then(|pid| pid.point_id_options)
        .map(|options| match options {
            PointIdOptions::Uuid(s) => s,
            PointIdOptions::Num(n) => n.to_string(),
        })
        .unwrap_or_default();
    let payload: Payload = point.payload.into_iter().map(|(k, v)| (k, to_json(v))).collect();
    SearchResult { id, score: normalized_score(distance, point.score), payload }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;
        if Self::exists(client, name).await? {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        client
            .create_collection(CreateCollectionBuilder::new(name).vectors_config(
                VectorParamsBuilder::new(
                    config.vector_size as u64,
                    to_qdrant_distance(config.distance),
                ),
            ))
            .await
            .map_err(map_err)?;

        debug!(
            collection = name,
            vector_size = config.vector_size,
            distance = %config.distance,
            "created qdrant collection"
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;
        if !Self::exists(client, name).await? {
            return Err(not_found(name));
        }
        client.delete_collection(name).await.map_err(|e| map_named_err(e, name))?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn update_collection(&self, name: &str, update: CollectionUpdate) -> Result<()> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;

        let mut builder = UpdateCollectionBuilder::new(name);
        if let Some(threshold) = update.indexing_threshold {
            builder = builder.optimizers_config(OptimizersConfigDiff {
                indexing_threshold: Some(threshold),
                ..Default::default()
            });
        }
        if let Some(on_disk) = update.on_disk_payload {
            builder = builder.params(CollectionParamsDiff {
                on_disk_payload: Some(on_disk),
                ..Default::default()
            });
        }

        client.update_collection(builder).await.map_err(|e| map_named_err(e, name))?;
        debug!(collection = name, ?update, "updated qdrant collection");
        Ok(())
    }

    async fn collection_info(&self, name: &str) -> Result<CollectionInfo> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;
        Self::info(client, name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;
        let response = client.list_collections().await.map_err(map_err)?;
        let mut names: Vec<String> = response.collections.into_iter().map(|c| c.name).collect();
        names.sort();
        Ok(names)
    }

    async fn upsert(&self, collection: &str, points: &[Point]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;

        let expected = Self::info(client, collection).await?.vector_size;
        for point in points {
            ensure_dimension(expected, point.vector.len())?;
        }

        let structs = points
            .iter()
            .map(|point| {
                let payload = QdrantPayload::try_from(Value::Object(point.payload.clone()))
                    .map_err(|e| RagError::InvalidInput(format!("invalid payload: {e}")))?;
                Ok(PointStruct::new(point.id.clone(), point.vector.clone(), payload))
            })
            .collect::<Result<Vec<_>>>()?;

        client
            .upsert_points(UpsertPointsBuilder::new(collection, structs).wait(true))
            .await
            .map_err(|e| map_named_err(e, collection))?;

        debug!(collection, count = points.len(), "upserted points to qdrant");
        Ok(())
    }

    async fn search(&self, collection: &str, request: SearchRequest) -> Result<Vec<SearchResult>> {
        let guard = self.client.read().await;
        let client = guard.as_ref().ok_or_else(not_initialized)?;

        let info = Self::info(client, collection).await?;
        ensure_dimension(info.vector_size, request.vector.len())?;

        let mut builder =
            SearchPointsBuilder::new(collection, request.vector, request.limit as u64)
                .with_payload(true);
        if let Some(threshold) = native_threshold(info.distance, request.score_threshold) {
            builder = builder.score_threshold(threshold);
        }
        if let Some(filter) = &request.filter {
            builder = builder.filter(to_qdrant_filter(filter));
        }

        let response =
            client.search_points(builder).await.map_err(|e| map_named_err(e, collection))?;
        let results: Vec<SearchResult> =
            response.result.into_iter().map(|p| to_search_result(p, info.distance)).collect();
        debug!(collection, count = results.len(), "qdrant search complete");
        Ok(results)
    }

    async fn shutdown(&self) -> Result<()> {
        if self.client.write().await.take().is_some() {
            debug!("qdrant client released");
        }
        Ok(())
    }
}

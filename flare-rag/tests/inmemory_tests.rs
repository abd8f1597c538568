//! Property tests for in-memory vector store search.

use std::collections::HashMap;

use flare_rag::filter::{FieldCondition, Filter};
use flare_rag::{
    CollectionConfig, Distance, InMemoryVectorStore, Payload, Point, SearchRequest, VectorStore,
};
use proptest::prelude::*;
use serde_json::Value;

/// Generate a non-zero L2-normalized embedding of the given dimension.
fn arb_normalized_embedding(dim: usize) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(-1.0f32..1.0f32, dim).prop_filter_map("non-zero embedding", |mut v| {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm < 1e-3 {
            return None;
        }
        for val in &mut v {
            *val /= norm;
        }
        Some(v)
    })
}

/// Generate a point with a normalized embedding and a category payload.
fn arb_point(dim: usize) -> impl Strategy<Value = Point> {
    ("[a-z]{3,8}", prop_oneof!["A", "B", "C"], arb_normalized_embedding(dim)).prop_map(
        |(id, category, vector)| {
            let mut payload = Payload::new();
            payload.insert("category".to_string(), Value::String(category));
            Point::new(id, vector, payload)
        },
    )
}

fn dedup(points: Vec<Point>) -> Vec<Point> {
    let mut unique: HashMap<String, Point> = HashMap::new();
    for point in points {
        unique.entry(point.id.clone()).or_insert(point);
    }
    unique.into_values().collect()
}

async fn seeded(points: &[Point], dim: usize) -> InMemoryVectorStore {
    let store = InMemoryVectorStore::new();
    store.create_collection("test", CollectionConfig::new(dim, Distance::Cosine)).await.unwrap();
    store.upsert("test", points).await.unwrap();
    store
}

/// Search results are ordered by descending score, bounded by the limit,
/// and never below the threshold.
mod prop_search_ordering {
    use super::*;

    const DIM: usize = 16;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn ordered_bounded_and_above_threshold(
            points in proptest::collection::vec(arb_point(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
            limit in 1usize..25,
            threshold in proptest::option::of(-1.0f32..1.0f32),
        ) {
            let points = dedup(points);
            let count = points.len();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = seeded(&points, DIM).await;
                let request = SearchRequest::new(query, limit).with_score_threshold(threshold);
                store.search("test", request).await.unwrap()
            });

            prop_assert!(results.len() <= limit);
            prop_assert!(results.len() <= count);
            for window in results.windows(2) {
                prop_assert!(
                    window[0].score >= window[1].score,
                    "results not in descending order: {} < {}",
                    window[0].score,
                    window[1].score,
                );
            }
            if let Some(t) = threshold {
                prop_assert!(results.iter().all(|r| r.score >= t));
            }
        }

        #[test]
        fn stored_vector_ranks_first(
            points in proptest::collection::vec(arb_point(DIM), 1..10),
            pick in any::<prop::sample::Index>(),
        ) {
            let points = dedup(points);
            let target = pick.get(&points).clone();
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = seeded(&points, DIM).await;
                store.search("test", SearchRequest::new(target.vector.clone(), 1)).await.unwrap()
            });

            prop_assert_eq!(results.len(), 1);
            prop_assert!((results[0].score - 1.0).abs() < 1e-4);
        }

        #[test]
        fn must_not_excludes_category(
            points in proptest::collection::vec(arb_point(DIM), 1..20),
            query in arb_normalized_embedding(DIM),
        ) {
            let points = dedup(points);
            let rt = tokio::runtime::Runtime::new().unwrap();
            let results = rt.block_on(async {
                let store = seeded(&points, DIM).await;
                let filter = Filter::must_not(vec![FieldCondition::exact("category", "A")]);
                let request = SearchRequest::new(query, 100).with_filter(Some(filter));
                store.search("test", request).await.unwrap()
            });

            let expected = points.iter().filter(|p| p.payload["category"] != "A").count();
            prop_assert_eq!(results.len(), expected);
            prop_assert!(results.iter().all(|r| r.payload["category"] != "A"));
        }
    }
}

//! In-memory document store for testing and development.

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::store::{Condition, Document, DocumentStore, Query, WriteBatch, WriteOp};
use stratavault_common::Result;

/// In-memory document store.
///
/// Collections are `BTreeMap`s keyed by document id so that range scans
/// stay cheap. All data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Value>>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(doc: &Value, condition: &Condition) -> bool {
        match condition {
            Condition::Eq(field, value) => doc.get(field) == Some(value),
            Condition::Contains(field, value) => doc
                .get(field)
                .and_then(Value::as_array)
                .map(|arr| arr.contains(value))
                .unwrap_or(false),
            Condition::Gte(field, bound) => doc
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s >= bound.as_str())
                .unwrap_or(false),
            Condition::Lt(field, bound) => doc
                .get(field)
                .and_then(Value::as_str)
                .map(|s| s < bound.as_str())
                .unwrap_or(false),
        }
    }

    fn compare_field(a: &Document, b: &Document, field: &str) -> Ordering {
        let left = a.data.get(field);
        let right = b.data.get(field);
        match (left, right) {
            (Some(Value::String(l)), Some(Value::String(r))) => l.cmp(r),
            (Some(Value::Number(l)), Some(Value::Number(r))) => l
                .as_f64()
                .partial_cmp(&r.as_f64())
                .unwrap_or(Ordering::Equal),
            _ => a.id.cmp(&b.id),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let collections = self.collections.read().unwrap();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                data: data.clone(),
            }))
    }

    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().unwrap();
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        batch.check_size()?;

        let mut collections = self.collections.write().unwrap();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put {
                    collection,
                    id,
                    data,
                } => {
                    collections.entry(collection).or_default().insert(id, data);
                }
                WriteOp::Delete { collection, id } => {
                    if let Some(docs) = collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>> {
        let collections = self.collections.read().unwrap();
        let mut results: Vec<Document> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| {
                        query.conditions.iter().all(|c| Self::matches(data, c))
                    })
                    .map(|(id, data)| Document {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(field) = &query.order_by {
            results.sort_by(|a, b| Self::compare_field(a, b, field));
            if query.descending {
                results.reverse();
            }
        }

        if let Some(cursor) = &query.start_after {
            if let Some(pos) = results.iter().position(|d| &d.id == cursor) {
                results.drain(..=pos);
            }
        }

        if let Some(limit) = query.limit {
            results.truncate(limit);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store
            .put("items", "a", json!({"name": "file.txt"}))
            .await
            .unwrap();

        let doc = store.get("items", "a").await.unwrap().unwrap();
        assert_eq!(doc.data["name"], "file.txt");

        store.delete("items", "a").await.unwrap();
        assert!(store.get("items", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_equality_and_contains_filters() {
        let store = MemoryStore::new();
        store
            .put("items", "a", json!({"ownerId": "u1", "sharedWith": ["u2"]}))
            .await
            .unwrap();
        store
            .put("items", "b", json!({"ownerId": "u2", "sharedWith": []}))
            .await
            .unwrap();

        let owned = store
            .run_query(&Query::new("items").filter_eq("ownerId", "u1"))
            .await
            .unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].id, "a");

        let shared = store
            .run_query(&Query::new("items").filter_contains("sharedWith", "u2"))
            .await
            .unwrap();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].id, "a");
    }

    #[tokio::test]
    async fn test_string_range_query() {
        let store = MemoryStore::new();
        store.put("items", "1", json!({"path": "/a/x"})).await.unwrap();
        store.put("items", "2", json!({"path": "/a/y"})).await.unwrap();
        store.put("items", "3", json!({"path": "/b/z"})).await.unwrap();

        let subtree = store
            .run_query(
                &Query::new("items")
                    .range_gte("path", "/a/")
                    .range_lt("path", "/a/\u{10FFFF}"),
            )
            .await
            .unwrap();
        assert_eq!(subtree.len(), 2);
    }

    #[tokio::test]
    async fn test_order_limit_cursor() {
        let store = MemoryStore::new();
        for (id, ts) in [("a", "2026-01-01"), ("b", "2026-01-03"), ("c", "2026-01-02")] {
            store
                .put("logs", id, json!({"timestamp": ts}))
                .await
                .unwrap();
        }

        let page = store
            .run_query(&Query::new("logs").order_by("timestamp", true).limit(2))
            .await
            .unwrap();
        assert_eq!(page[0].id, "b");
        assert_eq!(page[1].id, "c");

        let next = store
            .run_query(
                &Query::new("logs")
                    .order_by("timestamp", true)
                    .start_after("c")
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].id, "a");
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        for i in 0..=crate::store::MAX_BATCH_OPS {
            batch.put("items", format!("doc-{}", i), Value::Null);
        }
        assert!(store.commit(batch).await.is_err());
    }
}

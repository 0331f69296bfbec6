//! Document store trait definition.

use async_trait::async_trait;
use serde_json::Value;

use stratavault_common::{Error, Result};

/// Maximum number of operations accepted in a single write batch.
///
/// The backing database bounds batched writes; callers holding more
/// operations than this must chunk them into sequential batches.
pub const MAX_BATCH_OPS: usize = 490;

/// A stored document together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, unique within its collection.
    pub id: String,
    /// Document body.
    pub data: Value,
}

/// A single filter condition on a query.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Field equals value.
    Eq(String, Value),
    /// Array field contains value.
    Contains(String, Value),
    /// String field is lexicographically >= bound.
    Gte(String, String),
    /// String field is lexicographically < bound.
    Lt(String, String),
}

/// A query over one collection.
///
/// Supports equality and array-membership filters plus a range over a
/// sortable string field, which is what path-prefix subtree lookups use.
#[derive(Debug, Clone)]
pub struct Query {
    pub collection: String,
    pub conditions: Vec<Condition>,
    pub order_by: Option<String>,
    pub descending: bool,
    pub limit: Option<usize>,
    /// Exclusive cursor: resume after the document with this id.
    pub start_after: Option<String>,
}

impl Query {
    /// Create a new query over a collection.
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            conditions: Vec::new(),
            order_by: None,
            descending: false,
            limit: None,
            start_after: None,
        }
    }

    /// Add an equality filter.
    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(field.into(), value.into()));
        self
    }

    /// Add an array-membership filter.
    pub fn filter_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Contains(field.into(), value.into()));
        self
    }

    /// Add a lower range bound (inclusive) on a string field.
    pub fn range_gte(mut self, field: impl Into<String>, bound: impl Into<String>) -> Self {
        self.conditions.push(Condition::Gte(field.into(), bound.into()));
        self
    }

    /// Add an upper range bound (exclusive) on a string field.
    pub fn range_lt(mut self, field: impl Into<String>, bound: impl Into<String>) -> Self {
        self.conditions.push(Condition::Lt(field.into(), bound.into()));
        self
    }

    /// Order results by a field.
    pub fn order_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(field.into());
        self.descending = descending;
        self
    }

    /// Limit the number of returned documents.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Resume after the document with the given id (cursor pagination).
    pub fn start_after(mut self, id: impl Into<String>) -> Self {
        self.start_after = Some(id.into());
        self
    }
}

/// A single operation within a write batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create or replace a document.
    Put {
        collection: String,
        id: String,
        data: Value,
    },
    /// Delete a document (no-op if absent).
    Delete { collection: String, id: String },
}

/// An ordered set of writes committed together.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a put operation.
    pub fn put(&mut self, collection: impl Into<String>, id: impl Into<String>, data: Value) {
        self.ops.push(WriteOp::Put {
            collection: collection.into(),
            id: id.into(),
            data,
        });
    }

    /// Queue a delete operation.
    pub fn delete(&mut self, collection: impl Into<String>, id: impl Into<String>) {
        self.ops.push(WriteOp::Delete {
            collection: collection.into(),
            id: id.into(),
        });
    }

    /// Queue an already-built operation.
    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether the batch holds no operations.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consume the batch, returning its operations.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Validate the batch against the operation ceiling.
    pub fn check_size(&self) -> Result<()> {
        if self.ops.len() > MAX_BATCH_OPS {
            return Err(Error::InvalidArgument(format!(
                "Write batch holds {} operations, maximum is {}",
                self.ops.len(),
                MAX_BATCH_OPS
            )));
        }
        Ok(())
    }
}

/// Document database abstraction.
///
/// The backing database guarantees atomic single-document reads and
/// writes, bounded multi-document batches, and range queries over a
/// sortable string field. Implementations must uphold the same contract.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Create or replace a document.
    async fn put(&self, collection: &str, id: &str, data: Value) -> Result<()>;

    /// Delete a document. Deleting an absent document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    /// Apply a write batch.
    ///
    /// # Errors
    /// - `InvalidArgument` if the batch exceeds [`MAX_BATCH_OPS`]
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Run a query and return matching documents.
    async fn run_query(&self, query: &Query) -> Result<Vec<Document>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_ceiling() {
        let mut batch = WriteBatch::new();
        for i in 0..MAX_BATCH_OPS {
            batch.put("c", format!("doc-{}", i), Value::Null);
        }
        assert!(batch.check_size().is_ok());

        batch.put("c", "one-too-many", Value::Null);
        assert!(batch.check_size().is_err());
    }

    #[test]
    fn test_query_builder() {
        let query = Query::new("items")
            .filter_eq("ownerId", "u1")
            .range_gte("path", "/a/")
            .range_lt("path", "/a0")
            .order_by("path", false)
            .limit(10);

        assert_eq!(query.collection, "items");
        assert_eq!(query.conditions.len(), 3);
        assert_eq!(query.limit, Some(10));
    }
}

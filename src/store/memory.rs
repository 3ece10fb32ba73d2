use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Ack, Document, DocumentStore, DocumentStream, StoreError};
use crate::filter::{Cursor, DocumentQuery, FilterOrder};
use crate::schema::ValidatedPayload;

#[derive(Default)]
struct Collection {
    /// Every document ever inserted, tombstones included
    documents: HashMap<Uuid, Document>,
    next_seq: i64,
}

impl Collection {
    fn live(&self, id: Uuid) -> Option<&Document> {
        self.documents.get(&id).filter(|doc| !doc.is_tombstoned())
    }

    fn check_revision(&self, resource: &str, id: Uuid, expected: u64) -> Result<(), StoreError> {
        let doc = self.live(id).ok_or_else(|| StoreError::not_found(resource, id))?;
        if doc.revision != expected {
            return Err(StoreError::Conflict {
                expected,
                actual: doc.revision,
            });
        }
        Ok(())
    }

    fn select(&self, query: &DocumentQuery) -> Vec<Document> {
        let mut docs: Vec<&Document> = self
            .documents
            .values()
            .filter(|doc| !doc.is_tombstoned() && query.matches(&doc.fields))
            .filter(|doc| match query.cursor {
                Some(Cursor::After(seq)) => doc.seq > seq,
                _ => true,
            })
            .collect();

        docs.sort_by(|a, b| {
            FilterOrder::compare(&query.order, &a.fields, &b.fields).then(a.seq.cmp(&b.seq))
        });

        let skip = query.cursor.map(|c| c.offset()).unwrap_or(0) as usize;
        let take = query.limit.unwrap_or(usize::MAX);
        docs.into_iter().skip(skip).take(take).cloned().collect()
    }
}

/// In-process store. Writes are serialized behind one lock, which makes the
/// revision check and the write a single step. Contents do not survive a
/// restart; it backs development runs and tests.
#[derive(Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries for a resource, tombstones included
    pub async fn stored_count(&self, resource: &str) -> usize {
        self.collections
            .read()
            .await
            .get(resource)
            .map_or(0, |c| c.documents.len())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn insert(
        &self,
        resource: &str,
        owner: Option<&str>,
        payload: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(resource.to_string()).or_default();

        // v4 collisions are not expected, but an id is never handed out twice
        let mut id = Uuid::new_v4();
        while collection.documents.contains_key(&id) {
            id = Uuid::new_v4();
        }

        collection.next_seq += 1;
        let now = Utc::now();
        let doc = Document {
            id,
            revision: 1,
            fields: payload.into_fields(),
            owner: owner.map(str::to_string),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            seq: collection.next_seq,
        };
        collection.documents.insert(id, doc.clone());
        Ok(doc)
    }

    async fn get(&self, resource: &str, id: Uuid) -> Result<Document, StoreError> {
        let collections = self.collections.read().await;
        collections
            .get(resource)
            .and_then(|c| c.live(id))
            .cloned()
            .ok_or_else(|| StoreError::not_found(resource, id))
    }

    async fn update(
        &self,
        resource: &str,
        id: Uuid,
        expected_revision: u64,
        patch: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(resource)
            .ok_or_else(|| StoreError::not_found(resource, id))?;
        collection.check_revision(resource, id, expected_revision)?;

        let doc = collection
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(resource, id))?;
        doc.fields.extend(patch.into_fields());
        doc.revision += 1;
        doc.updated_at = Utc::now();
        Ok(doc.clone())
    }

    async fn delete(&self, resource: &str, id: Uuid, expected_revision: u64) -> Result<Ack, StoreError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(resource)
            .ok_or_else(|| StoreError::not_found(resource, id))?;
        collection.check_revision(resource, id, expected_revision)?;

        let doc = collection
            .documents
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found(resource, id))?;
        let now = Utc::now();
        doc.revision += 1;
        doc.updated_at = now;
        doc.deleted_at = Some(now);
        Ok(Ack {
            id,
            revision: doc.revision,
        })
    }

    fn query(&self, resource: &str, query: &DocumentQuery) -> DocumentStream {
        let collections = self.collections.clone();
        let resource = resource.to_string();
        let query = query.clone();

        stream::once(async move {
            let collections = collections.read().await;
            let docs = collections
                .get(&resource)
                .map(|c| c.select(&query))
                .unwrap_or_default();
            stream::iter(docs.into_iter().map(Ok))
        })
        .flatten()
        .boxed()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{FilterOrderInfo, FilterWhere, SortDirection};
    use crate::schema::{validate, FieldSpec, FieldType, FieldValue, ResourceSchema, ValidationMode};
    use futures::TryStreamExt;
    use serde_json::{json, Value};

    fn schema() -> ResourceSchema {
        ResourceSchema::new()
            .field("name", FieldSpec::new(FieldType::String))
            .field("order", FieldSpec::new(FieldType::Integer))
            .compile()
            .unwrap()
    }

    fn payload(value: Value) -> ValidatedPayload {
        validate(&schema(), &value, ValidationMode::Patch).unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let store = MemoryDocumentStore::new();
        let created = store.insert("items", Some("u1"), payload(json!({ "name": "a" }))).await.unwrap();
        assert_eq!(created.revision, 1);
        assert_eq!(created.owner.as_deref(), Some("u1"));

        let fetched = store.get("items", created.id).await.unwrap();
        assert_eq!(fetched.fields, created.fields);
        assert_eq!(fetched.revision, 1);
    }

    #[tokio::test]
    async fn update_merges_and_checks_revision() {
        let store = MemoryDocumentStore::new();
        let doc = store
            .insert("items", None, payload(json!({ "name": "a", "order": 1 })))
            .await
            .unwrap();

        let updated = store.update("items", doc.id, 1, payload(json!({ "name": "b" }))).await.unwrap();
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.fields["name"], FieldValue::from("b"));
        assert_eq!(updated.fields["order"], FieldValue::Integer(1));

        let stale = store.update("items", doc.id, 1, payload(json!({ "name": "c" }))).await;
        assert_eq!(stale, Err(StoreError::Conflict { expected: 1, actual: 2 }));
        assert_eq!(store.get("items", doc.id).await.unwrap().fields["name"], FieldValue::from("b"));
    }

    #[tokio::test]
    async fn delete_tombstones_and_is_not_repeatable() {
        let store = MemoryDocumentStore::new();
        let doc = store.insert("items", None, payload(json!({ "name": "a" }))).await.unwrap();

        assert_eq!(
            store.delete("items", doc.id, 2).await,
            Err(StoreError::Conflict { expected: 2, actual: 1 })
        );
        let ack = store.delete("items", doc.id, 1).await.unwrap();
        assert_eq!(ack.revision, 2);

        assert!(matches!(store.get("items", doc.id).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete("items", doc.id, 1).await, Err(StoreError::NotFound { .. })));
        assert!(matches!(store.delete("items", doc.id, 2).await, Err(StoreError::NotFound { .. })));
        assert_eq!(store.stored_count("items").await, 1, "tombstone is kept");
    }

    #[tokio::test]
    async fn query_filters_sorts_and_pages() {
        let store = MemoryDocumentStore::new();
        for (name, order) in [("a", 3), ("b", 1), ("c", 2), ("d", 5)] {
            store
                .insert("items", None, payload(json!({ "name": name, "order": order })))
                .await
                .unwrap();
        }

        let mut query = DocumentQuery::all();
        query.condition = FilterWhere::parse(&json!({ "order": { "$gt": 1 } }), &schema(), 5).unwrap();
        query.order = vec![FilterOrderInfo { column: "order".into(), sort: SortDirection::Desc }];

        let names = |docs: Vec<Document>| -> Vec<String> {
            docs.iter().map(|d| d.fields["name"].as_str().unwrap().to_string()).collect()
        };

        let all: Vec<Document> = store.query("items", &query).try_collect().await.unwrap();
        assert_eq!(names(all), vec!["d", "a", "c"]);

        let page: Vec<Document> = store
            .query("items", &query.clone().with_cursor(Some(Cursor::Offset(1))).with_limit(1))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(names(page), vec!["a"]);
    }

    #[tokio::test]
    async fn query_skips_tombstones_and_resumes_after_sequence() {
        let store = MemoryDocumentStore::new();
        let first = store.insert("items", None, payload(json!({ "name": "a" }))).await.unwrap();
        let second = store.insert("items", None, payload(json!({ "name": "b" }))).await.unwrap();
        store.insert("items", None, payload(json!({ "name": "c" }))).await.unwrap();
        store.delete("items", second.id, 1).await.unwrap();

        let after_first = DocumentQuery::all().with_cursor(Some(Cursor::After(first.seq)));
        let docs: Vec<Document> = store.query("items", &after_first).try_collect().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].fields["name"], FieldValue::from("c"));

        let empty: Vec<Document> = store.query("other", &DocumentQuery::all()).try_collect().await.unwrap();
        assert!(empty.is_empty());
    }
}

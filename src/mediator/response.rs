use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::fields_to_json;
use crate::store::{Ack, Document};

/// One document as returned to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEnvelope {
    pub id: Uuid,
    pub revision: u64,
    pub fields: Value,
}

impl From<Document> for DocumentEnvelope {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            revision: doc.revision,
            fields: fields_to_json(&doc.fields),
        }
    }
}

/// One page of query results. `next_cursor` is null on the last page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageEnvelope {
    pub items: Vec<DocumentEnvelope>,
    #[serde(rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeletedEnvelope {
    pub id: Uuid,
    pub revision: u64,
    pub deleted: bool,
}

impl From<Ack> for DeletedEnvelope {
    fn from(ack: Ack) -> Self {
        Self {
            id: ack.id,
            revision: ack.revision,
            deleted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MediatorResponse {
    Created(DocumentEnvelope),
    Document(DocumentEnvelope),
    Deleted(DeletedEnvelope),
    Page(PageEnvelope),
}

impl MediatorResponse {
    pub fn is_created(&self) -> bool {
        matches!(self, MediatorResponse::Created(_))
    }
}

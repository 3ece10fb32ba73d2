// Request mediator: validate, authenticate, authorize, execute, respond

pub mod error;
pub mod request;
pub mod response;

use futures::{StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::auth::{Authenticator, Identity};
use crate::filter::{Cursor, DocumentQuery, FilterOptions};
use crate::policy::{Decision, Ownership};
use crate::resources::ResourceRegistry;
use crate::store::{DocumentStore, StoragePolicy, StoreError};

pub use error::{MediatorError, Stage};
pub use request::MediatorRequest;
pub use response::{DeletedEnvelope, DocumentEnvelope, MediatorResponse, PageEnvelope};

use request::{validate_request, Action, ValidatedRequest};

/// Runs each request through the gates in order. A failing gate ends the
/// request; later gates never see it.
pub struct Mediator {
    registry: Arc<ResourceRegistry>,
    authenticator: Arc<Authenticator>,
    store: Arc<dyn DocumentStore>,
    storage: StoragePolicy,
    filter: FilterOptions,
}

impl Mediator {
    pub fn new(
        registry: Arc<ResourceRegistry>,
        authenticator: Arc<Authenticator>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            registry,
            authenticator,
            store,
            storage: StoragePolicy::default(),
            filter: FilterOptions::default(),
        }
    }

    pub fn with_storage_policy(mut self, storage: StoragePolicy) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_filter_options(mut self, filter: FilterOptions) -> Self {
        self.filter = filter;
        self
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub async fn handle(&self, request: MediatorRequest) -> Result<MediatorResponse, MediatorError> {
        let mut stage = Stage::Received;
        let operation = request.operation;
        let resource = request.resource.clone();

        let outcome = self.run(request, &mut stage).await;
        match &outcome {
            Ok(_) => debug!("{} {} {}", operation, resource, Stage::Responded.as_str()),
            Err(MediatorError::Internal(reason)) => {
                error!("{} {} failed after {}: {}", operation, resource, stage.as_str(), reason)
            }
            Err(e) => debug!("{} {} stopped after {}: {}", operation, resource, stage.as_str(), e),
        }
        outcome
    }

    async fn run(&self, request: MediatorRequest, stage: &mut Stage) -> Result<MediatorResponse, MediatorError> {
        let validated = self.validate(&request)?;
        *stage = Stage::Validated;

        let identity = self.authenticator.authenticate(&request.credential).await?;
        *stage = Stage::Authenticated;

        self.authorize(&identity, &validated).await?;
        *stage = Stage::Authorized;

        let response = self.execute(&identity, validated).await?;
        *stage = Stage::Executed;
        Ok(response)
    }

    fn validate(&self, request: &MediatorRequest) -> Result<ValidatedRequest, MediatorError> {
        let resource = self
            .registry
            .get(&request.resource)
            .ok_or_else(|| MediatorError::NotFound(format!("Resource '{}' not found", request.resource)))?;
        Ok(validate_request(request, resource, &self.filter)?)
    }

    async fn authorize(&self, identity: &Identity, request: &ValidatedRequest) -> Result<(), MediatorError> {
        let resource = &request.resource;
        let mut owner_doc = None;

        if resource.policy.needs_owner(identity, &resource.name, request.operation) {
            if let Some(id) = request.action.target() {
                let store = self.store.clone();
                let name = resource.name.clone();
                owner_doc = match self.storage.run("get", || store.get(&name, id)).await {
                    Ok(doc) => Some(Some(doc)),
                    Err(StoreError::NotFound { .. }) => Some(None),
                    Err(e) => return Err(e.into()),
                };
            }
        }

        let ownership = match &owner_doc {
            None => Ownership::Unknown,
            Some(None) => Ownership::Absent,
            Some(Some(doc)) => Ownership::Owner(doc.owner.as_deref()),
        };

        match resource.policy.evaluate(identity, &resource.name, request.operation, ownership) {
            Decision::Allowed => Ok(()),
            Decision::Forbidden { reason } => {
                warn!("Forbidden: {} ({})", reason, identity.subject);
                Err(MediatorError::Forbidden(reason))
            }
        }
    }

    async fn execute(&self, identity: &Identity, request: ValidatedRequest) -> Result<MediatorResponse, MediatorError> {
        let name = request.resource.name.clone();
        let store = self.store.clone();
        let storage = self.storage;

        match request.action {
            Action::Read(id) => {
                let doc = storage.run("get", || store.get(&name, id)).await?;
                Ok(MediatorResponse::Document(doc.into()))
            }
            Action::Query { query, page_size } => self.query_page(&name, query, page_size).await,

            // Writes run on their own task so they finish even if the caller goes away
            Action::Create(payload) => {
                let owner = identity.subject.clone();
                let doc = spawn_write(async move {
                    storage
                        .run("insert", || store.insert(&name, Some(&owner), payload.clone()))
                        .await
                })
                .await?;
                Ok(MediatorResponse::Created(doc.into()))
            }
            Action::Update { id, revision, patch } => {
                let doc = spawn_write(async move {
                    storage
                        .run_checked_write("update", || store.update(&name, id, revision, patch.clone()))
                        .await
                })
                .await?;
                Ok(MediatorResponse::Document(doc.into()))
            }
            Action::Delete { id, revision } => {
                let ack = spawn_write(async move {
                    storage
                        .run_checked_write("delete", || store.delete(&name, id, revision))
                        .await
                })
                .await?;
                Ok(MediatorResponse::Deleted(ack.into()))
            }
        }
    }

    async fn query_page(
        &self,
        resource: &str,
        query: DocumentQuery,
        page_size: usize,
    ) -> Result<MediatorResponse, MediatorError> {
        let mut docs = self
            .storage
            .run("query", || {
                self.store
                    .query(resource, &query)
                    .take(page_size + 1)
                    .try_collect::<Vec<_>>()
            })
            .await?;

        let next_cursor = if docs.len() > page_size {
            docs.truncate(page_size);
            let next = if query.is_insertion_ordered() {
                docs.last().map(|doc| Cursor::After(doc.seq))
            } else {
                let offset = query.cursor.map_or(0, |c| c.offset());
                Some(Cursor::Offset(offset + page_size as u64))
            };
            next.map(|c| c.encode())
        } else {
            None
        };

        Ok(MediatorResponse::Page(PageEnvelope {
            items: docs.into_iter().map(DocumentEnvelope::from).collect(),
            next_cursor,
        }))
    }
}

async fn spawn_write<T, F>(write: F) -> Result<T, MediatorError>
where
    T: Send + 'static,
    F: std::future::Future<Output = Result<T, StoreError>> + Send + 'static,
{
    match tokio::spawn(write).await {
        Ok(result) => result.map_err(MediatorError::from),
        Err(e) => Err(MediatorError::Internal(format!("write task failed: {}", e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credential, CredentialVerifier, VerifyError};
    use crate::filter::FilterData;
    use crate::policy::{Policy, Rule};
    use crate::schema::{FieldSpec, FieldType, ResourceSchema};
    use crate::store::MemoryDocumentStore;
    use crate::types::Operation;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// Token "<subject>:<role>" authenticates as that subject and role
    struct StaticVerifier;

    #[async_trait]
    impl CredentialVerifier for StaticVerifier {
        fn name(&self) -> &'static str {
            "static"
        }

        async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
            let (subject, role) = token
                .split_once(':')
                .ok_or_else(|| VerifyError::Rejected("unknown token".to_string()))?;
            Ok(Identity::new(subject, [role]))
        }
    }

    fn mediator(store: MemoryDocumentStore) -> Mediator {
        let mut registry = ResourceRegistry::new();
        let schema = ResourceSchema::new()
            .field("name", FieldSpec::new(FieldType::String).required().max(10.0))
            .field("order", FieldSpec::new(FieldType::Integer));
        let policy = Policy::new(vec![
            Rule::allow().roles(["admin"]),
            Rule::allow().operations([Operation::Read, Operation::Query, Operation::Create]),
            Rule::allow().operations([Operation::Update, Operation::Delete]).owner_only(),
        ]);
        registry.register("items", schema, policy).unwrap();

        let authenticator = Authenticator::new(Arc::new(StaticVerifier), Duration::from_secs(1));
        Mediator::new(Arc::new(registry), Arc::new(authenticator), Arc::new(store))
    }

    fn bearer(token: &str) -> Credential {
        Credential::Bearer(token.to_string())
    }

    fn envelope(response: MediatorResponse) -> DocumentEnvelope {
        match response {
            MediatorResponse::Created(doc) | MediatorResponse::Document(doc) => doc,
            other => panic!("expected a document, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn create_update_conflict_scenario() {
        let m = mediator(MemoryDocumentStore::new());

        let created = m
            .handle(MediatorRequest::new(Operation::Create, "items", bearer("u1:user")).with_payload(json!({ "name": "a" })))
            .await
            .unwrap();
        assert!(created.is_created());
        let created = envelope(created);
        assert_eq!(created.revision, 1);
        assert_eq!(created.fields, json!({ "name": "a" }));

        let update = |rev: u64, name: &str| {
            MediatorRequest::new(Operation::Update, "items", bearer("u1:user"))
                .with_id(created.id.to_string())
                .with_revision(rev)
                .with_payload(json!({ "name": name }))
        };
        let updated = envelope(m.handle(update(1, "b")).await.unwrap());
        assert_eq!(updated.revision, 2);
        assert_eq!(updated.fields["name"], "b");

        assert_eq!(
            m.handle(update(1, "c")).await,
            Err(MediatorError::Conflict { expected: 1, actual: 2 })
        );
    }

    #[tokio::test]
    async fn validation_runs_before_authentication() {
        let m = mediator(MemoryDocumentStore::new());
        let err = m
            .handle(
                MediatorRequest::new(Operation::Create, "items", Credential::Missing)
                    .with_payload(json!({ "name": "far too long a name", "color": "red" })),
            )
            .await
            .unwrap_err();
        match err {
            MediatorError::Validation(v) => assert_eq!(v.fields(), vec!["color", "name"]),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unknown_resource_and_missing_revision() {
        let m = mediator(MemoryDocumentStore::new());
        assert!(matches!(
            m.handle(MediatorRequest::new(Operation::Query, "nope", bearer("u1:user"))).await,
            Err(MediatorError::NotFound(_))
        ));

        let err = m
            .handle(MediatorRequest::new(Operation::Delete, "items", bearer("u1:user")).with_id("not-a-uuid"))
            .await
            .unwrap_err();
        match err {
            MediatorError::Validation(v) => assert_eq!(v.fields(), vec!["id", "revision"]),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn owner_only_rules_use_stored_owner() {
        let store = MemoryDocumentStore::new();
        let m = mediator(store.clone());
        let doc = envelope(
            m.handle(MediatorRequest::new(Operation::Create, "items", bearer("u1:user")).with_payload(json!({ "name": "a" })))
                .await
                .unwrap(),
        );

        let delete = |who: &str| {
            MediatorRequest::new(Operation::Delete, "items", bearer(who))
                .with_id(doc.id.to_string())
                .with_revision(1)
        };
        assert!(matches!(m.handle(delete("u2:user")).await, Err(MediatorError::Forbidden(_))));
        assert!(matches!(m.handle(delete("u1:user")).await, Ok(MediatorResponse::Deleted(_))));
        // Gone: the ownership rule no longer matches and nothing else allows it
        assert!(matches!(m.handle(delete("u1:user")).await, Err(MediatorError::Forbidden(_))));
        // Admins are allowed before any lookup, so they see the tombstone as absent
        assert!(matches!(m.handle(delete("root:admin")).await, Err(MediatorError::NotFound(_))));
    }

    #[tokio::test]
    async fn pages_through_results() {
        let m = mediator(MemoryDocumentStore::new());
        for name in ["a", "b", "c", "d", "e"] {
            m.handle(MediatorRequest::new(Operation::Create, "items", bearer("u1:user")).with_payload(json!({ "name": name })))
                .await
                .unwrap();
        }

        let mut cursor = None;
        let mut sizes = vec![];
        loop {
            let filter = FilterData {
                limit: Some(2),
                cursor: cursor.clone(),
                ..Default::default()
            };
            let page = match m
                .handle(MediatorRequest::new(Operation::Query, "items", bearer("u1:user")).with_filter(filter))
                .await
                .unwrap()
            {
                MediatorResponse::Page(page) => page,
                other => panic!("expected a page, got {:?}", other),
            };
            sizes.push(page.items.len());
            cursor = page.next_cursor;
            if cursor.is_none() {
                break;
            }
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }
}

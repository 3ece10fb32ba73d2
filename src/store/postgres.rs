use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use super::{Ack, Document, DocumentStore, DocumentStream, StoreError};
use crate::filter::types::{SqlParam, SqlResult};
use crate::filter::{Cursor, DocumentQuery, FilterOrder, FilterWhere};
use crate::schema::{fields_to_json, Fields, ValidatedPayload};

/// Rows pulled per round trip while a query stream is consumed
const CHUNK_SIZE: usize = 100;

const COLUMNS: &str = "id, seq, revision, owner, fields, created_at, updated_at, deleted_at";

const MIGRATIONS: [&str; 2] = [
    r#"CREATE TABLE IF NOT EXISTS documents (
        resource   TEXT        NOT NULL,
        id         UUID        NOT NULL,
        seq        BIGSERIAL   NOT NULL,
        revision   BIGINT      NOT NULL,
        owner      TEXT,
        fields     JSONB       NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        deleted_at TIMESTAMPTZ,
        PRIMARY KEY (resource, id)
    )"#,
    "CREATE INDEX IF NOT EXISTS documents_resource_seq_idx ON documents (resource, seq)",
];

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    seq: i64,
    revision: i64,
    owner: Option<String>,
    fields: Json<Fields>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(Document {
            id: row.id,
            revision: to_revision(row.revision)?,
            fields: row.fields.0,
            owner: row.owner,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            seq: row.seq,
        })
    }
}

fn to_revision(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Backend(format!("negative revision {}", raw)))
}

fn from_revision(revision: u64) -> Result<i64, StoreError> {
    i64::try_from(revision).map_err(|_| StoreError::Backend(format!("revision {} out of range", revision)))
}

/// PostgreSQL backend: every resource shares one `documents` table with the
/// payload in a JSONB column.
#[derive(Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        info!("Connected to document database at {}", redact(database_url));
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the documents table and its index if missing
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed document database pool");
    }

    async fn fetch_chunk(pool: &PgPool, sql: SqlResult) -> Result<Vec<Document>, StoreError> {
        let mut q = sqlx::query_as::<_, DocumentRow>(&sql.query);
        for p in sql.params.iter() {
            q = bind_param(q, p);
        }
        let rows = q.fetch_all(pool).await?;
        rows.into_iter().map(Document::try_from).collect()
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn insert(
        &self,
        resource: &str,
        owner: Option<&str>,
        payload: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        let sql = format!(
            "INSERT INTO documents (resource, id, revision, owner, fields) VALUES ($1, $2, 1, $3, $4) RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(resource)
            .bind(Uuid::new_v4())
            .bind(owner)
            .bind(fields_to_json(payload.fields()))
            .fetch_one(&self.pool)
            .await?;
        Document::try_from(row)
    }

    async fn get(&self, resource: &str, id: Uuid) -> Result<Document, StoreError> {
        let sql = format!(
            "SELECT {} FROM documents WHERE resource = $1 AND id = $2 AND deleted_at IS NULL",
            COLUMNS
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(resource)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Document::try_from)
            .unwrap_or_else(|| Err(StoreError::not_found(resource, id)))
    }

    async fn update(
        &self,
        resource: &str,
        id: Uuid,
        expected_revision: u64,
        patch: ValidatedPayload,
    ) -> Result<Document, StoreError> {
        // `||` merges top-level keys, so absent fields keep their stored values
        let sql = format!(
            "UPDATE documents SET fields = fields || $4, revision = revision + 1, updated_at = now() \
             WHERE resource = $1 AND id = $2 AND revision = $3 AND deleted_at IS NULL RETURNING {}",
            COLUMNS
        );
        let row = sqlx::query_as::<_, DocumentRow>(&sql)
            .bind(resource)
            .bind(id)
            .bind(from_revision(expected_revision)?)
            .bind(fields_to_json(patch.fields()))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Document::try_from(row),
            None => Err(self.explain_miss(resource, id, expected_revision).await),
        }
    }

    async fn delete(&self, resource: &str, id: Uuid, expected_revision: u64) -> Result<Ack, StoreError> {
        let row: Option<(Uuid, i64)> = sqlx::query_as(
            "UPDATE documents SET revision = revision + 1, updated_at = now(), deleted_at = now() \
             WHERE resource = $1 AND id = $2 AND revision = $3 AND deleted_at IS NULL RETURNING id, revision",
        )
        .bind(resource)
        .bind(id)
        .bind(from_revision(expected_revision)?)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some((id, revision)) => Ok(Ack {
                id,
                revision: to_revision(revision)?,
            }),
            None => Err(self.explain_miss(resource, id, expected_revision).await),
        }
    }

    fn query(&self, resource: &str, query: &DocumentQuery) -> DocumentStream {
        let pool = self.pool.clone();
        let resource: Arc<str> = Arc::from(resource);
        let query = Arc::new(query.clone());
        let start = ChunkState {
            fetched: 0,
            after: match query.cursor {
                Some(Cursor::After(seq)) => Some(seq),
                _ => None,
            },
            done: false,
        };

        stream::try_unfold(start, move |mut state| {
            let pool = pool.clone();
            let resource = resource.clone();
            let query = query.clone();
            async move {
                if state.done {
                    return Ok::<_, StoreError>(None);
                }
                let take = query
                    .limit
                    .map_or(CHUNK_SIZE, |limit| limit.saturating_sub(state.fetched).min(CHUNK_SIZE));
                if take == 0 {
                    return Ok(None);
                }

                let sql = select_sql(&resource, &query, &state, take);
                let docs = Self::fetch_chunk(&pool, sql).await?;

                state.fetched += docs.len();
                state.done = docs.len() < take;
                if query.is_insertion_ordered() {
                    if let Some(last) = docs.last() {
                        state.after = Some(last.seq);
                    }
                }
                Ok(Some((docs, state)))
            }
        })
        .map_ok(|docs| stream::iter(docs.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

impl PgDocumentStore {
    /// A guarded write matched no row: report whether the document is gone
    /// or its revision moved on.
    async fn explain_miss(&self, resource: &str, id: Uuid, expected: u64) -> StoreError {
        let current: Result<Option<(i64, Option<DateTime<Utc>>)>, sqlx::Error> =
            sqlx::query_as("SELECT revision, deleted_at FROM documents WHERE resource = $1 AND id = $2")
                .bind(resource)
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match current {
            Err(e) => e.into(),
            Ok(None) | Ok(Some((_, Some(_)))) => StoreError::not_found(resource, id),
            Ok(Some((revision, None))) => match to_revision(revision) {
                Ok(actual) => StoreError::Conflict { expected, actual },
                Err(e) => e,
            },
        }
    }
}

/// Position of a lazily consumed query
#[derive(Debug, Clone, Copy)]
struct ChunkState {
    fetched: usize,
    /// Insertion-ordered queries page by sequence instead of offset
    after: Option<i64>,
    done: bool,
}

fn select_sql(resource: &str, query: &DocumentQuery, state: &ChunkState, take: usize) -> SqlResult {
    let mut params = vec![SqlParam::Text(resource.to_string())];
    let mut conditions = vec!["resource = $1".to_string(), "deleted_at IS NULL".to_string()];

    if let Some(seq) = state.after {
        params.push(SqlParam::BigInt(seq));
        conditions.push(format!("seq > ${}", params.len()));
    }

    let (where_sql, where_params) = FilterWhere::generate(&query.condition, params.len());
    params.extend(where_params);
    conditions.push(format!("({})", where_sql));

    let (order_sql, order_params) = FilterOrder::generate(&query.order, params.len());
    params.extend(order_params);

    let offset = if query.is_insertion_ordered() {
        0
    } else {
        query.cursor.map_or(0, |c| c.offset()) + state.fetched as u64
    };

    let mut sql = format!(
        "SELECT {} FROM documents WHERE {} {} LIMIT {}",
        COLUMNS,
        conditions.join(" AND "),
        order_sql,
        take
    );
    if offset > 0 {
        sql.push_str(&format!(" OFFSET {}", offset));
    }
    SqlResult { query: sql, params }
}

fn bind_param<'q, O>(
    q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>,
    p: &SqlParam,
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, PgArguments>
where
    O: for<'r> FromRow<'r, sqlx::postgres::PgRow>,
{
    match p {
        SqlParam::Text(s) => q.bind(s.clone()),
        SqlParam::Json(v) => q.bind(v.clone()),
        SqlParam::BigInt(i) => q.bind(*i),
    }
}

/// Database URL with the password masked, for logs
pub fn redact(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}

//! Typed CRUD over one table, with error translation and session checks

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::entity::Entity;
use super::query::{Direction, Query};
use super::supabase::{SupabaseError, TableApi};
use crate::auth::{Session, SessionGuard};
use crate::util::time::write_stamp;

/// Repository operation, used in logs and error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::List => "list",
            Operation::Get => "get",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotAuthenticated,
    NotFound,
    PermissionDenied,
    Invalid,
    TransientOrUnknown,
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("Not signed in")]
    NotAuthenticated,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Permission denied: {explanation}")]
    PermissionDenied {
        entity: &'static str,
        operation: Operation,
        explanation: String,
    },

    #[error("Invalid {entity}: {reason}")]
    Invalid { entity: &'static str, reason: String },

    #[error(transparent)]
    Remote(#[from] SupabaseError),

    #[error("Malformed row: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RepoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepoError::NotAuthenticated => ErrorKind::NotAuthenticated,
            RepoError::NotFound { .. } => ErrorKind::NotFound,
            RepoError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            RepoError::Invalid { .. } => ErrorKind::Invalid,
            RepoError::Remote(_) | RepoError::Decode(_) => ErrorKind::TransientOrUnknown,
        }
    }
}

/// Data access for one entity type
pub struct Repository<E: Entity> {
    api: Arc<dyn TableApi>,
    guard: SessionGuard,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            guard: self.guard.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(api: Arc<dyn TableApi>, guard: SessionGuard) -> Self {
        Self {
            api,
            guard,
            _entity: PhantomData,
        }
    }

    fn decode(row: Value) -> Result<E, RepoError> {
        Ok(serde_json::from_value(row)?)
    }

    fn invalid(reason: impl Into<String>) -> RepoError {
        RepoError::Invalid {
            entity: E::TABLE,
            reason: reason.into(),
        }
    }

    /// Translate a backend error into a domain outcome
    fn classify(
        op: Operation,
        id: &str,
        session: Option<&Session>,
        err: SupabaseError,
    ) -> RepoError {
        if err.is_not_found() {
            return RepoError::NotFound {
                entity: E::TABLE,
                id: id.to_string(),
            };
        }

        if err.is_permission_denied() {
            let user = session.map_or("anonymous", |s| s.user_id.as_str());
            let explanation = format!(
                "{} on {} was rejected by row-level security; user {} must own the row through {} ({})",
                op,
                E::TABLE,
                user,
                E::OWNER_COLUMN,
                err
            );
            return RepoError::PermissionDenied {
                entity: E::TABLE,
                operation: op,
                explanation,
            };
        }

        RepoError::Remote(err)
    }

    /// Log a failure with entity, operation and id before it is handled
    fn report(op: Operation, id: &str, err: &RepoError) {
        match err.kind() {
            ErrorKind::NotFound => debug!(entity = E::TABLE, op = %op, id, "No matching row"),
            ErrorKind::NotAuthenticated | ErrorKind::Invalid => {
                warn!(entity = E::TABLE, op = %op, id, error = %err, "Rejected before remote call")
            }
            ErrorKind::PermissionDenied => {
                warn!(entity = E::TABLE, op = %op, id, error = %err, "Permission denied")
            }
            ErrorKind::TransientOrUnknown => {
                error!(entity = E::TABLE, op = %op, id, error = %err, "Remote call failed")
            }
        }
    }

    fn fail<T>(op: Operation, id: &str, err: RepoError) -> Result<T, RepoError> {
        Self::report(op, id, &err);
        Err(err)
    }

    /// Abort a mutation unless a live session exists
    async fn require_session(&self, op: Operation, id: &str) -> Result<Session, RepoError> {
        match self.guard.require_session().await {
            Ok(session) => Ok(session),
            Err(reason) => {
                debug!(entity = E::TABLE, op = %op, reason = %reason, "Session check failed");
                Self::fail(op, id, RepoError::NotAuthenticated)
            }
        }
    }

    fn require_id(op: Operation, id: &str) -> Result<(), RepoError> {
        if id.trim().is_empty() {
            return Self::fail(op, id, Self::invalid("id is required"));
        }
        Ok(())
    }

    /// Serialize a draft or patch and stamp write timestamps into it
    fn payload<T: Serialize>(value: &T, stamp_created: bool) -> Result<Value, RepoError> {
        let mut payload = serde_json::to_value(value)?;
        let fields = payload
            .as_object_mut()
            .ok_or_else(|| Self::invalid("payload must be an object"))?;

        let stamp = serde_json::to_value(write_stamp())?;
        if stamp_created {
            fields.insert("created_at".to_string(), stamp.clone());
        }
        fields.insert("updated_at".to_string(), stamp);
        Ok(payload)
    }

    fn list_query(owner: Option<&str>, ordered: bool) -> Query {
        let mut query = Query::new();
        if let Some(owner) = owner {
            query = query.eq(E::OWNER_COLUMN, owner);
        }
        if ordered {
            query = query.order("created_at", Direction::Desc);
        }
        query
    }

    /// Fetch rows, optionally for one owner, optionally newest first
    pub async fn try_list(&self, owner: Option<&str>, ordered: bool) -> Result<Vec<E>, RepoError> {
        let query = Self::list_query(owner, ordered);
        let rows = match self.api.select(E::TABLE, &query).await {
            Ok(rows) => rows,
            Err(e) => {
                return Self::fail(
                    Operation::List,
                    owner.unwrap_or("*"),
                    Self::classify(Operation::List, owner.unwrap_or("*"), None, e),
                )
            }
        };

        let records = rows
            .into_iter()
            .map(Self::decode)
            .collect::<Result<Vec<E>, _>>();

        match records {
            Ok(records) => {
                debug!(entity = E::TABLE, owner, count = records.len(), "Fetched rows");
                Ok(records)
            }
            Err(e) => Self::fail(Operation::List, owner.unwrap_or("*"), e),
        }
    }

    /// Fetch one row; a missing row is `Ok(None)`
    pub async fn try_get_by_id(&self, id: &str) -> Result<Option<E>, RepoError> {
        let query = Query::new().eq("id", id);
        match self.api.select_one(E::TABLE, &query).await {
            Ok(Some(row)) => Self::decode(row)
                .map(Some)
                .or_else(|e| Self::fail(Operation::Get, id, e)),
            Ok(None) => Ok(None),
            Err(e) => match Self::classify(Operation::Get, id, None, e) {
                RepoError::NotFound { .. } => Ok(None),
                other => Self::fail(Operation::Get, id, other),
            },
        }
    }

    /// Full collection; empty on failure
    pub async fn list_all(&self) -> Vec<E> {
        self.try_list(None, false).await.unwrap_or_default()
    }

    /// Single record; `None` when missing or on failure
    pub async fn get_by_id(&self, id: &str) -> Option<E> {
        self.try_get_by_id(id).await.ok().flatten()
    }

    /// Records of one owner; empty on failure
    pub async fn list_by_owner(&self, owner_key: &str) -> Vec<E> {
        self.try_list(Some(owner_key), false).await.unwrap_or_default()
    }

    /// Newest first, for one owner or everything; empty on failure
    pub async fn list_ordered(&self, owner_key: Option<&str>) -> Vec<E> {
        self.try_list(owner_key, true).await.unwrap_or_default()
    }

    /// Insert a new record
    pub async fn create(&self, draft: &E::Draft) -> Result<E, RepoError> {
        let op = Operation::Create;
        let session = self.require_session(op, "").await?;

        if let Err(reason) = E::validate_draft(draft) {
            return Self::fail(op, "", Self::invalid(reason));
        }

        let payload = Self::payload(draft, true).or_else(|e| Self::fail(op, "", e))?;
        let record = match self.api.insert(E::TABLE, &payload).await {
            Ok(row) => Self::decode(row).or_else(|e| Self::fail(op, "", e))?,
            Err(e) => return Self::fail(op, "", Self::classify(op, "", Some(&session), e)),
        };

        info!(entity = E::TABLE, id = record.id(), user_id = %session.user_id, "Created record");
        Ok(record)
    }

    /// Apply a partial update to one record
    pub async fn update(&self, id: &str, patch: &E::Patch) -> Result<E, RepoError> {
        let op = Operation::Update;
        let session = self.require_session(op, id).await?;
        Self::require_id(op, id)?;

        if let Err(reason) = E::validate_patch(patch) {
            return Self::fail(op, id, Self::invalid(reason));
        }

        let payload = Self::payload(patch, false).or_else(|e| Self::fail(op, id, e))?;
        let query = Query::new().eq("id", id);
        let rows = match self.api.update(E::TABLE, &query, &payload).await {
            Ok(rows) => rows,
            Err(e) => return Self::fail(op, id, Self::classify(op, id, Some(&session), e)),
        };

        let Some(row) = rows.into_iter().next() else {
            // RLS hides rows the user cannot touch, so "no row" covers both cases
            return Self::fail(
                op,
                id,
                RepoError::NotFound {
                    entity: E::TABLE,
                    id: id.to_string(),
                },
            );
        };

        let record = Self::decode(row).or_else(|e| Self::fail(op, id, e))?;
        info!(entity = E::TABLE, id, user_id = %session.user_id, "Updated record");
        Ok(record)
    }

    /// Delete one record.
    ///
    /// Unlike the reads, failure is always returned so the caller can decide
    /// what to do with state it already changed.
    pub async fn delete(&self, id: &str) -> Result<(), RepoError> {
        let op = Operation::Delete;
        let session = self.require_session(op, id).await?;
        Self::require_id(op, id)?;

        let query = Query::new().eq("id", id);
        let deleted = match self.api.delete(E::TABLE, &query).await {
            Ok(rows) => rows,
            Err(e) => return Self::fail(op, id, Self::classify(op, id, Some(&session), e)),
        };

        if deleted.is_empty() {
            return Self::fail(
                op,
                id,
                RepoError::NotFound {
                    entity: E::TABLE,
                    id: id.to_string(),
                },
            );
        }

        info!(entity = E::TABLE, id, user_id = %session.user_id, "Deleted record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::session::tests::session;
    use crate::auth::SessionStore;
    use crate::store::memory::{CallStats, MemoryTables};
    use crate::store::products::{NewProduct, Product, ProductUpdate};
    use crate::store::stores::{NewStore, Store};
    use serde_json::json;

    struct Fixture {
        tables: Arc<MemoryTables>,
        sessions: SessionStore,
        products: Repository<Product>,
        stores: Repository<Store>,
    }

    fn fixture() -> Fixture {
        let tables = Arc::new(MemoryTables::new());
        let sessions = SessionStore::new();
        let guard = SessionGuard::new(Arc::new(sessions.clone()));
        Fixture {
            products: Repository::new(tables.clone(), guard.clone()),
            stores: Repository::new(tables.clone(), guard),
            tables,
            sessions,
        }
    }

    fn signed_in() -> Fixture {
        let fx = fixture();
        fx.sessions.set(session("owner-1"));
        fx
    }

    #[tokio::test]
    async fn create_returns_record_matching_draft() {
        let fx = signed_in();
        let mut draft = NewProduct::new("store-1", "Espresso cup", 7.25);
        draft.stock = 12;
        draft.description = Some("Porcelain".into());

        let product = fx.products.create(&draft).await.unwrap();
        assert!(!product.id.is_empty());
        assert_eq!(product.name, draft.name);
        assert_eq!(product.store_id, draft.store_id);
        assert_eq!(product.price, draft.price);
        assert_eq!(product.stock, 12);
        assert_eq!(product.description.as_deref(), Some("Porcelain"));
        assert_eq!(product.created_at, product.updated_at);

        let other = fx.products.create(&draft).await.unwrap();
        assert_ne!(other.id, product.id);
    }

    #[tokio::test]
    async fn mutations_without_session_never_write() {
        let fx = fixture();
        fx.tables.seed(
            "products",
            json!({ "id": "p1", "store_id": "s1", "name": "Mug", "price": 3.0,
                    "created_at": "2024-01-01T00:00:00Z", "updated_at": "2024-01-01T00:00:00Z" }),
        );

        let created = fx.products.create(&NewProduct::new("s1", "Mug", 3.0)).await;
        assert!(matches!(created, Err(RepoError::NotAuthenticated)));

        let updated = fx.products.update("p1", &ProductUpdate::default()).await;
        assert!(matches!(updated, Err(RepoError::NotAuthenticated)));

        let deleted = fx.products.delete("p1").await;
        assert_eq!(deleted.unwrap_err().kind(), ErrorKind::NotAuthenticated);

        assert_eq!(fx.tables.stats(), CallStats::default());
        assert_eq!(fx.tables.rows("products").len(), 1);
    }

    #[tokio::test]
    async fn invalid_draft_is_rejected_before_remote_call() {
        let fx = signed_in();
        let err = fx
            .stores
            .create(&NewStore::new("owner-1", "   "))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        let err = fx.stores.delete("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert_eq!(fx.tables.stats().writes, 0);
    }

    #[tokio::test]
    async fn get_by_id_of_unknown_id_is_absent() {
        let fx = fixture();
        assert!(fx.stores.get_by_id("missing").await.is_none());
        assert!(fx.stores.try_get_by_id("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reads_degrade_on_remote_failure() {
        let fx = signed_in();
        fx.stores.create(&NewStore::new("owner-1", "Corner")).await.unwrap();

        fx.tables.fail_next(SupabaseError::Api {
            status: 503,
            code: None,
            message: "unavailable".into(),
        });
        assert!(fx.stores.list_all().await.is_empty());
        assert_eq!(fx.stores.list_all().await.len(), 1);

        let id = fx.stores.list_all().await[0].id.clone();
        fx.tables.fail_next(SupabaseError::NoRowReturned);
        assert!(fx.stores.get_by_id(&id).await.is_none());
    }

    #[tokio::test]
    async fn list_by_owner_and_ordered() {
        let fx = signed_in();
        let first = fx.products.create(&NewProduct::new("s1", "A", 1.0)).await.unwrap();
        fx.products.create(&NewProduct::new("s2", "B", 2.0)).await.unwrap();
        let third = fx.products.create(&NewProduct::new("s1", "C", 3.0)).await.unwrap();

        let owned = fx.products.list_by_owner("s1").await;
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|p| p.store_id == "s1"));

        let newest_first = fx.products.list_for_store("s1").await;
        assert_eq!(newest_first, vec![third.clone(), first.clone()]);

        let everything = fx.products.list_ordered(None).await;
        assert_eq!(everything.len(), 3);
        assert_eq!(everything[0], third);
    }

    #[tokio::test]
    async fn update_then_fetch_shows_change_and_newer_stamp() {
        let fx = signed_in();
        let store = fx.stores.create(&NewStore::new("owner-1", "Corner")).await.unwrap();

        let patch = crate::store::stores::StoreUpdate {
            address: Some("1 Main St".into()),
            ..Default::default()
        };
        let updated = fx.stores.update(&store.id, &patch).await.unwrap();
        assert_eq!(updated.id, store.id);
        assert_eq!(updated.created_at, store.created_at);

        let fetched = fx.stores.get_by_id(&store.id).await.unwrap();
        assert_eq!(fetched.address.as_deref(), Some("1 Main St"));
        assert!(fetched.updated_at > store.updated_at);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let fx = signed_in();
        let err = fx
            .stores
            .update("ghost", &Default::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound { ref id, .. } if id == "ghost"));
    }

    #[tokio::test]
    async fn delete_of_missing_row_reports_failure() {
        let fx = signed_in();
        let err = fx.products.delete("ghost").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let fx = signed_in();
        let product = fx.products.create(&NewProduct::new("s1", "A", 1.0)).await.unwrap();
        tokio_test::assert_ok!(fx.products.delete(&product.id).await);
        assert!(fx.products.get_by_id(&product.id).await.is_none());
    }

    #[tokio::test]
    async fn permission_denied_is_enriched() {
        let fx = signed_in();
        fx.tables.deny_writes("products");

        let err = fx
            .products
            .create(&NewProduct::new("someone-elses-store", "A", 1.0))
            .await
            .unwrap_err();

        match err {
            RepoError::PermissionDenied {
                entity,
                operation,
                explanation,
            } => {
                assert_eq!(entity, "products");
                assert_eq!(operation, Operation::Create);
                assert!(explanation.contains("owner-1"));
                assert!(explanation.contains("store_id"));
            }
            other => panic!("expected permission denied, got {other:?}"),
        }
    }

    /// Entity whose draft and patch serialize to bare strings
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Tag {
        id: String,
        owner_id: String,
        created_at: chrono::DateTime<chrono::Utc>,
        updated_at: chrono::DateTime<chrono::Utc>,
    }

    impl Entity for Tag {
        type Draft = String;
        type Patch = String;

        const TABLE: &'static str = "tags";
        const OWNER_COLUMN: &'static str = "owner_id";

        fn id(&self) -> &str {
            &self.id
        }

        fn owner_key(&self) -> &str {
            &self.owner_id
        }

        fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.created_at
        }

        fn updated_at(&self) -> chrono::DateTime<chrono::Utc> {
            self.updated_at
        }

        fn validate_draft(_draft: &String) -> Result<(), String> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn non_object_payload_is_rejected_before_remote_call() {
        let fx = signed_in();
        let tags: Repository<Tag> = Repository::new(
            fx.tables.clone(),
            SessionGuard::new(Arc::new(fx.sessions.clone())),
        );

        let err = tags.create(&"urgent".to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(err.to_string().contains("payload must be an object"));

        let err = tags.update("t1", &"urgent".to_string()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);

        assert_eq!(fx.tables.stats().writes, 0);
    }
}

//! Client-side collection state mirrored from a repository

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::auth::{Session, SessionStore};
use crate::store::entity::Entity;
use crate::store::repository::{RepoError, Repository};

/// Which rows `refresh` pulls in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// Every row the session can see
    All,
    /// Rows of one fixed owner key
    Owner(String),
    /// Rows owned by the signed-in user
    SessionUser,
}

/// Observable state of one collection
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSnapshot<E> {
    pub items: Vec<E>,
    pub selected: Option<E>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<E> Default for CollectionSnapshot<E> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: None,
            loading: false,
            error: None,
        }
    }
}

/// Collection of one entity type plus a selection, a loading flag and the
/// last error message.
///
/// Overlapping operations are not sequenced: whichever finishes last wins.
pub struct CollectionState<E: Entity> {
    repo: Repository<E>,
    sessions: SessionStore,
    scope: Scope,
    state: watch::Sender<CollectionSnapshot<E>>,
}

impl<E: Entity> CollectionState<E> {
    pub fn new(repo: Repository<E>, sessions: SessionStore, scope: Scope) -> Self {
        let (state, _rx) = watch::channel(CollectionSnapshot::default());
        Self {
            repo,
            sessions,
            scope,
            state,
        }
    }

    pub fn repository(&self) -> &Repository<E> {
        &self.repo
    }

    pub fn snapshot(&self) -> CollectionSnapshot<E> {
        self.state.borrow().clone()
    }

    pub fn items(&self) -> Vec<E> {
        self.state.borrow().items.clone()
    }

    pub fn selected(&self) -> Option<E> {
        self.state.borrow().selected.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    /// Change notifications for consumers
    pub fn subscribe(&self) -> watch::Receiver<CollectionSnapshot<E>> {
        self.state.subscribe()
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.loading = true;
            s.error = None;
        });
    }

    fn record_failure(&self, err: &RepoError) {
        let message = err.to_string();
        self.state.send_modify(|s| {
            s.loading = false;
            s.error = Some(message);
        });
    }

    fn owner_key(&self) -> Option<String> {
        match &self.scope {
            Scope::All => None,
            Scope::Owner(key) => Some(key.clone()),
            Scope::SessionUser => self.sessions.get().map(|s| s.user_id),
        }
    }

    /// Reload the collection. Never fails; a failure is recorded in `error`
    /// and yields an empty result.
    pub async fn refresh(&self) -> Vec<E> {
        self.begin();

        let owner = self.owner_key();
        if self.scope == Scope::SessionUser && owner.is_none() {
            self.record_failure(&RepoError::NotAuthenticated);
            return Vec::new();
        }

        match self.repo.try_list(owner.as_deref(), true).await {
            Ok(items) => {
                self.state.send_modify(|s| {
                    // Keep the selection pointed at a row that still exists
                    let fresh = s
                        .selected
                        .as_ref()
                        .and_then(|sel| items.iter().find(|i| i.id() == sel.id()).cloned());
                    s.selected = fresh.or_else(|| items.first().cloned());
                    s.items = items.clone();
                    s.loading = false;
                });
                debug!(entity = E::TABLE, count = items.len(), "Collection refreshed");
                items
            }
            Err(e) => {
                self.record_failure(&e);
                Vec::new()
            }
        }
    }

    /// Look up one record without touching the collection
    pub async fn fetch_one(&self, id: &str) -> Option<E> {
        self.repo.get_by_id(id).await
    }

    /// Records of one owner without touching the collection
    pub async fn fetch_by_owner(&self, owner_key: &str) -> Vec<E> {
        self.repo.list_by_owner(owner_key).await
    }

    /// Create a record; on success it goes to the front and becomes selected
    pub async fn add(&self, draft: &E::Draft) -> Result<E, RepoError> {
        self.begin();
        match self.repo.create(draft).await {
            Ok(record) => {
                self.state.send_modify(|s| {
                    s.items.insert(0, record.clone());
                    s.selected = Some(record.clone());
                    s.loading = false;
                });
                Ok(record)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Update a record and replace it in place
    pub async fn edit(&self, id: &str, patch: &E::Patch) -> Result<E, RepoError> {
        self.begin();
        match self.repo.update(id, patch).await {
            Ok(record) => {
                self.state.send_modify(|s| {
                    if let Some(slot) = s.items.iter_mut().find(|i| i.id() == record.id()) {
                        *slot = record.clone();
                    }
                    if s.selected.as_ref().is_some_and(|sel| sel.id() == record.id()) {
                        s.selected = Some(record.clone());
                    }
                    s.loading = false;
                });
                Ok(record)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Delete a record; `false` when the remote delete failed
    pub async fn remove(&self, id: &str) -> bool {
        self.begin();
        match self.repo.delete(id).await {
            Ok(()) => {
                self.state.send_modify(|s| {
                    s.items.retain(|i| i.id() != id);
                    if s.selected.as_ref().is_some_and(|sel| sel.id() == id) {
                        s.selected = None;
                    }
                    s.loading = false;
                });
                true
            }
            Err(e) => {
                self.record_failure(&e);
                false
            }
        }
    }

    /// Point the selection at a record (or nothing)
    pub fn select(&self, record: Option<E>) {
        self.state.send_modify(|s| s.selected = record);
    }

    /// Drop the cached collection and selection; no remote call
    pub fn clear(&self) {
        self.state.send_modify(|s| {
            s.items.clear();
            s.selected = None;
            s.error = None;
            s.loading = false;
        });
    }

    /// React to sign-in and sign-out.
    ///
    /// A session appearing triggers `refresh`, a session disappearing clears
    /// the collection, and a different user signing in does both.
    pub fn watch_session(
        self: &Arc<Self>,
        mut sessions: watch::Receiver<Option<Session>>,
    ) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut current_user: Option<String> = None;
            // Set while `current_user` still needs a completed refresh
            let mut stale = false;
            loop {
                let user = sessions.borrow_and_update().as_ref().map(|s| s.user_id.clone());

                if user != current_user {
                    if current_user.is_some() {
                        info!(entity = E::TABLE, "Session ended, clearing collection");
                        this.clear();
                    }
                    current_user = user;
                    stale = current_user.is_some();
                }

                if stale {
                    // A session change drops the in-flight refresh so that
                    // sign-out is handled without waiting on the network
                    tokio::select! {
                        _ = this.refresh() => stale = false,
                        changed = sessions.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                    }
                }

                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

//! Application state shared by every consumer

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::app::collection::{CollectionState, Scope};
use crate::auth::{AuthClient, SessionGuard, SessionStore};
use crate::config::Config;
use crate::store::{Product, Repository, Store, SupabaseClient, TableApi};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: SessionStore,
    pub auth: AuthClient,
    pub products: Arc<CollectionState<Product>>,
    pub stores: Arc<CollectionState<Store>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let sessions = SessionStore::new();

        // Initialize Supabase client
        let supabase = SupabaseClient::new(&config, sessions.clone());

        Self::with_tables(config, sessions, Arc::new(supabase))
    }

    /// Build the state on top of any table service
    pub fn with_tables(config: Config, sessions: SessionStore, tables: Arc<dyn TableApi>) -> Self {
        let config = Arc::new(config);
        let guard = SessionGuard::new(Arc::new(sessions.clone()));

        // Initialize repositories and their containers
        let products = Arc::new(CollectionState::new(
            Repository::new(tables.clone(), guard.clone()),
            sessions.clone(),
            Scope::All,
        ));
        let stores = Arc::new(CollectionState::new(
            Repository::new(tables, guard),
            sessions.clone(),
            Scope::SessionUser,
        ));

        let auth = AuthClient::new(&config, sessions.clone());

        Self {
            config,
            sessions,
            auth,
            products,
            stores,
        }
    }

    /// Subscribe both collections to session transitions
    pub fn watch_sessions(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.products.watch_session(self.sessions.subscribe()),
            self.stores.watch_session(self.sessions.subscribe()),
        ]
    }
}

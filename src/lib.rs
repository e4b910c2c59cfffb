//! Storefront sync - client-side data layer for Supabase-backed products and stores
//!
//! This crate handles:
//! - Typed CRUD over the PostgREST table API with error translation
//! - Session checks in front of every mutation
//! - In-memory collections with selection, loading and error state
//! - Sign-in and sign-out against the Supabase auth endpoint

pub mod app;
pub mod auth;
pub mod config;
pub mod store;
pub mod util;

pub use app::{AppState, CollectionSnapshot, CollectionState, Scope};
pub use auth::{AuthClient, Session, SessionGuard, SessionStore};
pub use config::Config;
pub use store::{Entity, Product, RepoError, Repository, Store, SupabaseClient};

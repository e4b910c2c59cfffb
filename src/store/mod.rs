//! Data store modules for Supabase integration

pub mod entity;
pub mod memory;
pub mod products;
pub mod query;
pub mod repository;
pub mod stores;
pub mod supabase;

pub use entity::Entity;
pub use memory::MemoryTables;
pub use products::{NewProduct, Product, ProductUpdate};
pub use query::{Direction, Query};
pub use repository::{ErrorKind, Operation, RepoError, Repository};
pub use stores::{NewStore, Store, StoreUpdate};
pub use supabase::{SupabaseClient, SupabaseError, TableApi};

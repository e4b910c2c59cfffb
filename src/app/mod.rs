//! Application wiring and client-side state

pub mod collection;
pub mod state;

pub use collection::{CollectionSnapshot, CollectionState, Scope};
pub use state::AppState;

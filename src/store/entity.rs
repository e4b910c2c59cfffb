//! Entity contract shared by products and stores

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// A record type stored in one table and owned through one foreign key
pub trait Entity:
    Clone + std::fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Fields accepted on insert
    type Draft: Serialize + Send + Sync;
    /// Partial update; unset fields are not sent
    type Patch: Serialize + Send + Sync;

    /// Remote table name
    const TABLE: &'static str;
    /// Column holding the owning key
    const OWNER_COLUMN: &'static str;

    fn id(&self) -> &str;
    fn owner_key(&self) -> &str;
    fn created_at(&self) -> DateTime<Utc>;
    fn updated_at(&self) -> DateTime<Utc>;

    /// Check the mandatory field set before anything is sent
    fn validate_draft(draft: &Self::Draft) -> Result<(), String>;

    fn validate_patch(_patch: &Self::Patch) -> Result<(), String> {
        Ok(())
    }
}

/// Shared check for required text fields
pub(crate) fn require_text(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

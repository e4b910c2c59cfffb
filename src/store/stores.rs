//! Stores owned by a user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{require_text, Entity};
use super::repository::Repository;

/// Store row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Store {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New store for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewStore {
    pub owner_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl NewStore {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            name: name.into(),
            description: None,
            address: None,
            phone: None,
        }
    }
}

/// Store update
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl Entity for Store {
    type Draft = NewStore;
    type Patch = StoreUpdate;

    const TABLE: &'static str = "stores";
    const OWNER_COLUMN: &'static str = "owner_id";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_key(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn validate_draft(draft: &NewStore) -> Result<(), String> {
        require_text("name", &draft.name)?;
        require_text("owner_id", &draft.owner_id)
    }

    fn validate_patch(patch: &StoreUpdate) -> Result<(), String> {
        match &patch.name {
            Some(name) => require_text("name", name),
            None => Ok(()),
        }
    }
}

impl Repository<Store> {
    /// Stores owned by one user, newest first
    pub async fn list_for_owner(&self, owner_id: &str) -> Vec<Store> {
        self.list_ordered(Some(owner_id)).await
    }
}

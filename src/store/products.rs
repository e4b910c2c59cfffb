//! Products belonging to a store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{require_text, Entity};
use super::repository::Repository;

/// Product row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub store_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: f64,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New product for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewProduct {
    pub store_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub stock: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl NewProduct {
    pub fn new(store_id: impl Into<String>, name: impl Into<String>, price: f64) -> Self {
        Self {
            store_id: store_id.into(),
            name: name.into(),
            description: None,
            price,
            stock: 0,
            image_url: None,
        }
    }
}

/// Product update
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

fn check_price(price: f64) -> Result<(), String> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(format!("price must be a non-negative number, got {}", price))
    }
}

fn check_stock(stock: i32) -> Result<(), String> {
    if stock < 0 {
        return Err(format!("stock cannot be negative, got {}", stock));
    }
    Ok(())
}

impl Entity for Product {
    type Draft = NewProduct;
    type Patch = ProductUpdate;

    const TABLE: &'static str = "products";
    const OWNER_COLUMN: &'static str = "store_id";

    fn id(&self) -> &str {
        &self.id
    }

    fn owner_key(&self) -> &str {
        &self.store_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn validate_draft(draft: &NewProduct) -> Result<(), String> {
        require_text("name", &draft.name)?;
        require_text("store_id", &draft.store_id)?;
        check_price(draft.price)?;
        check_stock(draft.stock)
    }

    fn validate_patch(patch: &ProductUpdate) -> Result<(), String> {
        if let Some(name) = &patch.name {
            require_text("name", name)?;
        }
        if let Some(price) = patch.price {
            check_price(price)?;
        }
        patch.stock.map_or(Ok(()), check_stock)
    }
}

impl Repository<Product> {
    /// Products of one store, newest first
    pub async fn list_for_store(&self, store_id: &str) -> Vec<Product> {
        self.list_ordered(Some(store_id)).await
    }
}

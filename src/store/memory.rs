//! In-memory table service with PostgREST semantics.
//!
//! Used by tests and offline runs. Counts calls so callers can assert that
//! a rejected mutation never reached the table.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::query::{Direction, Query};
use super::supabase::{SupabaseError, TableApi, CODE_NOT_FOUND, CODE_PERMISSION_DENIED};
use crate::util::time::now_micros;

/// Per-service call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub reads: usize,
    pub writes: usize,
}

#[derive(Default)]
pub struct MemoryTables {
    tables: Mutex<HashMap<String, Vec<Value>>>,
    stats: Mutex<CallStats>,
    denied_writes: Mutex<HashSet<String>>,
    fail_next: Mutex<Option<SupabaseError>>,
}

impl MemoryTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row as if it had been written earlier
    pub fn seed(&self, table: &str, row: Value) {
        self.tables.lock().entry(table.to_string()).or_default().push(row);
    }

    /// Reject every write to `table` with a row-level security error
    pub fn deny_writes(&self, table: &str) {
        self.denied_writes.lock().insert(table.to_string());
    }

    /// Fail the next call of any kind with `error`
    pub fn fail_next(&self, error: SupabaseError) {
        *self.fail_next.lock() = Some(error);
    }

    pub fn stats(&self) -> CallStats {
        *self.stats.lock()
    }

    /// Rows currently stored, in insertion order
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    fn begin(&self, write: bool, table: &str) -> Result<(), SupabaseError> {
        {
            let mut stats = self.stats.lock();
            if write {
                stats.writes += 1;
            } else {
                stats.reads += 1;
            }
        }

        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }

        if write && self.denied_writes.lock().contains(table) {
            return Err(SupabaseError::Api {
                status: 403,
                code: Some(CODE_PERMISSION_DENIED.to_string()),
                message: format!("new row violates row-level security policy for table \"{}\"", table),
            });
        }

        Ok(())
    }
}

fn matches(row: &Value, query: &Query) -> bool {
    query.filters().iter().all(|(column, expected)| match row.get(column) {
        Some(Value::String(s)) => s == expected,
        Some(Value::Null) | None => false,
        Some(other) => other.to_string() == *expected,
    })
}

/// Timestamps compare as instants, everything else as JSON text
fn compare_column(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let as_time = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .and_then(|s| DateTime::<FixedOffset>::parse_from_rfc3339(s).ok())
    };

    match (as_time(a), as_time(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        _ => {
            let text = |v: Option<&Value>| match v {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            text(a).cmp(&text(b))
        }
    }
}

fn apply_order(rows: &mut [Value], query: &Query) {
    if let Some((column, direction)) = query.ordering() {
        rows.sort_by(|a, b| {
            let ord = compare_column(a.get(column), b.get(column));
            match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, SupabaseError> {
    value.as_object().ok_or_else(|| SupabaseError::Api {
        status: 400,
        code: Some("PGRST102".to_string()),
        message: "Expected a JSON object".to_string(),
    })
}

#[async_trait]
impl TableApi for MemoryTables {
    async fn select(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError> {
        self.begin(false, table)?;
        let mut rows: Vec<Value> = self
            .rows(table)
            .into_iter()
            .filter(|row| matches(row, query))
            .collect();
        apply_order(&mut rows, query);
        Ok(rows)
    }

    async fn select_one(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<Value>, SupabaseError> {
        self.begin(false, table)?;
        let mut found = self.rows(table).into_iter().filter(|row| matches(row, query));
        match (found.next(), found.next()) {
            (Some(row), None) => Ok(Some(row)),
            (None, _) => Ok(None),
            (Some(_), Some(_)) => Err(SupabaseError::Api {
                status: 406,
                code: Some(CODE_NOT_FOUND.to_string()),
                message: "JSON object requested, multiple (or no) rows returned".to_string(),
            }),
        }
    }

    async fn insert(&self, table: &str, row: &Value) -> Result<Value, SupabaseError> {
        self.begin(true, table)?;
        let mut stored = as_object(row)?.clone();

        if stored.get("id").map_or(true, Value::is_null) {
            stored.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        for column in ["created_at", "updated_at"] {
            if stored.get(column).map_or(true, Value::is_null) {
                stored.insert(column.to_string(), serde_json::json!(now_micros()));
            }
        }

        let stored = Value::Object(stored);
        self.seed(table, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        query: &Query,
        patch: &Value,
    ) -> Result<Vec<Value>, SupabaseError> {
        self.begin(true, table)?;
        let patch = as_object(patch)?;

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let mut updated = Vec::new();
        for row in rows.iter_mut().filter(|row| matches(row, query)) {
            if let Some(fields) = row.as_object_mut() {
                for (column, value) in patch {
                    // Primary keys are immutable
                    if column != "id" {
                        fields.insert(column.clone(), value.clone());
                    }
                }
            }
            updated.push(row.clone());
        }
        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> Result<Vec<Value>, SupabaseError> {
        self.begin(true, table)?;

        let mut tables = self.tables.lock();
        let rows = tables.entry(table.to_string()).or_default();
        let (deleted, kept): (Vec<Value>, Vec<Value>) =
            rows.drain(..).partition(|row| matches(row, query));
        *rows = kept;
        Ok(deleted)
    }
}

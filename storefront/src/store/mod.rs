//! Remote table store seam
//!
//! The hosted backend is a table API with per-table select/insert/update/delete
//! and equality filters. Services only ever talk to it through [`TableStore`],
//! usually via the typed [`Table`] wrapper.

pub mod memory;
pub mod supabase;

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// One table row as the store sees it
pub type Row = serde_json::Map<String, Value>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-level failures
#[derive(Error, Debug)]
pub enum StoreError {
    /// Could not reach the store at all
    #[error("Store unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// Insert or update hit a uniqueness constraint
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// The store answered with a non-success status
    #[error("Store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The store answered with something we cannot decode
    #[error("Malformed store response: {0}")]
    Malformed(String),

    /// Update or delete without any filter
    #[error("Refusing table-wide write without filters")]
    Unfiltered,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Column equality filter
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether `row` satisfies this filter
    pub fn matches(&self, row: &Row) -> bool {
        row.get(&self.column).unwrap_or(&Value::Null) == &self.value
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.column, self.value)
    }
}

/// Hosted table store
#[async_trait]
pub trait TableStore: Send + Sync {
    /// All rows of `table` matching every filter
    async fn select(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>>;

    /// Insert one row and return it as stored, including the assigned `id`
    async fn insert(&self, table: &str, row: Row) -> StoreResult<Row>;

    /// Apply `patch` to every matching row and return the updated rows
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<Vec<Row>>;

    /// Remove every matching row and return what was removed
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>>;

    /// Cheap connectivity check
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Typed view of one table
pub struct Table<T> {
    store: Arc<dyn TableStore>,
    name: &'static str,
    _row: PhantomData<fn() -> T>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            name: self.name,
            _row: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> Table<T> {
    pub fn new(store: Arc<dyn TableStore>, name: &'static str) -> Self {
        Self {
            store,
            name,
            _row: PhantomData,
        }
    }

    pub async fn find(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let rows = self.store.select(self.name, filters).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn find_one(&self, filters: &[Filter]) -> StoreResult<Option<T>> {
        let rows = self.store.select(self.name, filters).await?;
        rows.into_iter().next().map(from_row).transpose()
    }

    pub async fn insert<R: Serialize>(&self, row: &R) -> StoreResult<T> {
        let stored = self.store.insert(self.name, to_row(row)?).await?;
        from_row(stored)
    }

    pub async fn update<R: Serialize>(&self, filters: &[Filter], patch: &R) -> StoreResult<Vec<T>> {
        let rows = self.store.update(self.name, filters, to_row(patch)?).await?;
        rows.into_iter().map(from_row).collect()
    }

    pub async fn delete(&self, filters: &[Filter]) -> StoreResult<Vec<T>> {
        let rows = self.store.delete(self.name, filters).await?;
        rows.into_iter().map(from_row).collect()
    }
}

fn to_row<R: Serialize>(value: &R) -> StoreResult<Row> {
    match serde_json::to_value(value)? {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::Malformed(format!("expected a JSON object row, got {}", other))),
    }
}

fn from_row<T: DeserializeOwned>(row: Row) -> StoreResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

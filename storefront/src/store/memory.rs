use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::{Filter, Row, StoreError, StoreResult, TableStore};

/// In-process table store
///
/// Every write happens under one lock, so a filtered update behaves as an
/// atomic compare-and-set, the way a single conditional statement does on
/// the hosted store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, MemoryTable>>,
    unique: HashMap<String, Vec<String>>,
}

#[derive(Debug)]
struct MemoryTable {
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with the constraints the storefront schema declares
    pub fn for_storefront() -> Self {
        Self::new().with_unique("users", "username")
    }

    /// Declare `column` unique within `table`
    pub fn with_unique(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.unique.entry(table.into()).or_default().push(column.into());
        self
    }

    fn check_unique(&self, table: &str, data: &MemoryTable, candidate: &Row, skip_id: Option<i64>) -> StoreResult<()> {
        let Some(columns) = self.unique.get(table) else {
            return Ok(());
        };

        for column in columns {
            let Some(value) = candidate.get(column).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = data
                .rows
                .iter()
                .any(|(id, row)| Some(*id) != skip_id && row.get(column) == Some(value));
            if clash {
                return Err(StoreError::UniqueViolation(format!("{}.{} = {}", table, column, value)));
            }
        }
        Ok(())
    }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|f| f.matches(row))
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn select(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .map(|t| {
                t.rows
                    .values()
                    .filter(|row| matches_all(row, filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(rows)
    }

    async fn insert(&self, table: &str, mut row: Row) -> StoreResult<Row> {
        let mut tables = self.tables.write().await;
        let data = tables.entry(table.to_string()).or_default();

        let id = match row.get("id").and_then(Value::as_i64) {
            Some(id) if data.rows.contains_key(&id) => {
                return Err(StoreError::UniqueViolation(format!("{}.id = {}", table, id)));
            }
            Some(id) => id,
            None => data.next_id,
        };

        self.check_unique(table, data, &row, None)?;

        row.insert("id".to_string(), Value::from(id));
        data.next_id = data.next_id.max(id + 1);
        data.rows.insert(id, row.clone());

        debug!("Inserted {}#{}", table, id);
        Ok(row)
    }

    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> StoreResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(StoreError::Unfiltered);
        }

        let mut tables = self.tables.write().await;
        let Some(data) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let ids: Vec<i64> = data
            .rows
            .iter()
            .filter(|(_, row)| matches_all(row, filters))
            .map(|(id, _)| *id)
            .collect();

        // Validate every candidate before touching anything.
        let mut updated = Vec::with_capacity(ids.len());
        for id in &ids {
            let mut row = data.rows[id].clone();
            for (column, value) in &patch {
                if column != "id" {
                    row.insert(column.clone(), value.clone());
                }
            }
            self.check_unique(table, data, &row, Some(*id))?;
            updated.push((*id, row));
        }

        for (id, row) in &updated {
            data.rows.insert(*id, row.clone());
        }

        debug!("Updated {} row(s) in {}", updated.len(), table);
        Ok(updated.into_iter().map(|(_, row)| row).collect())
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<Vec<Row>> {
        if filters.is_empty() {
            return Err(StoreError::Unfiltered);
        }

        let mut tables = self.tables.write().await;
        let Some(data) = tables.get_mut(table) else {
            return Ok(Vec::new());
        };

        let ids: Vec<i64> = data
            .rows
            .iter()
            .filter(|(_, row)| matches_all(row, filters))
            .map(|(id, _)| *id)
            .collect();

        let removed: Vec<Row> = ids.iter().filter_map(|id| data.rows.remove(id)).collect();

        debug!("Deleted {} row(s) from {}", removed.len(), table);
        Ok(removed)
    }
}

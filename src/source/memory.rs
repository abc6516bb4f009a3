use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{MirrorError, MirrorResult};
use crate::source::SourceReader;
use crate::types::{ColumnDescriptor, SqlValue, TableSnapshot};

/// Source backed by snapshots held in memory.
///
/// Used for offline runs from a JSON snapshot file and as a test double.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    tables: HashMap<String, TableSnapshot>,
    label: String,
}

/// On-disk layout of a snapshot file: rows are plain JSON arrays
#[derive(Debug, Deserialize)]
struct SnapshotFile {
    tables: Vec<SnapshotTable>,
}

#[derive(Debug, Deserialize)]
struct SnapshotTable {
    name: String,
    columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
            label: "in-memory source".to_string(),
        }
    }

    pub fn with_table(mut self, snapshot: TableSnapshot) -> Self {
        self.insert(snapshot);
        self
    }

    pub fn insert(&mut self, snapshot: TableSnapshot) {
        self.tables.insert(snapshot.name().to_string(), snapshot);
    }

    /// Load snapshots from a JSON file of the form
    /// `{"tables": [{"name": ..., "columns": [...], "rows": [[...], ...]}]}`
    pub fn from_json_file(path: impl AsRef<Path>) -> MirrorResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| MirrorError::source_read(None, format!("cannot read {}: {}", path.display(), e)))?;
        let mut source = Self::from_json_str(&content)?;
        source.label = format!("snapshot file {}", path.display());
        info!(path = %path.display(), tables = source.tables.len(), "Loaded source snapshot file");
        Ok(source)
    }

    pub fn from_json_str(content: &str) -> MirrorResult<Self> {
        let file: SnapshotFile = serde_json::from_str(content)
            .map_err(|e| MirrorError::source_read(None, format!("invalid snapshot file: {}", e)))?;

        let mut source = Self::new();
        for table in file.tables {
            let rows = table
                .rows
                .iter()
                .enumerate()
                .map(|(row_index, row)| convert_row(&table.name, row_index, &table.columns, row))
                .collect::<MirrorResult<Vec<_>>>()?;
            source.insert(TableSnapshot::new(table.name, table.columns, rows)?);
        }

        Ok(source)
    }
}

fn convert_row(
    table: &str,
    row_index: usize,
    columns: &[ColumnDescriptor],
    row: &[Value],
) -> MirrorResult<Vec<SqlValue>> {
    if row.len() != columns.len() {
        return Err(MirrorError::source_read(
            Some(table),
            format!("row {} has {} values but the table has {} columns", row_index, row.len(), columns.len()),
        ));
    }

    columns
        .iter()
        .zip(row)
        .map(|(column, value)| {
            SqlValue::from_json(value, &column.source_type).map_err(|message| {
                MirrorError::source_read(Some(table), format!("row {}, column {}: {}", row_index, column.name, message))
            })
        })
        .collect()
}

impl SourceReader for InMemorySource {
    async fn read_table(&mut self, table: &str) -> MirrorResult<TableSnapshot> {
        debug!(table = %table, "Reading table from in-memory source");
        self.tables
            .get(table)
            .cloned()
            .ok_or_else(|| MirrorError::source_read(Some(table), "table does not exist in the source"))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

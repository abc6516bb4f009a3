use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MirrorError;
use crate::monitoring::OperationMetric;
use crate::synchronizer::SyncOutcome;

/// One table that was mirrored successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableReport {
    pub name: String,
    pub columns: usize,
    pub rows_inserted: u64,
    pub rows_replaced: u64,
    pub duration_ms: u64,
}

impl TableReport {
    pub fn from_outcome(outcome: SyncOutcome, columns: usize) -> Self {
        Self {
            name: outcome.table,
            columns,
            rows_inserted: outcome.rows_inserted,
            rows_replaced: outcome.rows_replaced,
            duration_ms: outcome.duration_ms,
        }
    }
}

/// One table whose synchronization failed and was rolled back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFailure {
    pub table: String,
    pub stage: String,
    pub message: String,
}

impl TableFailure {
    pub fn from_error(table: &str, error: &MirrorError) -> Self {
        let stage = match error {
            MirrorError::Sync { stage, .. } => stage.to_string(),
            other => other.stage().to_string(),
        };
        Self {
            table: table.to_string(),
            stage,
            message: error.to_string(),
        }
    }
}

/// Summary of a finished mirror run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorReport {
    pub run_id: Uuid,
    pub source: String,
    pub destination: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tables: Vec<TableReport>,
    pub failures: Vec<TableFailure>,
    pub operations: Vec<OperationMetric>,
}

impl MirrorReport {
    pub fn tables_mirrored(&self) -> usize {
        self.tables.len()
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|table| table.rows_inserted).sum()
    }

    pub fn is_successful(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableReport> {
        self.tables.iter().find(|table| table.name == name)
    }

    /// Human-readable summary: how many tables were mirrored and where the store is
    pub fn summary(&self) -> String {
        let count = self.tables_mirrored();
        let mut summary = format!(
            "Imported {} {}. You can find the sqlite file here:\n{}",
            count,
            if count == 1 { "table" } else { "tables" },
            self.destination
        );

        if !self.failures.is_empty() {
            summary.push_str(&format!(
                "\nFailed to mirror {} {}:",
                self.failures.len(),
                if self.failures.len() == 1 { "table" } else { "tables" }
            ));
            for failure in &self.failures {
                summary.push_str(&format!("\n  - {} ({}): {}", failure.table, failure.stage, failure.message));
            }
        }

        summary
    }
}

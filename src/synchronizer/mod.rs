// Table synchronizer: replace one target table's rows inside a single transaction
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::target::{TargetStorage, TargetTransaction};
use crate::types::Row;


/// Step of the replace protocol at which a synchronization failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Begin,
    Inspect,
    Delete,
    Insert,
    Commit,
    Rollback,
    Verify,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SyncStage::Begin => "begin",
            SyncStage::Inspect => "inspect",
            SyncStage::Delete => "delete",
            SyncStage::Insert => "insert",
            SyncStage::Commit => "commit",
            SyncStage::Rollback => "rollback",
            SyncStage::Verify => "verify",
        };
        f.write_str(name)
    }
}

/// Result of a successful table replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub table: String,
    /// Rows present in the target before the replacement
    pub rows_replaced: u64,
    pub rows_inserted: u64,
    pub duration_ms: u64,
}

/// Replaces a target table's contents with a given row set, all or nothing
#[derive(Debug, Clone, Default)]
pub struct TableSynchronizer {
    verify: bool,
}

impl TableSynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-count the target rows after commit and compare with what was inserted
    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Delete every row of `table` and insert `rows` in order, in one transaction.
    ///
    /// On failure after the transaction began, the transaction is rolled back
    /// and the table keeps its previous contents.
    pub fn synchronize<T: TargetStorage>(
        &self,
        target: &mut T,
        table: &str,
        columns: &[String],
        rows: &[Row],
    ) -> MirrorResult<SyncOutcome> {
        let start = Instant::now();
        debug!(table = %table, rows = rows.len(), "Starting table synchronization");

        let mut tx = target
            .begin()
            .map_err(|e| MirrorError::sync(table, SyncStage::Begin, e.to_string()))?;

        let replaced = match replace_rows(&mut tx, table, columns, rows) {
            Ok(replaced) => replaced,
            Err((stage, cause)) => {
                warn!(table = %table, stage = %stage, error = %cause, "Rolling back table synchronization");
                if let Err(rollback_err) = tx.rollback() {
                    error!(table = %table, error = %rollback_err, "Rollback failed");
                    return Err(MirrorError::sync(
                        table,
                        SyncStage::Rollback,
                        format!("{} (after {} failure: {})", rollback_err, stage, cause),
                    ));
                }
                return Err(MirrorError::sync(table, stage, cause));
            }
        };

        tx.commit()
            .map_err(|e| MirrorError::sync(table, SyncStage::Commit, e.to_string()))?;

        let inserted = rows.len() as u64;
        if self.verify {
            let actual = target
                .count_rows(table)
                .map_err(|e| MirrorError::sync(table, SyncStage::Verify, e.to_string()))?;
            if actual != inserted {
                return Err(MirrorError::Verification {
                    table: table.to_string(),
                    expected: inserted,
                    actual,
                });
            }
            debug!(table = %table, rows = actual, "Verified target row count");
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            table = %table,
            rows_replaced = replaced,
            rows_inserted = inserted,
            duration_ms = duration_ms,
            "Table synchronized"
        );

        Ok(SyncOutcome {
            table: table.to_string(),
            rows_replaced: replaced,
            rows_inserted: inserted,
            duration_ms,
        })
    }
}

/// Clear the table and insert every row inside `tx`; returns how many rows were removed
fn replace_rows<X: TargetTransaction>(
    tx: &mut X,
    table: &str,
    columns: &[String],
    rows: &[Row],
) -> Result<u64, (SyncStage, String)> {
    let existing = tx.count_rows(table).map_err(|e| (SyncStage::Inspect, e.to_string()))?;
    let deleted = tx.delete_all(table).map_err(|e| (SyncStage::Delete, e.to_string()))?;
    debug!(table = %table, existing = existing, deleted = deleted, "Cleared target table");

    for (index, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err((
                SyncStage::Insert,
                format!("row {} has {} values, expected {}", index, row.len(), columns.len()),
            ));
        }

        tx.insert_row(table, columns, row)
            .map_err(|e| (SyncStage::Insert, format!("row {}: {}", index, e)))?;
    }

    Ok(deleted)
}

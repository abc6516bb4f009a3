// Per-run operation tracking: timings, record counts and outcomes of each stage
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

/// Status of a tracked operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    InProgress,
    Completed,
    Failed,
}

/// Timing and throughput of one operation (a run stage or one table)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationMetric {
    pub operation_id: String,
    pub operation_name: String,
    pub table: Option<String>,
    pub status: OperationStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub records_processed: Option<u64>,
    /// Records per second
    pub throughput: Option<f64>,
    pub error: Option<String>,
}

/// Handle for an operation started with [`RunMonitor::start`]
#[derive(Debug)]
pub struct OperationHandle {
    index: usize,
    started: Instant,
}

/// Collects operation metrics for a single mirror run
#[derive(Debug, Clone)]
pub struct RunMonitor {
    run_id: Uuid,
    operations: Vec<OperationMetric>,
}

impl RunMonitor {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            operations: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Start tracking an operation, optionally scoped to one table
    pub fn start(&mut self, operation_name: &str, table: Option<&str>) -> OperationHandle {
        let operation_id = Uuid::new_v4().to_string();
        self.operations.push(OperationMetric {
            operation_id,
            operation_name: operation_name.to_string(),
            table: table.map(str::to_string),
            status: OperationStatus::InProgress,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            records_processed: None,
            throughput: None,
            error: None,
        });

        OperationHandle {
            index: self.operations.len() - 1,
            started: Instant::now(),
        }
    }

    pub fn complete(&mut self, handle: OperationHandle, records_processed: Option<u64>) {
        let duration_ms = handle.started.elapsed().as_millis() as u64;
        let metric = &mut self.operations[handle.index];
        metric.status = OperationStatus::Completed;
        metric.end_time = Some(Utc::now());
        metric.duration_ms = Some(duration_ms);
        metric.records_processed = records_processed;

        if let Some(records) = records_processed {
            if duration_ms > 0 {
                metric.throughput = Some(records as f64 / (duration_ms as f64 / 1000.0));
            }
        }

        info!(
            run_id = %self.run_id,
            operation_id = %metric.operation_id,
            operation_name = %metric.operation_name,
            table = ?metric.table,
            duration_ms = duration_ms,
            records = ?records_processed,
            "Operation completed"
        );
    }

    pub fn fail(&mut self, handle: OperationHandle, error_message: &str) {
        let duration_ms = handle.started.elapsed().as_millis() as u64;
        let metric = &mut self.operations[handle.index];
        metric.status = OperationStatus::Failed;
        metric.end_time = Some(Utc::now());
        metric.duration_ms = Some(duration_ms);
        metric.error = Some(error_message.to_string());

        error!(
            run_id = %self.run_id,
            operation_id = %metric.operation_id,
            operation_name = %metric.operation_name,
            table = ?metric.table,
            duration_ms = duration_ms,
            error = error_message,
            "Operation failed"
        );
    }

    pub fn operations(&self) -> &[OperationMetric] {
        &self.operations
    }

    pub fn failed_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status == OperationStatus::Failed)
            .count()
    }
}

impl Default for RunMonitor {
    fn default() -> Self {
        Self::new()
    }
}

// Mirror orchestrator: drives one end-to-end run from source snapshot to populated target
pub mod report;
pub mod state;


use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{MirrorError, MirrorResult};
use crate::monitoring::RunMonitor;
use crate::schema_translator::{translate, SqliteDialect, TargetDialect, TargetSchema};
use crate::source::SourceReader;
use crate::synchronizer::TableSynchronizer;
use crate::target::{TargetFactory, TargetStorage};
use crate::types::{FailurePolicy, MirrorPlan, TableSnapshot};

pub use report::{MirrorReport, TableFailure, TableReport};
pub use state::RunState;

/// Runs a [`MirrorPlan`] against one source and one target store.
///
/// A run goes through the target, snapshot, schema and synchronization
/// phases in that order. The source is dropped as soon as every table has
/// been read; the target connection is dropped when the run ends.
pub struct MirrorOrchestrator<S, F> {
    plan: MirrorPlan,
    source: Option<S>,
    factory: F,
    dialect: Box<dyn TargetDialect>,
    synchronizer: TableSynchronizer,
    monitor: RunMonitor,
    state: RunState,
}

impl<S, F> MirrorOrchestrator<S, F>
where
    S: SourceReader,
    F: TargetFactory,
{
    pub fn new(plan: MirrorPlan, source: S, factory: F) -> Self {
        let synchronizer = TableSynchronizer::new().with_verification(plan.verify());
        Self {
            plan,
            source: Some(source),
            factory,
            dialect: Box::new(SqliteDialect::new()),
            synchronizer,
            monitor: RunMonitor::new(),
            state: RunState::NotStarted,
        }
    }

    pub fn with_dialect(mut self, dialect: Box<dyn TargetDialect>) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn plan(&self) -> &MirrorPlan {
        &self.plan
    }

    pub fn monitor(&self) -> &RunMonitor {
        &self.monitor
    }

    /// Execute the run. An orchestrator runs at most once.
    pub async fn run(&mut self) -> MirrorResult<MirrorReport> {
        if self.state != RunState::NotStarted {
            return Err(MirrorError::configuration(format!(
                "this run has already been executed (state: {})",
                self.state
            )));
        }

        info!(
            run_id = %self.monitor.run_id(),
            tables = self.plan.tables().len(),
            destination = %self.factory.location(),
            "Starting mirror run"
        );

        match self.execute().await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(run_id = %self.monitor.run_id(), state = %self.state, error = %e, "Mirror run failed");
                self.transition(RunState::Failed {
                    stage: e.stage().to_string(),
                    table: e.table().map(str::to_string),
                });
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> MirrorResult<MirrorReport> {
        let started_at = Utc::now();

        let handle = self.monitor.start("create_target", None);
        let mut target = match self.factory.create_empty() {
            Ok(target) => {
                self.monitor.complete(handle, None);
                target
            }
            Err(e) => {
                self.monitor.fail(handle, &e.to_string());
                return Err(e);
            }
        };
        self.transition(RunState::TargetReady);

        let (source_description, snapshots) = self.take_snapshots().await?;
        self.transition(RunState::SnapshotTaken);

        let schema = self.create_schema(&mut target, &snapshots)?;
        self.transition(RunState::SchemaCreated);

        let mut tables = Vec::with_capacity(snapshots.len());
        let mut failures = Vec::new();
        let filter = self.plan.filter().clone();

        for (index, snapshot) in snapshots.iter().enumerate() {
            self.transition(RunState::Synchronizing {
                index,
                table: snapshot.name().to_string(),
            });

            let projected = snapshot.project(&filter);
            let columns = match schema.table(projected.name()) {
                Some(ddl) => ddl.columns.clone(),
                None => projected.column_names(),
            };

            let handle = self.monitor.start("synchronize", Some(projected.name()));
            match self
                .synchronizer
                .synchronize(&mut target, projected.name(), &columns, projected.rows())
            {
                Ok(outcome) => {
                    self.monitor.complete(handle, Some(outcome.rows_inserted));
                    tables.push(TableReport::from_outcome(outcome, columns.len()));
                }
                Err(e) => {
                    self.monitor.fail(handle, &e.to_string());
                    match self.plan.failure_policy() {
                        FailurePolicy::FailFast => return Err(e),
                        FailurePolicy::ContinueOnError => {
                            warn!(table = %projected.name(), error = %e, "Table failed; continuing with the next table");
                            failures.push(TableFailure::from_error(projected.name(), &e));
                        }
                    }
                }
            }
        }

        let destination = target.location();
        drop(target);
        debug!("Target connection released");
        self.transition(RunState::Completed);

        let report = MirrorReport {
            run_id: self.monitor.run_id(),
            source: source_description,
            destination,
            started_at,
            finished_at: Utc::now(),
            tables,
            failures,
            operations: self.monitor.operations().to_vec(),
        };

        info!(
            run_id = %report.run_id,
            tables = report.tables_mirrored(),
            failed = report.failures.len(),
            rows = report.total_rows(),
            "Mirror run completed"
        );
        Ok(report)
    }

    /// Read every requested table, in request order, then release the source
    async fn take_snapshots(&mut self) -> MirrorResult<(String, Vec<TableSnapshot>)> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| MirrorError::configuration("source has already been released"))?;
        let description = source.describe();
        let tables = self.plan.tables().to_vec();

        let mut snapshots = Vec::with_capacity(tables.len());
        for table in &tables {
            let handle = self.monitor.start("read_table", Some(table));
            match source.read_table(table).await {
                Ok(snapshot) => {
                    self.monitor.complete(handle, Some(snapshot.rows().len() as u64));
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    self.monitor.fail(handle, &e.to_string());
                    return Err(e);
                }
            }
        }

        drop(source);
        debug!(source = %description, "Source connection released");
        Ok((description, snapshots))
    }

    /// Translate the snapshots and create every table in the target, in request order
    fn create_schema(
        &mut self,
        target: &mut F::Storage,
        snapshots: &[TableSnapshot],
    ) -> MirrorResult<TargetSchema> {
        let handle = self.monitor.start("create_schema", None);
        let result = translate(snapshots, self.plan.filter(), self.dialect.as_ref()).and_then(|schema| {
            for ddl in &schema.statements {
                target.execute(&ddl.sql).map_err(|e| MirrorError::SchemaCreation {
                    table: ddl.table.clone(),
                    message: e.to_string(),
                })?;
            }
            Ok(schema)
        });

        match result {
            Ok(schema) => {
                self.monitor.complete(handle, Some(schema.len() as u64));
                Ok(schema)
            }
            Err(e) => {
                self.monitor.fail(handle, &e.to_string());
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(&next),
            "invalid run state transition: {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Run state changed");
        self.state = next;
    }
}

/// Read the requested tables and translate them without touching any target store
pub async fn generate_schema<S: SourceReader>(
    source: &mut S,
    plan: &MirrorPlan,
    dialect: &dyn TargetDialect,
) -> MirrorResult<TargetSchema> {
    let mut snapshots = Vec::with_capacity(plan.tables().len());
    for table in plan.tables() {
        snapshots.push(source.read_table(table).await?);
    }
    translate(&snapshots, plan.filter(), dialect)
}

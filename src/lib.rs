pub mod config;
pub mod error;
pub mod monitoring;
pub mod orchestrator;
pub mod schema_translator;
pub mod source;
pub mod synchronizer;
pub mod target;
pub mod types;

pub use config::{ConfigOverrides, MirrorConfig, SourceKind};
pub use error::{MirrorError, MirrorResult};
pub use orchestrator::{generate_schema, MirrorOrchestrator, MirrorReport, RunState};
pub use types::{ColumnDescriptor, FailurePolicy, MirrorPlan, SourceType, SqlValue, TableSnapshot};

use thiserror::Error;

use crate::synchronizer::SyncStage;

/// Main error type for the MirrorDB system
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Cannot create target store at {location}: {message}")]
    TargetCreation { location: String, message: String },

    #[error("Source read error{}: {message}", table_suffix(.table))]
    SourceRead { table: Option<String>, message: String },

    #[error("Schema translation error for table {table}: {message}")]
    SchemaTranslation { table: String, message: String },

    #[error("Schema creation failed for table {table}: {message}")]
    SchemaCreation { table: String, message: String },

    #[error("Synchronization of table {table} failed during {stage}: {message}")]
    Sync {
        table: String,
        stage: SyncStage,
        message: String,
    },

    #[error("Verification of table {table} failed: expected {expected} rows, found {actual}")]
    Verification {
        table: String,
        expected: u64,
        actual: u64,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn table_suffix(table: &Option<String>) -> String {
    match table {
        Some(table) => format!(" for table {}", table),
        None => String::new(),
    }
}

impl MirrorError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    pub fn target_creation(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TargetCreation {
            location: location.into(),
            message: message.into(),
        }
    }

    pub fn source_read(table: Option<&str>, message: impl Into<String>) -> Self {
        Self::SourceRead {
            table: table.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn schema_translation(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaTranslation {
            table: table.into(),
            message: message.into(),
        }
    }

    pub fn sync(table: impl Into<String>, stage: SyncStage, message: impl Into<String>) -> Self {
        Self::Sync {
            table: table.into(),
            stage,
            message: message.into(),
        }
    }

    /// Name of the run stage this error belongs to, for reports and logs
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::TargetCreation { .. } => "target creation",
            Self::SourceRead { .. } | Self::Postgres(_) => "source read",
            Self::SchemaTranslation { .. } => "schema translation",
            Self::SchemaCreation { .. } => "schema creation",
            Self::Sync { .. } => "synchronization",
            Self::Verification { .. } => "verification",
            Self::Sqlite(_) => "target",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Table the error relates to, when known
    pub fn table(&self) -> Option<&str> {
        match self {
            Self::SourceRead { table, .. } => table.as_deref(),
            Self::SchemaTranslation { table, .. }
            | Self::SchemaCreation { table, .. }
            | Self::Sync { table, .. }
            | Self::Verification { table, .. } => Some(table),
            _ => None,
        }
    }
}

pub type MirrorResult<T> = Result<T, MirrorError>;

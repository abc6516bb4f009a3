// Run configuration: a JSON file plus command-line overrides
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{MirrorError, MirrorResult};
use crate::schema_translator::SqliteDialect;
use crate::source::PostgresSourceConfig;
use crate::target::SqliteTargetFactory;
use crate::types::{FailurePolicy, MirrorPlan};

/// Where the tables are read from; exactly one field must be set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// PostgreSQL connection string
    pub postgres_url: Option<String>,
    /// JSON snapshot file, for offline runs
    pub snapshot_file: Option<PathBuf>,
}

/// Resolved source selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    Postgres(PostgresSourceConfig),
    SnapshotFile(PathBuf),
}

/// Complete settings for a mirror run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub source: SourceSettings,
    /// Path of the SQLite file to create
    pub destination: Option<PathBuf>,
    pub tables: Vec<String>,
    pub ignored_columns: Vec<String>,
    /// Replace an existing file at the destination
    pub overwrite: bool,
    pub failure_policy: FailurePolicy,
    /// Re-count each table after it is committed
    pub verify: bool,
    /// Emit `IDENTITY(seed,step)` annotations for auto-increment columns
    pub identity_annotations: bool,
    /// Declare decimal columns as `text` so SQLite keeps the exact digits
    pub decimal_as_text: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            source: SourceSettings::default(),
            destination: None,
            tables: Vec::new(),
            ignored_columns: Vec::new(),
            overwrite: true,
            failure_policy: FailurePolicy::FailFast,
            verify: false,
            identity_annotations: true,
            decimal_as_text: false,
        }
    }
}

/// Values given on the command line; set values win over the config file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub source_url: Option<String>,
    pub source_snapshot: Option<PathBuf>,
    pub destination: Option<PathBuf>,
    pub tables: Vec<String>,
    pub ignored_columns: Vec<String>,
    pub no_overwrite: bool,
    pub continue_on_error: bool,
    pub verify: bool,
    pub no_identity: bool,
    pub decimal_as_text: bool,
}

impl MirrorConfig {
    pub fn from_file(path: impl AsRef<Path>) -> MirrorResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            MirrorError::configuration(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_json_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> MirrorResult<Self> {
        serde_json::from_str(content).map_err(|e| MirrorError::configuration(format!("invalid config file: {}", e)))
    }

    /// Start from the file at `path` if given, defaults otherwise, then apply `overrides`
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> MirrorResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        // A source given on the command line replaces the file's source entirely
        if overrides.source_url.is_some() || overrides.source_snapshot.is_some() {
            self.source = SourceSettings {
                postgres_url: overrides.source_url,
                snapshot_file: overrides.source_snapshot,
            };
        }
        if overrides.destination.is_some() {
            self.destination = overrides.destination;
        }
        if !overrides.tables.is_empty() {
            self.tables = overrides.tables;
        }
        if !overrides.ignored_columns.is_empty() {
            self.ignored_columns = overrides.ignored_columns;
        }
        if overrides.no_overwrite {
            self.overwrite = false;
        }
        if overrides.continue_on_error {
            self.failure_policy = FailurePolicy::ContinueOnError;
        }
        if overrides.verify {
            self.verify = true;
        }
        if overrides.no_identity {
            self.identity_annotations = false;
        }
        if overrides.decimal_as_text {
            self.decimal_as_text = true;
        }
    }

    /// Check everything a mirror run needs
    pub fn validate(&self) -> MirrorResult<()> {
        self.source_kind()?;
        self.plan()?;
        self.target_factory()?;
        Ok(())
    }

    pub fn source_kind(&self) -> MirrorResult<SourceKind> {
        match (&self.source.postgres_url, &self.source.snapshot_file) {
            (Some(url), None) if !url.trim().is_empty() => Ok(SourceKind::Postgres(PostgresSourceConfig {
                url: url.clone(),
            })),
            (None, Some(path)) => Ok(SourceKind::SnapshotFile(path.clone())),
            (Some(_), Some(_)) => Err(MirrorError::configuration(
                "both a PostgreSQL URL and a snapshot file are configured; choose one source",
            )),
            _ => Err(MirrorError::configuration(
                "no source configured; set a PostgreSQL URL or a snapshot file",
            )),
        }
    }

    pub fn plan(&self) -> MirrorResult<MirrorPlan> {
        Ok(MirrorPlan::new(self.tables.clone(), self.ignored_columns.iter().cloned())?
            .with_failure_policy(self.failure_policy)
            .with_verification(self.verify))
    }

    pub fn dialect(&self) -> SqliteDialect {
        SqliteDialect::new()
            .with_identity_annotations(self.identity_annotations)
            .with_decimal_as_text(self.decimal_as_text)
    }

    pub fn target_factory(&self) -> MirrorResult<SqliteTargetFactory> {
        match &self.destination {
            Some(path) if !path.as_os_str().is_empty() => {
                Ok(SqliteTargetFactory::new(path.clone()).with_overwrite(self.overwrite))
            }
            _ => Err(MirrorError::configuration("no destination file configured")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_translator::TargetDialect;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn snapshot_overrides() -> ConfigOverrides {
        ConfigOverrides {
            source_snapshot: Some(PathBuf::from("snapshot.json")),
            destination: Some(PathBuf::from("mirror.db")),
            tables: vec!["USERS".into()],
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = MirrorConfig::default();
        assert!(config.overwrite);
        assert!(config.identity_annotations);
        assert_eq!(config.failure_policy, FailurePolicy::FailFast);
        assert!(!config.verify);
        assert!(!config.decimal_as_text);
        assert_eq!(config.dialect().decimal_type(), "decimal");
    }

    #[test]
    fn test_decimal_as_text_from_file_or_flag() {
        let from_file = MirrorConfig::from_json_str(r#"{"decimal_as_text": true}"#).unwrap();
        assert_eq!(from_file.dialect().decimal_type(), "text");

        let mut from_flag = MirrorConfig::default();
        from_flag.apply_overrides(ConfigOverrides {
            decimal_as_text: true,
            ..snapshot_overrides()
        });
        assert!(from_flag.decimal_as_text);
        assert_eq!(from_flag.dialect().decimal_type(), "text");
    }

    #[test]
    fn test_load_file_and_override() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "source": {{"postgres_url": "postgresql://localhost/app"}},
                "destination": "file.db",
                "tables": ["USERS", "ORDERS"],
                "ignored_columns": ["PASSWORD"],
                "failure_policy": "continue_on_error"
            }}"#
        )
        .unwrap();

        let overrides = ConfigOverrides {
            destination: Some(PathBuf::from("cli.db")),
            verify: true,
            ..Default::default()
        };
        let config = MirrorConfig::load(Some(file.path()), overrides).unwrap();

        assert_eq!(config.destination, Some(PathBuf::from("cli.db")));
        assert_eq!(config.tables, vec!["USERS", "ORDERS"]);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueOnError);
        assert!(config.verify);
        assert_eq!(
            config.source_kind().unwrap(),
            SourceKind::Postgres(PostgresSourceConfig {
                url: "postgresql://localhost/app".into()
            })
        );
        assert!(config.plan().unwrap().filter().is_ignored("PASSWORD"));
    }

    #[test]
    fn test_cli_source_replaces_file_source() {
        let mut config = MirrorConfig::from_json_str(r#"{"source": {"postgres_url": "postgresql://db/app"}}"#).unwrap();
        config.apply_overrides(snapshot_overrides());

        assert_eq!(
            config.source_kind().unwrap(),
            SourceKind::SnapshotFile(PathBuf::from("snapshot.json"))
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_errors() {
        let missing_source = MirrorConfig {
            tables: vec!["USERS".into()],
            destination: Some(PathBuf::from("mirror.db")),
            ..Default::default()
        };
        assert!(matches!(missing_source.validate(), Err(MirrorError::Configuration { .. })));

        let mut no_tables = MirrorConfig::default();
        no_tables.apply_overrides(ConfigOverrides {
            tables: vec![],
            ..snapshot_overrides()
        });
        assert!(no_tables.validate().unwrap_err().to_string().contains("no tables requested"));

        let mut duplicate = MirrorConfig::default();
        duplicate.apply_overrides(ConfigOverrides {
            tables: vec!["USERS".into(), "USERS".into()],
            ..snapshot_overrides()
        });
        assert!(duplicate.validate().is_err());

        let mut no_destination = MirrorConfig::default();
        no_destination.apply_overrides(ConfigOverrides {
            destination: None,
            ..snapshot_overrides()
        });
        assert!(no_destination.validate().unwrap_err().to_string().contains("destination"));
    }

    #[test]
    fn test_unknown_json_is_rejected() {
        let err = MirrorConfig::from_json_str("{\"tables\": 3}").unwrap_err();
        assert!(matches!(err, MirrorError::Configuration { .. }));
    }
}

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use mirrordb::config::{ConfigOverrides, MirrorConfig, SourceKind};
use mirrordb::error::MirrorError;
use mirrordb::orchestrator::{MirrorOrchestrator, RunState};
use mirrordb::source::InMemorySource;
use mirrordb::target::{SqliteTarget, TargetStorage};
use mirrordb::types::SqlValue;

const SNAPSHOT: &str = r#"{
    "tables": [
        {
            "name": "USERS",
            "columns": [
                {"name": "ID", "source_type": "Int32", "nullable": false,
                 "is_auto_increment": true, "auto_increment_seed": 1, "auto_increment_step": 1},
                {"name": "NAME", "source_type": "Text", "max_length": 50}
            ],
            "rows": [[1, "Ann"], [2, "Bo"]]
        },
        {
            "name": "ORDERS",
            "columns": [
                {"name": "ID", "source_type": "Int64", "nullable": false},
                {"name": "USER_ID", "source_type": "Int32", "nullable": false},
                {"name": "TOTAL", "source_type": "Decimal", "nullable": false},
                {"name": "PLACED_AT", "source_type": "DateTime"}
            ],
            "rows": [
                [10, 1, "19.99", "2024-03-01 12:30:00"],
                [11, 2, "5.00", null]
            ]
        },
        {
            "name": "AUDIT",
            "columns": [
                {"name": "ID", "source_type": "Int32", "nullable": false},
                {"name": "NOTE", "source_type": "Text", "nullable": false}
            ],
            "rows": [[1, "created"], [2, null], [3, "deleted"]]
        }
    ]
}"#;

/// Test workspace holding a snapshot file and a destination path
struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("snapshot.json"), SNAPSHOT)?;
        Ok(Self { dir })
    }

    fn snapshot(&self) -> PathBuf {
        self.dir.path().join("snapshot.json")
    }

    fn destination(&self) -> PathBuf {
        self.dir.path().join("mirror.db")
    }

    fn config(&self, tables: &[&str]) -> MirrorConfig {
        let mut config = MirrorConfig::default();
        config.apply_overrides(ConfigOverrides {
            source_snapshot: Some(self.snapshot()),
            destination: Some(self.destination()),
            tables: tables.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        });
        config
    }

    fn open(&self) -> Result<SqliteTarget> {
        Ok(SqliteTarget::open(self.destination())?)
    }
}

async fn run(config: &MirrorConfig) -> Result<mirrordb::MirrorReport, MirrorError> {
    config.validate()?;
    let source = match config.source_kind()? {
        SourceKind::SnapshotFile(path) => InMemorySource::from_json_file(path)?,
        SourceKind::Postgres(_) => unreachable!("integration tests use snapshot files"),
    };
    MirrorOrchestrator::new(config.plan()?, source, config.target_factory()?)
        .with_dialect(Box::new(config.dialect()))
        .run()
        .await
}

#[tokio::test]
async fn test_end_to_end_mirror_from_snapshot_file() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let report = run(&workspace.config(&["USERS", "ORDERS"])).await?;

    assert_eq!(report.tables_mirrored(), 2);
    assert_eq!(report.total_rows(), 4);
    assert!(report.source.contains("snapshot.json"));
    assert_eq!(
        report.summary(),
        format!(
            "Imported 2 tables. You can find the sqlite file here:\n{}",
            workspace.destination().display()
        )
    );

    let mut target = workspace.open()?;
    assert_eq!(target.table_names()?, vec!["ORDERS", "USERS"]);
    assert_eq!(
        target.table_columns("ORDERS")?,
        vec![
            ("ID".to_string(), "bigint".to_string()),
            ("USER_ID".to_string(), "int".to_string()),
            ("TOTAL".to_string(), "decimal".to_string()),
            ("PLACED_AT".to_string(), "datetime".to_string()),
        ]
    );
    assert_eq!(
        target.read_rows("ORDERS")?[0],
        vec![
            SqlValue::Integer(10),
            SqlValue::Integer(1),
            // decimal columns have numeric affinity in SQLite
            SqlValue::Real(19.99),
            SqlValue::Text("2024-03-01 12:30:00".into()),
        ]
    );
    assert_eq!(target.read_rows("ORDERS")?[1][3], SqlValue::Null);

    Ok(())
}

#[tokio::test]
async fn test_decimal_as_text_keeps_exact_digits() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let mut config = workspace.config(&["ORDERS"]);
    config.apply_overrides(ConfigOverrides {
        decimal_as_text: true,
        ..Default::default()
    });

    run(&config).await?;

    let mut target = workspace.open()?;
    assert_eq!(target.table_columns("ORDERS")?[2], ("TOTAL".to_string(), "text".to_string()));
    let rows = target.read_rows("ORDERS")?;
    assert_eq!(rows[0][2], SqlValue::Text("19.99".into()));
    assert_eq!(rows[1][2], SqlValue::Text("5.00".into()));
    Ok(())
}

#[tokio::test]
async fn test_repeated_runs_produce_the_same_store() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let config = workspace.config(&["USERS"]);

    run(&config).await?;
    let first = workspace.open()?.read_rows("USERS")?;
    run(&config).await?;
    let second = workspace.open()?.read_rows("USERS")?;

    assert_eq!(first, second);
    assert_eq!(second.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_no_overwrite_keeps_existing_file() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    fs::write(workspace.destination(), b"not a database")?;

    let mut config = workspace.config(&["USERS"]);
    config.apply_overrides(ConfigOverrides {
        no_overwrite: true,
        ..Default::default()
    });

    let err = run(&config).await.unwrap_err();
    assert!(matches!(err, MirrorError::TargetCreation { .. }));
    assert_eq!(fs::read(workspace.destination())?, b"not a database");
    Ok(())
}

#[tokio::test]
async fn test_failed_table_is_rolled_back_and_stops_the_run() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let config = workspace.config(&["USERS", "AUDIT", "ORDERS"]);

    let source = InMemorySource::from_json_file(workspace.snapshot())?;
    let mut orchestrator = MirrorOrchestrator::new(config.plan()?, source, config.target_factory()?);
    let err = orchestrator.run().await.unwrap_err();

    assert_eq!(err.table(), Some("AUDIT"));
    assert!(err.to_string().contains("row 1:"), "unexpected error: {}", err);
    assert!(matches!(orchestrator.state(), RunState::Failed { .. }));

    let mut target = workspace.open()?;
    assert_eq!(target.count_rows("USERS")?, 2);
    assert_eq!(target.count_rows("AUDIT")?, 0);
    assert_eq!(target.count_rows("ORDERS")?, 0);
    Ok(())
}

#[tokio::test]
async fn test_continue_on_error_reports_failed_tables() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let mut config = workspace.config(&["USERS", "AUDIT", "ORDERS"]);
    config.apply_overrides(ConfigOverrides {
        continue_on_error: true,
        verify: true,
        ..Default::default()
    });

    let report = run(&config).await?;

    assert!(!report.is_successful());
    assert_eq!(report.tables_mirrored(), 2);
    assert_eq!(report.failures[0].table, "AUDIT");
    assert!(report.summary().contains("Failed to mirror 1 table:"));
    assert_eq!(workspace.open()?.count_rows("ORDERS")?, 2);
    Ok(())
}

#[tokio::test]
async fn test_ignored_columns_and_plain_integer_ddl() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let mut config = workspace.config(&["USERS", "ORDERS"]);
    config.apply_overrides(ConfigOverrides {
        ignored_columns: vec!["NAME".into(), "PLACED_AT".into()],
        no_identity: true,
        ..Default::default()
    });

    run(&config).await?;

    let target = workspace.open()?;
    assert_eq!(
        target.table_columns("USERS")?,
        vec![("ID".to_string(), "int".to_string())]
    );
    assert_eq!(target.table_columns("ORDERS")?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_empty_table_list_is_rejected_before_any_work() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let config = workspace.config(&[]);

    let err = run(&config).await.unwrap_err();
    assert!(matches!(err, MirrorError::Configuration { .. }));
    assert!(!workspace.destination().exists());
    Ok(())
}

fn mirrordb(args: &[&str], cwd: &Path) -> Result<std::process::Output> {
    Ok(Command::new(env!("CARGO_BIN_EXE_mirrordb"))
        .args(args)
        .current_dir(cwd)
        .output()?)
}

#[test]
fn test_cli_mirror_prints_summary() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let output = mirrordb(
        &["mirror", "--source-snapshot", "snapshot.json", "-d", "mirror.db", "-t", "USERS,ORDERS"],
        workspace.dir.path(),
    )?;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), "Imported 2 tables. You can find the sqlite file here:\nmirror.db");
    assert!(workspace.destination().exists());
    Ok(())
}

#[test]
fn test_cli_mirror_json_report_and_exit_status() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let output = mirrordb(
        &[
            "mirror",
            "--source-snapshot",
            "snapshot.json",
            "-d",
            "mirror.db",
            "-t",
            "USERS",
            "-t",
            "AUDIT",
            "--continue-on-error",
            "--format",
            "json",
        ],
        workspace.dir.path(),
    )?;

    assert_eq!(output.status.code(), Some(1));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(report["tables"][0]["name"], "USERS");
    assert_eq!(report["failures"][0]["table"], "AUDIT");
    assert_eq!(report["failures"][0]["stage"], "insert");
    Ok(())
}

#[test]
fn test_cli_schema_writes_ddl_without_a_target() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let output = mirrordb(
        &[
            "schema",
            "--source-snapshot",
            "snapshot.json",
            "-t",
            "USERS",
            "--dialect",
            "reference",
            "-o",
            "schema.sql",
        ],
        workspace.dir.path(),
    )?;

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        fs::read_to_string(workspace.dir.path().join("schema.sql"))?,
        "CREATE TABLE USERS (ID int IDENTITY(1,1) NOT NULL, NAME nvarchar(50));\n"
    );
    assert!(!workspace.destination().exists());
    Ok(())
}

#[test]
fn test_cli_rejects_missing_source() -> Result<()> {
    let workspace = TestWorkspace::new()?;
    let output = mirrordb(&["mirror", "-d", "mirror.db", "-t", "USERS"], workspace.dir.path())?;

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no source configured"));
    Ok(())
}

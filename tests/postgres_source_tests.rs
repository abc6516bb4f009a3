use anyhow::Result;
use tempfile::TempDir;
use tokio_postgres::{Client, NoTls};

use mirrordb::orchestrator::MirrorOrchestrator;
use mirrordb::source::{PostgresSource, PostgresSourceConfig, SourceReader};
use mirrordb::target::{SqliteTarget, SqliteTargetFactory, TargetStorage};
use mirrordb::types::{MirrorPlan, SourceType, SqlValue};

/// Connection string of a disposable PostgreSQL database, if one is configured
fn database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL").ok()
}

/// Creates the fixture tables in their own schema and drops them afterwards
struct TestDatabase {
    client: Client,
    schema: String,
}

impl TestDatabase {
    async fn setup(url: &str, schema: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                eprintln!("Connection error: {}", e);
            }
        });

        client
            .batch_execute(&format!(
                r#"
                DROP SCHEMA IF EXISTS {schema} CASCADE;
                CREATE SCHEMA {schema};
                CREATE TABLE {schema}."USERS" (
                    "ID" integer GENERATED BY DEFAULT AS IDENTITY (START WITH 100 INCREMENT BY 5) NOT NULL,
                    "NAME" varchar(50),
                    "BIO" text
                );
                CREATE TABLE {schema}."ORDERS" (
                    "ID" bigserial NOT NULL,
                    "QTY" smallint NOT NULL,
                    "TOTAL" numeric(10, 2) NOT NULL,
                    "PLACED_AT" timestamp
                );
                INSERT INTO {schema}."USERS" ("ID", "NAME", "BIO") VALUES (100, 'Ann', NULL), (105, 'Bo', 'writes Rust');
                INSERT INTO {schema}."ORDERS" ("QTY", "TOTAL", "PLACED_AT") VALUES (2, 19.99, '2024-03-01 12:30:00');
                "#,
                schema = schema
            ))
            .await?;

        Ok(Self {
            client,
            schema: schema.to_string(),
        })
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.\"{}\"", self.schema, table)
    }

    async fn cleanup(&self) -> Result<()> {
        self.client
            .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema))
            .await?;
        Ok(())
    }
}

#[tokio::test]
async fn test_read_table_metadata_and_rows() -> Result<()> {
    let Some(url) = database_url() else {
        println!("Skipping test - TEST_DATABASE_URL is not set");
        return Ok(());
    };
    let db = TestDatabase::setup(&url, "mirrordb_read_test").await?;

    let mut source = PostgresSource::connect(&PostgresSourceConfig { url: url.clone() }).await?;
    let users = source.read_table(&db.qualified("USERS")).await?;

    assert_eq!(users.name(), "USERS");
    let id = &users.columns()[0];
    assert_eq!(id.source_type, SourceType::Int32);
    assert!(id.is_auto_increment);
    assert!(!id.nullable);
    assert_eq!((id.auto_increment_seed, id.auto_increment_step), (100, 5));
    assert_eq!(users.columns()[1].max_length, 50);
    assert_eq!(users.columns()[2].max_length, -1);
    assert_eq!(users.rows().len(), 2);

    let orders = source.read_table(&db.qualified("ORDERS")).await?;
    assert_eq!(orders.columns()[0].source_type, SourceType::Int64);
    assert!(orders.columns()[0].is_auto_increment);
    assert_eq!(orders.columns()[1].source_type, SourceType::Int16);
    assert_eq!(orders.rows()[0][2], SqlValue::Decimal("19.99".into()));

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn test_missing_table_is_reported() -> Result<()> {
    let Some(url) = database_url() else {
        println!("Skipping test - TEST_DATABASE_URL is not set");
        return Ok(());
    };

    let mut source = PostgresSource::connect(&PostgresSourceConfig { url }).await?;
    let err = source.read_table("mirrordb_no_such_table").await.unwrap_err();
    assert_eq!(err.table(), Some("mirrordb_no_such_table"));
    Ok(())
}

#[tokio::test]
async fn test_mirror_postgres_tables_into_sqlite() -> Result<()> {
    let Some(url) = database_url() else {
        println!("Skipping test - TEST_DATABASE_URL is not set");
        return Ok(());
    };
    let db = TestDatabase::setup(&url, "mirrordb_mirror_test").await?;
    let dir = TempDir::new()?;

    let source = PostgresSource::connect(&PostgresSourceConfig { url }).await?;
    // Unquoted names fold to lower case in PostgreSQL, so the fixture names are quoted
    let plan = MirrorPlan::new(vec![db.qualified("USERS"), db.qualified("ORDERS")], ["BIO"])?;
    let factory = SqliteTargetFactory::new(dir.path().join("mirror.db"));
    let report = MirrorOrchestrator::new(plan, source, factory).run().await?;

    assert_eq!(report.tables_mirrored(), 2);

    let mut target = SqliteTarget::open(dir.path().join("mirror.db"))?;
    assert_eq!(
        target.table_columns("USERS")?,
        vec![
            ("ID".to_string(), "int IDENTITY(100,5)".to_string()),
            ("NAME".to_string(), "nvarchar(50)".to_string()),
        ]
    );
    assert_eq!(
        target.read_rows("USERS")?,
        vec![
            vec![SqlValue::Integer(100), SqlValue::Text("Ann".into())],
            vec![SqlValue::Integer(105), SqlValue::Text("Bo".into())],
        ]
    );
    assert_eq!(target.count_rows("ORDERS")?, 1);

    db.cleanup().await?;
    Ok(())
}

//! PostgreSQL source reader.
//!
//! Introspects `information_schema.columns` for column metadata, the
//! identity/serial sequence for auto-increment seed and step, and reads every
//! row with a per-type cast so values arrive in a small set of Rust types.

use chrono::NaiveDateTime;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info};

use crate::error::{MirrorError, MirrorResult};
use crate::schema_translator::quote_identifier;
use crate::source::SourceReader;
use crate::types::{ColumnDescriptor, Row, SourceType, SqlValue, TableSnapshot, UNBOUNDED_LENGTH};

/// Connection settings for the PostgreSQL source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresSourceConfig {
    /// libpq-style connection string or `postgresql://` URL
    pub url: String,
}

/// PostgreSQL source holding a single pooled connection for the run
pub struct PostgresSource {
    pool: Pool,
    description: String,
}

/// Where a requested table name resolved to in the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedTable {
    schema: String,
    relation: String,
}

impl ResolvedTable {
    fn qualified(&self) -> String {
        format!("{}.{}", quote_identifier(&self.schema), quote_identifier(&self.relation))
    }
}

impl PostgresSource {
    /// Connect to the source and check the connection with a trivial query
    pub async fn connect(config: &PostgresSourceConfig) -> MirrorResult<Self> {
        let pg_config: PgConfig = config
            .url
            .parse()
            .map_err(|e| MirrorError::source_read(None, format!("invalid connection string: {}", e)))?;

        let description = format!(
            "PostgreSQL database {}",
            pg_config.get_dbname().unwrap_or("(default)")
        );

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MirrorError::source_read(None, format!("cannot create connection pool: {}", e)))?;

        let source = Self { pool, description };
        let client = source.client(None).await?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MirrorError::source_read(None, format!("connection check failed: {}", e)))?;

        info!("Connected to {}", source.description);
        Ok(source)
    }

    async fn client(&self, table: Option<&str>) -> MirrorResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MirrorError::source_read(table, format!("cannot acquire connection: {}", e)))
    }

    async fn resolve_table(&self, client: &Object, table: &str) -> MirrorResult<ResolvedTable> {
        let query = r#"
            SELECT n.nspname::text, c.relname::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE c.oid = to_regclass($1::text)
        "#;

        let row = client
            .query_opt(query, &[&table])
            .await
            .map_err(|e| MirrorError::source_read(Some(table), e.to_string()))?
            .ok_or_else(|| MirrorError::source_read(Some(table), "table does not exist in the source"))?;

        Ok(ResolvedTable {
            schema: row.get(0),
            relation: row.get(1),
        })
    }

    async fn load_columns(
        &self,
        client: &Object,
        table: &str,
        resolved: &ResolvedTable,
    ) -> MirrorResult<Vec<ColumnDescriptor>> {
        let query = r#"
            SELECT
                column_name::text,
                udt_name::text,
                COALESCE(character_maximum_length, -1)::int4,
                is_nullable = 'YES',
                (is_identity = 'YES' OR COALESCE(column_default, '') LIKE 'nextval(%') AS is_auto_increment
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
        "#;

        let rows = client
            .query(query, &[&resolved.schema, &resolved.relation])
            .await
            .map_err(|e| MirrorError::source_read(Some(table), e.to_string()))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get(0);
            let udt_name: String = row.get(1);
            let source_type = source_type_for(&udt_name);
            let max_length = match source_type {
                SourceType::Text | SourceType::Other(_) => row.get::<_, i32>(2),
                _ => UNBOUNDED_LENGTH,
            };

            let mut column = ColumnDescriptor {
                name,
                source_type,
                max_length,
                nullable: row.get(3),
                is_auto_increment: row.get(4),
                auto_increment_seed: 1,
                auto_increment_step: 1,
            };

            if column.is_auto_increment {
                let (seed, step) = self.load_sequence(client, table, resolved, &column.name).await?;
                column.auto_increment_seed = seed;
                column.auto_increment_step = step;
            }

            columns.push(column);
        }

        debug!(table = %table, columns = columns.len(), "Loaded column metadata");
        Ok(columns)
    }

    /// Seed and step of the sequence behind an identity or serial column, (1, 1) if none is found
    async fn load_sequence(
        &self,
        client: &Object,
        table: &str,
        resolved: &ResolvedTable,
        column: &str,
    ) -> MirrorResult<(i64, i64)> {
        let query = r#"
            SELECT s.seqstart, s.seqincrement
            FROM pg_catalog.pg_sequence s
            WHERE s.seqrelid = to_regclass(pg_catalog.pg_get_serial_sequence($1::text, $2::text))
        "#;

        let row = client
            .query_opt(query, &[&resolved.qualified(), &column])
            .await
            .map_err(|e| MirrorError::source_read(Some(table), e.to_string()))?;

        Ok(row.map(|row| (row.get(0), row.get(1))).unwrap_or((1, 1)))
    }

    async fn load_rows(
        &self,
        client: &Object,
        table: &str,
        resolved: &ResolvedTable,
        columns: &[ColumnDescriptor],
    ) -> MirrorResult<Vec<Row>> {
        let query = select_rows_query(resolved, columns);
        debug!(table = %table, "Reading rows: {}", query);

        let rows = client
            .query(query.as_str(), &[])
            .await
            .map_err(|e| MirrorError::source_read(Some(table), e.to_string()))?;

        rows.iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| {
                        read_value(row, index, &column.source_type).map_err(|e| {
                            MirrorError::source_read(Some(table), format!("column {}: {}", column.name, e))
                        })
                    })
                    .collect::<MirrorResult<Row>>()
            })
            .collect()
    }
}

impl SourceReader for PostgresSource {
    async fn read_table(&mut self, table: &str) -> MirrorResult<TableSnapshot> {
        let client = self.client(Some(table)).await?;
        let resolved = self.resolve_table(&client, table).await?;
        let columns = self.load_columns(&client, table, &resolved).await?;
        let rows = self.load_rows(&client, table, &resolved, &columns).await?;

        info!(
            table = %table,
            source = %resolved.qualified(),
            columns = columns.len(),
            rows = rows.len(),
            "Read source table"
        );
        TableSnapshot::new(target_table_name(table), columns, rows)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Semantic type of a PostgreSQL column, from its `udt_name`
fn source_type_for(udt_name: &str) -> SourceType {
    match udt_name {
        "int4" => SourceType::Int32,
        "int8" => SourceType::Int64,
        "int2" => SourceType::Int16,
        "numeric" => SourceType::Decimal,
        "timestamp" | "timestamptz" | "date" => SourceType::DateTime,
        "text" | "varchar" | "bpchar" | "name" | "citext" => SourceType::Text,
        other => SourceType::Other(other.to_string()),
    }
}

/// Expression used to read a column so its value decodes into the Rust type `read_value` expects
fn select_expression(column: &ColumnDescriptor) -> String {
    let name = quote_identifier(&column.name);
    match column.source_type {
        SourceType::Int32 | SourceType::Int64 | SourceType::Int16 => name,
        SourceType::UInt8 => format!("{}::int2", name),
        SourceType::DateTime => format!("{}::timestamp", name),
        SourceType::Decimal | SourceType::Text | SourceType::Other(_) => format!("{}::text", name),
    }
}

fn select_rows_query(resolved: &ResolvedTable, columns: &[ColumnDescriptor]) -> String {
    let select_list = columns.iter().map(select_expression).collect::<Vec<_>>().join(", ");
    format!("SELECT {} FROM {}", select_list, resolved.qualified())
}

fn read_value(row: &tokio_postgres::Row, index: usize, source_type: &SourceType) -> Result<SqlValue, tokio_postgres::Error> {
    let value = match source_type {
        SourceType::Int16 | SourceType::UInt8 => row
            .try_get::<_, Option<i16>>(index)?
            .map(|v| SqlValue::Integer(i64::from(v))),
        SourceType::Int32 => row
            .try_get::<_, Option<i32>>(index)?
            .map(|v| SqlValue::Integer(i64::from(v))),
        SourceType::Int64 => row.try_get::<_, Option<i64>>(index)?.map(SqlValue::Integer),
        SourceType::Decimal => row.try_get::<_, Option<String>>(index)?.map(SqlValue::Decimal),
        SourceType::DateTime => row
            .try_get::<_, Option<NaiveDateTime>>(index)?
            .map(SqlValue::DateTime),
        SourceType::Text | SourceType::Other(_) => row.try_get::<_, Option<String>>(index)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

/// Target table name for a requested source name: the part after the last
/// dot outside double quotes, without identifier quotes
fn target_table_name(requested: &str) -> String {
    let mut in_quotes = false;
    let mut start = 0;
    for (index, c) in requested.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '.' if !in_quotes => start = index + 1,
            _ => {}
        }
    }

    let unqualified = &requested[start..];
    match unqualified.strip_prefix('"').and_then(|name| name.strip_suffix('"')) {
        Some(quoted) => quoted.replace("\"\"", "\""),
        None => unqualified.to_string(),
    }
}

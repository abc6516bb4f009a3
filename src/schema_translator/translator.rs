use crate::error::{MirrorError, MirrorResult};
use crate::schema_translator::dialect::TargetDialect;
use crate::schema_translator::identifier::render_identifier;
use crate::schema_translator::type_mapper::map_column;
use crate::types::{ColumnFilter, TableSnapshot};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

/// Generated CREATE TABLE statement for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDdl {
    /// Target table name
    pub table: String,
    /// Columns in the order they appear in the statement
    pub columns: Vec<String>,
    pub sql: String,
}

/// DDL for every table of a run, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetSchema {
    pub statements: Vec<TableDdl>,
}

impl TargetSchema {
    /// All statements as one script, separated by `;` and newlines
    pub fn to_script(&self) -> String {
        let mut script = self
            .statements
            .iter()
            .map(|ddl| ddl.sql.as_str())
            .collect::<Vec<_>>()
            .join(";\n");
        if !script.is_empty() {
            script.push_str(";\n");
        }
        script
    }

    pub fn table(&self, name: &str) -> Option<&TableDdl> {
        self.statements.iter().find(|ddl| ddl.table == name)
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for TargetSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_script())
    }
}

/// Translate table snapshots into target CREATE TABLE statements.
///
/// Ignored columns are dropped before mapping. A table left with no columns,
/// or with the same column name twice, is a translation error. SQLite compares
/// identifiers without regard to ASCII case, so duplicates are detected the
/// same way, for column names within a table and for table names across the run.
pub fn translate(
    tables: &[TableSnapshot],
    filter: &ColumnFilter,
    dialect: &dyn TargetDialect,
) -> MirrorResult<TargetSchema> {
    let mut statements = Vec::with_capacity(tables.len());
    let mut table_names = HashSet::new();

    for table in tables {
        if !table_names.insert(table.name().to_ascii_lowercase()) {
            return Err(MirrorError::schema_translation(
                table.name(),
                "the target table name is already used by another requested table",
            ));
        }

        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        let mut clauses = Vec::new();

        for column in table.columns().iter().filter(|c| !filter.is_ignored(&c.name)) {
            if !seen.insert(column.name.to_ascii_lowercase()) {
                return Err(MirrorError::schema_translation(
                    table.name(),
                    format!("column '{}' appears more than once", column.name),
                ));
            }

            let clause = map_column(column, dialect);
            clauses.push(format!("{} {}", render_identifier(&column.name), clause));
            columns.push(column.name.clone());
        }

        if clauses.is_empty() {
            return Err(MirrorError::schema_translation(
                table.name(),
                if table.columns().is_empty() {
                    "the source table has no columns".to_string()
                } else {
                    format!("all {} columns are ignored", table.columns().len())
                },
            ));
        }

        let sql = format!(
            "CREATE TABLE {} ({})",
            render_identifier(table.name()),
            clauses.join(", ")
        );
        debug!(table = %table.name(), dialect = dialect.name(), "Generated DDL: {}", sql);

        statements.push(TableDdl {
            table: table.name().to_string(),
            columns,
            sql,
        });
    }

    Ok(TargetSchema { statements })
}

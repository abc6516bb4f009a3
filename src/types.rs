use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

use crate::error::{MirrorError, MirrorResult};

/// Semantic type of a source column, independent of the source engine
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceType {
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 16-bit signed integer
    Int16,
    /// 8-bit unsigned integer
    UInt8,
    /// Arbitrary-precision decimal
    Decimal,
    /// Date and/or time
    DateTime,
    /// Character data
    Text,
    /// Any type without a dedicated mapping, carrying the native type name
    Other(String),
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Int32 => write!(f, "int32"),
            SourceType::Int64 => write!(f, "int64"),
            SourceType::Int16 => write!(f, "int16"),
            SourceType::UInt8 => write!(f, "uint8"),
            SourceType::Decimal => write!(f, "decimal"),
            SourceType::DateTime => write!(f, "datetime"),
            SourceType::Text => write!(f, "text"),
            SourceType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Metadata of one source column as read from the source catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub source_type: SourceType,
    /// Declared maximum length, -1 when unbounded
    #[serde(default = "unbounded_length")]
    pub max_length: i32,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub is_auto_increment: bool,
    #[serde(default = "default_identity_value")]
    pub auto_increment_seed: i64,
    #[serde(default = "default_identity_value")]
    pub auto_increment_step: i64,
}

pub const UNBOUNDED_LENGTH: i32 = -1;

fn unbounded_length() -> i32 {
    UNBOUNDED_LENGTH
}

fn default_nullable() -> bool {
    true
}

fn default_identity_value() -> i64 {
    1
}

impl ColumnDescriptor {
    /// Create a nullable, unbounded, non-identity column
    pub fn new(name: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            name: name.into(),
            source_type,
            max_length: UNBOUNDED_LENGTH,
            nullable: true,
            is_auto_increment: false,
            auto_increment_seed: 1,
            auto_increment_step: 1,
        }
    }

    pub fn with_max_length(mut self, max_length: i32) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn identity(mut self, seed: i64, step: i64) -> Self {
        self.is_auto_increment = true;
        self.auto_increment_seed = seed;
        self.auto_increment_step = step;
        self
    }
}

/// A single cell value read from the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    /// Exact decimal in its textual form
    Decimal(String),
    Text(String),
    DateTime(NaiveDateTime),
    Bytes(Vec<u8>),
}

/// A row aligned positionally with its table's columns
pub type Row = Vec<SqlValue>;

impl SqlValue {
    /// Convert a JSON fixture value into a cell value for a column of the given type
    pub fn from_json(value: &Value, source_type: &SourceType) -> Result<Self, String> {
        if value.is_null() {
            return Ok(SqlValue::Null);
        }

        match source_type {
            SourceType::Int32 | SourceType::Int64 | SourceType::Int16 | SourceType::UInt8 => {
                let int = value
                    .as_i64()
                    .ok_or_else(|| format!("expected an integer, found {}", value))?;
                let fits = match source_type {
                    SourceType::Int32 => i32::try_from(int).is_ok(),
                    SourceType::Int16 => i16::try_from(int).is_ok(),
                    SourceType::UInt8 => u8::try_from(int).is_ok(),
                    _ => true,
                };
                if !fits {
                    return Err(format!("integer {} out of range for {}", int, source_type));
                }
                Ok(SqlValue::Integer(int))
            }
            SourceType::Decimal => match value {
                Value::Number(number) => Ok(SqlValue::Decimal(number.to_string())),
                Value::String(text) => Ok(SqlValue::Decimal(text.clone())),
                other => Err(format!("expected a decimal, found {}", other)),
            },
            SourceType::DateTime => {
                let text = value
                    .as_str()
                    .ok_or_else(|| format!("expected a date/time string, found {}", value))?;
                parse_datetime(text)
                    .map(SqlValue::DateTime)
                    .ok_or_else(|| format!("invalid date/time '{}'", text))
            }
            SourceType::Text | SourceType::Other(_) => match value {
                Value::String(text) => Ok(SqlValue::Text(text.clone())),
                Value::Bool(flag) => Ok(SqlValue::Boolean(*flag)),
                Value::Number(number) => Ok(SqlValue::Text(number.to_string())),
                other => Ok(SqlValue::Text(other.to_string())),
            },
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.fZ"];

    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Boolean(flag) => write!(f, "{}", flag),
            SqlValue::Integer(int) => write!(f, "{}", int),
            SqlValue::Real(real) => write!(f, "{}", real),
            SqlValue::Decimal(text) | SqlValue::Text(text) => write!(f, "{}", text),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            SqlValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

/// Set of column names excluded from both the target schema and the row data
///
/// Matching is exact and case-sensitive. The same filter drives schema
/// translation and row projection so both stay aligned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnFilter {
    ignored: HashSet<String>,
}

impl ColumnFilter {
    pub fn new<I, S>(ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, column: &str) -> bool {
        self.ignored.contains(column)
    }

    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty()
    }

    /// Positions of the columns that survive filtering, in source order
    pub fn retained_positions(&self, columns: &[ColumnDescriptor]) -> Vec<usize> {
        columns
            .iter()
            .enumerate()
            .filter(|(_, column)| !self.is_ignored(&column.name))
            .map(|(index, _)| index)
            .collect()
    }
}

/// In-memory capture of one table's schema and rows at read time
#[derive(Debug, Clone, PartialEq)]
pub struct TableSnapshot {
    name: String,
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Row>,
}

impl TableSnapshot {
    /// Build a snapshot, rejecting rows whose arity differs from the column count
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>, rows: Vec<Row>) -> MirrorResult<Self> {
        let name = name.into();

        if let Some((index, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != columns.len()) {
            return Err(MirrorError::source_read(
                Some(&name),
                format!(
                    "row {} has {} values but the table has {} columns",
                    index,
                    row.len(),
                    columns.len()
                ),
            ));
        }

        Ok(Self { name, columns, rows })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.clone()).collect()
    }

    /// Remove ignored columns from both the column list and every row, positionally
    pub fn project(&self, filter: &ColumnFilter) -> TableSnapshot {
        if filter.is_empty() {
            return self.clone();
        }

        let positions = filter.retained_positions(&self.columns);
        let columns = positions.iter().map(|&index| self.columns[index].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| positions.iter().map(|&index| row[index].clone()).collect())
            .collect();

        TableSnapshot {
            name: self.name.clone(),
            columns,
            rows,
        }
    }
}

/// What a failed table synchronization does to the rest of the run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run at the first table that fails
    #[default]
    FailFast,
    /// Roll back the failed table, record it, and carry on with the next one
    ContinueOnError,
}

/// Materialized request for one mirror run
#[derive(Debug, Clone)]
pub struct MirrorPlan {
    tables: Vec<String>,
    filter: ColumnFilter,
    failure_policy: FailurePolicy,
    verify: bool,
}

impl MirrorPlan {
    /// Build a plan, rejecting an empty or duplicated table list
    pub fn new<I, S>(tables: Vec<String>, ignored_columns: I) -> MirrorResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if tables.is_empty() {
            return Err(MirrorError::configuration(
                "no tables requested; list at least one table to mirror",
            ));
        }

        let mut seen = HashSet::new();
        for table in &tables {
            if table.trim().is_empty() {
                return Err(MirrorError::configuration("table names must not be empty"));
            }
            if !seen.insert(table.as_str()) {
                return Err(MirrorError::configuration(format!(
                    "table '{}' is requested more than once",
                    table
                )));
            }
        }

        Ok(Self {
            tables,
            filter: ColumnFilter::new(ignored_columns),
            failure_policy: FailurePolicy::default(),
            verify: false,
        })
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn tables(&self) -> &[String] {
        &self.tables
    }

    pub fn filter(&self) -> &ColumnFilter {
        &self.filter
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn verify(&self) -> bool {
        self.verify
    }
}

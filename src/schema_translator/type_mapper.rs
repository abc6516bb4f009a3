use crate::schema_translator::dialect::TargetDialect;
use crate::types::{ColumnDescriptor, SourceType, UNBOUNDED_LENGTH};
use std::fmt;

/// Target column type before suffixes are applied
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BaseType {
    Int,
    BigInt,
    SmallInt,
    TinyInt,
    Decimal,
    DateTime,
    /// `nvarchar(n)`, or unbounded when `None`
    NVarchar(Option<i32>),
}

/// Structured target column clause: base type, optional identity, nullability
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnClause {
    pub base: BaseType,
    /// `(seed, step)` when the column is auto-increment and the dialect allows identity
    pub identity: Option<(i64, i64)>,
    pub not_null: bool,
    unbounded_text: String,
    decimal_type: String,
}

/// Map source column metadata to a target column clause.
///
/// Total: every source type maps to something, unrecognized types degrade
/// to a text column. Identity comes before NOT NULL.
pub fn map_column(column: &ColumnDescriptor, dialect: &dyn TargetDialect) -> ColumnClause {
    let base = match &column.source_type {
        SourceType::Int32 => BaseType::Int,
        SourceType::Int64 => BaseType::BigInt,
        SourceType::Int16 => BaseType::SmallInt,
        SourceType::UInt8 => BaseType::TinyInt,
        SourceType::Decimal => BaseType::Decimal,
        SourceType::DateTime => BaseType::DateTime,
        SourceType::Text | SourceType::Other(_) => {
            if column.max_length == UNBOUNDED_LENGTH {
                BaseType::NVarchar(None)
            } else {
                BaseType::NVarchar(Some(column.max_length))
            }
        }
    };

    let identity = (column.is_auto_increment && dialect.supports_identity())
        .then_some((column.auto_increment_seed, column.auto_increment_step));

    ColumnClause {
        base,
        identity,
        not_null: !column.nullable,
        unbounded_text: dialect.unbounded_text().to_string(),
        decimal_type: dialect.decimal_type().to_string(),
    }
}

impl BaseType {
    fn to_sql(&self, unbounded_text: &str, decimal_type: &str) -> String {
        match self {
            BaseType::Int => "int".to_string(),
            BaseType::BigInt => "bigint".to_string(),
            BaseType::SmallInt => "smallint".to_string(),
            BaseType::TinyInt => "tinyint".to_string(),
            BaseType::Decimal => decimal_type.to_string(),
            BaseType::DateTime => "datetime".to_string(),
            BaseType::NVarchar(Some(len)) => format!("nvarchar({})", len),
            BaseType::NVarchar(None) => unbounded_text.to_string(),
        }
    }
}

impl ColumnClause {
    pub fn to_sql(&self) -> String {
        let mut sql = self.base.to_sql(&self.unbounded_text, &self.decimal_type);

        if let Some((seed, step)) = self.identity {
            sql.push_str(&format!(" IDENTITY({},{})", seed, step));
        }

        if self.not_null {
            sql.push_str(" NOT NULL");
        }

        sql
    }
}

impl fmt::Display for ColumnClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

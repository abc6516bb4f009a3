/// Capabilities of the target SQL dialect that affect column DDL
pub trait TargetDialect {
    /// Whether identity specifications may be emitted for auto-increment columns
    fn supports_identity(&self) -> bool;

    /// Spelling of an unbounded text column
    fn unbounded_text(&self) -> &str;

    /// Declared type of a decimal column
    fn decimal_type(&self) -> &str {
        "decimal"
    }

    fn name(&self) -> &str;
}

/// Renders clauses exactly as the classic mapping table spells them,
/// including `nvarchar(max)` and unconditional identity suffixes
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceDialect;

impl TargetDialect for ReferenceDialect {
    fn supports_identity(&self) -> bool {
        true
    }

    fn unbounded_text(&self) -> &str {
        "nvarchar(max)"
    }

    fn name(&self) -> &str {
        "reference"
    }
}

/// SQLite accepts arbitrary declared type names, so `int IDENTITY(1,1)` is kept
/// as an annotation, but a non-numeric length such as `nvarchar(max)` is a
/// syntax error and unbounded text is declared without a length.
///
/// A `decimal` column has NUMERIC affinity, so SQLite turns `5.00` into the
/// integer 5 and rounds values past 15 significant digits. With decimal-as-text
/// the column is declared `text` and the source digits are kept verbatim.
#[derive(Debug, Clone, Copy)]
pub struct SqliteDialect {
    identity_annotations: bool,
    decimal_as_text: bool,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            identity_annotations: true,
            decimal_as_text: false,
        }
    }

    pub fn with_identity_annotations(mut self, enabled: bool) -> Self {
        self.identity_annotations = enabled;
        self
    }

    pub fn with_decimal_as_text(mut self, enabled: bool) -> Self {
        self.decimal_as_text = enabled;
        self
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetDialect for SqliteDialect {
    fn supports_identity(&self) -> bool {
        self.identity_annotations
    }

    fn unbounded_text(&self) -> &str {
        "nvarchar"
    }

    fn decimal_type(&self) -> &str {
        if self.decimal_as_text {
            "text"
        } else {
            "decimal"
        }
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

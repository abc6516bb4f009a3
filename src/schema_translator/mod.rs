// Schema translator module: source column metadata to target DDL
pub mod dialect;
pub mod identifier;
pub mod translator;
pub mod type_mapper;


pub use dialect::{ReferenceDialect, SqliteDialect, TargetDialect};
pub use identifier::{quote_identifier, render_identifier};
pub use translator::{translate, TableDdl, TargetSchema};
pub use type_mapper::{map_column, BaseType, ColumnClause};

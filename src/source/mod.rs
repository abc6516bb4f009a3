// Source readers: where table snapshots come from
pub mod memory;
pub mod postgres;

use crate::error::MirrorResult;
use crate::types::TableSnapshot;

pub use memory::InMemorySource;
pub use postgres::{PostgresSource, PostgresSourceConfig};

/// Reads full table snapshots from the source database.
///
/// Column order must be stable across calls within one run. Dropping the
/// reader releases its connection.
pub trait SourceReader {
    /// Read one table's column metadata and all of its rows
    async fn read_table(&mut self, table: &str) -> MirrorResult<TableSnapshot>;

    /// Short description of the source for logs and reports
    fn describe(&self) -> String;
}

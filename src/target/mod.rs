// Target storage: the embedded database the mirror is written into
pub mod sqlite;

use crate::error::MirrorResult;
use crate::types::{Row, SqlValue};

pub use sqlite::{SqliteTarget, SqliteTargetFactory, SqliteTransaction};

/// Creates an empty target store for a run
pub trait TargetFactory {
    type Storage: TargetStorage;

    /// Human-readable location of the store the factory creates
    fn location(&self) -> String;

    /// Create (or recreate) an empty store and open a connection to it
    fn create_empty(&self) -> MirrorResult<Self::Storage>;
}

/// An open connection to the target store
pub trait TargetStorage {
    type Transaction<'a>: TargetTransaction
    where
        Self: 'a;

    fn location(&self) -> String;

    /// Execute one DDL or DML statement outside any explicit transaction
    fn execute(&mut self, sql: &str) -> MirrorResult<()>;

    fn begin(&mut self) -> MirrorResult<Self::Transaction<'_>>;

    fn count_rows(&mut self, table: &str) -> MirrorResult<u64>;

    /// Current contents of a table, in storage order
    fn read_rows(&mut self, table: &str) -> MirrorResult<Vec<Row>>;
}

/// A transaction on the target store; dropping it without commit rolls back
pub trait TargetTransaction {
    fn count_rows(&mut self, table: &str) -> MirrorResult<u64>;

    /// Delete every row of the table, returning how many were removed
    fn delete_all(&mut self, table: &str) -> MirrorResult<u64>;

    fn insert_row(&mut self, table: &str, columns: &[String], values: &[SqlValue]) -> MirrorResult<()>;

    fn commit(self) -> MirrorResult<()>;

    fn rollback(self) -> MirrorResult<()>;
}

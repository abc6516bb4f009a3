//! SQLite target storage backed by rusqlite

use rusqlite::types::{ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags, ToSql, Transaction};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{MirrorError, MirrorResult};
use crate::schema_translator::quote_identifier;
use crate::target::{TargetFactory, TargetStorage, TargetTransaction};
use crate::types::{Row, SqlValue};

/// Files SQLite may keep next to the database
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Creates a fresh SQLite file for every run
#[derive(Debug, Clone)]
pub struct SqliteTargetFactory {
    path: PathBuf,
    overwrite: bool,
}

impl SqliteTargetFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            overwrite: true,
        }
    }

    /// Whether an existing file at the destination may be replaced
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn remove_existing(&self) -> MirrorResult<()> {
        let location = self.location();

        if self.path.is_dir() {
            return Err(MirrorError::target_creation(location, "destination is a directory"));
        }

        if self.path.exists() {
            if !self.overwrite {
                return Err(MirrorError::target_creation(
                    location,
                    "file already exists and overwriting is disabled",
                ));
            }
            info!(path = %location, "Removing existing target database");
            fs::remove_file(&self.path)
                .map_err(|e| MirrorError::target_creation(&location, format!("cannot remove existing file: {}", e)))?;
        }

        for suffix in SIDECAR_SUFFIXES {
            let mut sidecar = self.path.clone().into_os_string();
            sidecar.push(suffix);
            match fs::remove_file(&sidecar) {
                Ok(()) => debug!(file = ?sidecar, "Removed stale SQLite sidecar file"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(MirrorError::target_creation(
                        &location,
                        format!("cannot remove {:?}: {}", sidecar, e),
                    ))
                }
            }
        }

        Ok(())
    }
}

impl TargetFactory for SqliteTargetFactory {
    type Storage = SqliteTarget;

    fn location(&self) -> String {
        self.path.display().to_string()
    }

    fn create_empty(&self) -> MirrorResult<SqliteTarget> {
        let location = self.location();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(MirrorError::target_creation(
                    location,
                    format!("parent directory {} does not exist", parent.display()),
                ));
            }
        }

        self.remove_existing()?;

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| MirrorError::target_creation(&location, e.to_string()))?;

        // Force the file onto disk now so an unwritable destination fails here
        conn.execute_batch("PRAGMA user_version = 0;")
            .map_err(|e| MirrorError::target_creation(&location, e.to_string()))?;

        info!(path = %location, "Created empty SQLite target");
        Ok(SqliteTarget { conn, location })
    }
}

/// Open connection to a SQLite target database
pub struct SqliteTarget {
    conn: Connection,
    location: String,
}

impl SqliteTarget {
    /// Open an existing database without recreating it
    pub fn open(path: impl AsRef<Path>) -> MirrorResult<Self> {
        let path = path.as_ref();
        let location = path.display().to_string();
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX)
            .map_err(|e| MirrorError::target_creation(&location, e.to_string()))?;
        Ok(Self { conn, location })
    }

    pub fn in_memory() -> MirrorResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MirrorError::target_creation(":memory:", e.to_string()))?;
        Ok(Self {
            conn,
            location: ":memory:".to_string(),
        })
    }

    /// Names of the user tables in the database, sorted
    pub fn table_names(&self) -> MirrorResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Column names and declared types of a table, in table order
    pub fn table_columns(&self, table: &str) -> MirrorResult<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
        let columns = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}

impl TargetStorage for SqliteTarget {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn location(&self) -> String {
        self.location.clone()
    }

    fn execute(&mut self, sql: &str) -> MirrorResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    fn begin(&mut self) -> MirrorResult<SqliteTransaction<'_>> {
        let tx = self.conn.transaction()?;
        Ok(SqliteTransaction { tx })
    }

    fn count_rows(&mut self, table: &str) -> MirrorResult<u64> {
        count_rows(&self.conn, table)
    }

    fn read_rows(&mut self, table: &str) -> MirrorResult<Vec<Row>> {
        let mut stmt = self.conn.prepare(&format!("SELECT * FROM {}", quote_identifier(table)))?;
        let column_count = stmt.column_count();

        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(from_value_ref(row.get_ref(index)?));
            }
            result.push(values);
        }

        Ok(result)
    }
}

/// Transaction over a SQLite target; rolls back on drop unless committed
pub struct SqliteTransaction<'a> {
    tx: Transaction<'a>,
}

impl TargetTransaction for SqliteTransaction<'_> {
    fn count_rows(&mut self, table: &str) -> MirrorResult<u64> {
        count_rows(&self.tx, table)
    }

    fn delete_all(&mut self, table: &str) -> MirrorResult<u64> {
        let deleted = self.tx.execute(&format!("DELETE FROM {}", quote_identifier(table)), [])?;
        Ok(deleted as u64)
    }

    fn insert_row(&mut self, table: &str, columns: &[String], values: &[SqlValue]) -> MirrorResult<()> {
        let column_list = columns.iter().map(|c| quote_identifier(c)).collect::<Vec<_>>().join(", ");
        let placeholders = (1..=columns.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            column_list,
            placeholders
        );

        let mut stmt = self.tx.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(values.iter()))?;
        Ok(())
    }

    fn commit(self) -> MirrorResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    fn rollback(self) -> MirrorResult<()> {
        self.tx.rollback()?;
        Ok(())
    }
}

fn count_rows(conn: &Connection, table: &str) -> MirrorResult<u64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", quote_identifier(table)), [], |row| {
        row.get(0)
    })?;
    Ok(count as u64)
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Boolean(flag) => ToSqlOutput::Owned(SqliteValue::Integer(i64::from(*flag))),
            SqlValue::Integer(int) => ToSqlOutput::Owned(SqliteValue::Integer(*int)),
            SqlValue::Real(real) => ToSqlOutput::Owned(SqliteValue::Real(*real)),
            SqlValue::Decimal(text) | SqlValue::Text(text) => ToSqlOutput::Borrowed(ValueRef::Text(text.as_bytes())),
            SqlValue::DateTime(dt) => {
                ToSqlOutput::Owned(SqliteValue::Text(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()))
            }
            SqlValue::Bytes(bytes) => ToSqlOutput::Borrowed(ValueRef::Blob(bytes)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(int) => SqlValue::Integer(int),
        ValueRef::Real(real) => SqlValue::Real(real),
        ValueRef::Text(text) => SqlValue::Text(String::from_utf8_lossy(text).to_string()),
        ValueRef::Blob(bytes) => SqlValue::Bytes(bytes.to_vec()),
    }
}

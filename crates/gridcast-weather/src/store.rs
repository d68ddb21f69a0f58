//! Durable key-value settings: the known location and the refresh gate.

use std::collections::HashMap;
use std::path::Path;

use gridcast_core::error::RusqliteErrorExt;
use gridcast_core::StorageError;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::types::{GridCell, LocationRecord};

pub const KEY_NX: &str = "nx";
pub const KEY_NY: &str = "ny";
pub const KEY_LOCATION_NAME: &str = "location_name";
pub const KEY_LAST_UPDATE_TIME: &str = "last_update_time";

/// A typed settings value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Str(String),
    Int(i32),
    Long(i64),
}

impl StoredValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Str(_) => "string",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
        }
    }
}

/// Durable key/typed-value persistence.
///
/// Implementors provide `get` and `put_all`; the typed accessors are built on top.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    /// Write several entries together
    fn put_all(&self, entries: Vec<(&str, StoredValue)>) -> Result<(), StorageError>;

    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Str(s)) => Ok(Some(s)),
            Some(_) => Err(StorageError::TypeMismatch { key: key.into() }),
        }
    }

    fn get_i32(&self, key: &str) -> Result<Option<i32>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Int(v)) => Ok(Some(v)),
            Some(_) => Err(StorageError::TypeMismatch { key: key.into() }),
        }
    }

    fn get_i64(&self, key: &str) -> Result<Option<i64>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Long(v)) => Ok(Some(v)),
            Some(_) => Err(StorageError::TypeMismatch { key: key.into() }),
        }
    }

    fn put_string(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.put_all(vec![(key, StoredValue::Str(value.to_string()))])
    }

    fn put_i32(&self, key: &str, value: i32) -> Result<(), StorageError> {
        self.put_all(vec![(key, StoredValue::Int(value))])
    }

    fn put_i64(&self, key: &str, value: i64) -> Result<(), StorageError> {
        self.put_all(vec![(key, StoredValue::Long(value))])
    }
}

/// Read the known location. Present only when both grid coordinates are stored.
pub fn load_location<S: KeyValueStore + ?Sized>(
    store: &S,
) -> Result<Option<LocationRecord>, StorageError> {
    let (Some(nx), Some(ny)) = (store.get_i32(KEY_NX)?, store.get_i32(KEY_NY)?) else {
        return Ok(None);
    };
    let place_name = store
        .get_string(KEY_LOCATION_NAME)?
        .unwrap_or_else(|| crate::types::NO_LOCATION.to_string());

    Ok(Some(LocationRecord {
        grid: GridCell { nx, ny },
        place_name,
    }))
}

/// Persist the known location, replacing any previous one.
pub fn save_location<S: KeyValueStore + ?Sized>(
    store: &S,
    record: &LocationRecord,
) -> Result<(), StorageError> {
    store.put_all(vec![
        (KEY_NX, StoredValue::Int(record.grid.nx)),
        (KEY_NY, StoredValue::Int(record.grid.ny)),
        (KEY_LOCATION_NAME, StoredValue::Str(record.place_name.clone())),
    ])
}

/// Process-local store, used in tests and when no database can be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn put_all(&self, entries: Vec<(&str, StoredValue)>) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        for (key, value) in entries {
            values.insert(key.to_string(), value);
        }
        Ok(())
    }
}

/// SQLite-backed store with a single `settings` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(RusqliteErrorExt::into_storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(RusqliteErrorExt::into_storage_error)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StorageError> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    kind TEXT NOT NULL,
                    value TEXT NOT NULL
                );
                "#,
            )
            .map_err(RusqliteErrorExt::into_storage_error)
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        let row: Option<(String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT kind, value FROM settings WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(RusqliteErrorExt::into_storage_error)?;

        let Some((kind, value)) = row else {
            return Ok(None);
        };

        let mismatch = || StorageError::TypeMismatch { key: key.into() };
        let parsed = match kind.as_str() {
            "string" => StoredValue::Str(value),
            "int" => StoredValue::Int(value.parse().map_err(|_| mismatch())?),
            "long" => StoredValue::Long(value.parse().map_err(|_| mismatch())?),
            _ => return Err(mismatch()),
        };
        Ok(Some(parsed))
    }

    fn put_all(&self, entries: Vec<(&str, StoredValue)>) -> Result<(), StorageError> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(RusqliteErrorExt::into_storage_error)?;

        for (key, value) in &entries {
            let text = match value {
                StoredValue::Str(s) => s.clone(),
                StoredValue::Int(v) => v.to_string(),
                StoredValue::Long(v) => v.to_string(),
            };
            tx.execute(
                "INSERT OR REPLACE INTO settings (key, kind, value) VALUES (?1, ?2, ?3)",
                params![*key, value.kind(), text],
            )
            .map_err(RusqliteErrorExt::into_storage_error)?;
        }

        tx.commit().map_err(RusqliteErrorExt::into_storage_error)
    }
}

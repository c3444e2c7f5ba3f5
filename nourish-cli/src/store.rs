//! File-backed record store: one pretty-printed JSON array per table.

use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use nourish_core::{Query, Record, Store, StoreError};
use tracing::trace;

pub struct JsonFileStore {
    dir: PathBuf,
    // Serialises read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    fn table_path<R: Record>(&self) -> PathBuf {
        self.dir.join(format!("{}.json", R::TABLE))
    }

    fn read_table<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let path = self.table_path::<R>();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&text).map_err(|e| StoreError::Corrupt {
            table: R::TABLE,
            message: e.to_string(),
        })
    }

    fn write_table<R: Record>(&self, rows: &[R]) -> Result<(), StoreError> {
        let path = self.table_path::<R>();
        let text = serde_json::to_string_pretty(rows).map_err(|e| StoreError::Corrupt {
            table: R::TABLE,
            message: e.to_string(),
        })?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &path)?;
        trace!(table = R::TABLE, rows = rows.len(), "table written");
        Ok(())
    }

    fn with_table<R: Record, T>(&self, f: impl FnOnce(&mut Vec<R>) -> (T, bool)) -> Result<T, StoreError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| StoreError::Unavailable("file store lock poisoned".to_string()))?;
        let mut rows = self.read_table::<R>()?;
        let (out, dirty) = f(&mut rows);
        if dirty {
            self.write_table(&rows)?;
        }
        Ok(out)
    }
}

impl Store for JsonFileStore {
    fn insert<R: Record>(&self, rows: Vec<R>) -> Result<Vec<R>, StoreError> {
        if rows.is_empty() {
            return Ok(rows);
        }
        self.with_table(|table: &mut Vec<R>| {
            table.extend(rows.iter().cloned());
            (rows, true)
        })
    }

    fn query<R: Record>(&self, query: &Query) -> Result<Vec<R>, StoreError> {
        self.with_table(|table: &mut Vec<R>| (query.apply(table.iter().cloned()), false))
    }

    fn update<R: Record>(&self, query: &Query, patch: &dyn Fn(&mut R)) -> Result<usize, StoreError> {
        self.with_table(|table: &mut Vec<R>| {
            let mut touched = 0;
            for row in table.iter_mut() {
                if query.matches(&*row) {
                    patch(row);
                    touched += 1;
                }
            }
            (touched, touched > 0)
        })
    }

    fn delete<R: Record>(&self, query: &Query) -> Result<usize, StoreError> {
        self.with_table(|table: &mut Vec<R>| {
            let before = table.len();
            table.retain(|r| !query.matches(r));
            let removed = before - table.len();
            (removed, removed > 0)
        })
    }
}

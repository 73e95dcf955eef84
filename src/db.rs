use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::progress::{KeyValueStorage, StorageError};

/// Device-local key-value storage backed by a single SQLite table.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStorage for Database {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            r#"
            INSERT INTO kv_store (key, value)
            VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        // substr instead of LIKE so `_` in namespaces is not a wildcard.
        let mut stmt = self.conn.prepare(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )?;
        let rows = stmt.query_map(params![prefix], |row| row.get::<_, String>(0))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{DEFAULT_NAMESPACE, ProgressStore, sample_record};

    #[test]
    fn set_get_remove_round_trip() {
        let db = Database::open_in_memory().expect("open");
        db.migrate().expect("migrate");

        assert_eq!(db.get_item("a").expect("read"), None);
        db.set_item("a", "1").expect("write");
        db.set_item("a", "2").expect("overwrite");
        assert_eq!(db.get_item("a").expect("read").as_deref(), Some("2"));
        db.remove_item("a").expect("remove");
        assert_eq!(db.get_item("a").expect("read"), None);
    }

    #[test]
    fn prefix_scan_treats_underscore_literally() {
        let db = Database::open_in_memory().expect("open");
        db.migrate().expect("migrate");
        db.set_item("movieapp_progress_movie_1", "x").expect("write");
        db.set_item("movieappXprogressXmovie_2", "x").expect("write");
        db.set_item("other", "x").expect("write");

        let keys = db.keys_with_prefix("movieapp_progress_").expect("scan");

        assert_eq!(keys, vec!["movieapp_progress_movie_1".to_string()]);
    }

    #[test]
    fn unmigrated_database_degrades_through_store() {
        let db = Database::open_in_memory().expect("open");
        let store = ProgressStore::new(Box::new(db), DEFAULT_NAMESPACE);
        let record = sample_record(1, None, 40.0, 1);

        store.save(&record);

        assert_eq!(store.load(&record.id), None);
        assert!(store.get_all().is_empty());
    }

    #[test]
    fn records_survive_reopening_the_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("playmark.db");
        let record = sample_record(550, Some((2, 5)), 33.0, 42);

        {
            let db = Database::open(&path).expect("open");
            db.migrate().expect("migrate");
            ProgressStore::new(Box::new(db), DEFAULT_NAMESPACE).save(&record);
        }

        let db = Database::open(&path).expect("reopen");
        db.migrate().expect("migrate");
        let store = ProgressStore::new(Box::new(db), DEFAULT_NAMESPACE);
        assert_eq!(store.load(&record.id), Some(record));
    }
}

use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

fn db_path() -> Option<PathBuf> {
    let proj = ProjectDirs::from("com", "example", "chatter")?;
    Some(proj.data_dir().join("prefs.sqlite"))
}

fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Durable string key/value store for client-side preferences.
pub struct Preferences {
    conn: Connection,
}

impl Preferences {
    /// Open the store in the platform data dir, falling back to memory when
    /// there is no usable data dir.
    pub fn open_default() -> Result<Self> {
        match db_path() {
            Some(path) => {
                if let Err(e) = ensure_dir(&path) {
                    log::warn!("no preferences dir ({e}), keeping preferences in memory");
                    return Self::in_memory();
                }
                Self::open(&path)
            }
            None => Self::in_memory(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO preferences (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value=excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}

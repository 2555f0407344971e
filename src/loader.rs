//! Best-effort bulk load of fetched collections into SQLite.
//!
//! Every row is attempted. A row that does not decode or that violates the
//! primary key is logged and collected as an [`InsertFailure`]; the rest of the
//! batch still goes in. Rows already committed are never rolled back.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;

use crate::config::Config;
use crate::types::{SignatureKind, SignatureRecord};

#[derive(Debug)]
pub struct InsertFailure {
    pub record: Value,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct LoadReport {
    pub attempted: usize,
    pub inserted: usize,
    pub failures: Vec<InsertFailure>,
}

pub struct Loader {
    conn: Connection,
    batch_size: usize,
}

impl Loader {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        // single writer; readers may inspect the file while a load runs
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 250)?;
        Ok(Self {
            conn,
            batch_size: 1000,
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
            batch_size: 1000,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn ensure_table(&self, kind: SignatureKind) -> Result<()> {
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {}(
                id             NUMERIC PRIMARY KEY,
                text_signature TEXT,
                hex_signature  TEXT
            );",
            kind.table_name()
        ))?;
        Ok(())
    }

    /// Attempt every row; per-row failures are reported, not returned as errors.
    pub fn insert_all(&mut self, kind: SignatureKind, rows: Vec<Value>) -> Result<LoadReport> {
        self.ensure_table(kind)?;
        let sql = format!(
            "INSERT INTO {}(id, text_signature, hex_signature) VALUES (?1, ?2, ?3)",
            kind.table_name()
        );

        let mut report = LoadReport {
            attempted: rows.len(),
            ..Default::default()
        };
        let mut rows = rows.into_iter().peekable();

        while rows.peek().is_some() {
            let txc = self.conn.unchecked_transaction()?;
            {
                let mut stmt = txc.prepare_cached(&sql)?;
                for row in rows.by_ref().take(self.batch_size) {
                    let outcome = serde_json::from_value::<SignatureRecord>(row.clone())
                        .map_err(|e| format!("malformed record: {e}"))
                        .and_then(|rec| {
                            stmt.execute(params![rec.id, rec.text_signature, rec.hex_signature])
                                .map_err(|e| e.to_string())
                        });
                    match outcome {
                        Ok(_) => report.inserted += 1,
                        Err(error) => {
                            log::warn!("[load] {kind} insert failed for {row}: {error}");
                            report.failures.push(InsertFailure { record: row, error });
                        }
                    }
                }
            }
            txc.commit()?;
        }

        Ok(report)
    }

    pub fn count_rows(&self, kind: SignatureKind) -> Result<u64> {
        self.ensure_table(kind)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", kind.table_name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn get(&self, kind: SignatureKind, id: i64) -> Result<Option<SignatureRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, text_signature, hex_signature FROM {} WHERE id = ?",
            kind.table_name()
        ))?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(SignatureRecord {
                id: row.get(0)?,
                text_signature: row.get(1)?,
                hex_signature: row.get(2)?,
            }));
        }
        Ok(None)
    }
}

/// Read a fetched collection file; it must hold a JSON array
pub fn read_collection(path: &Path) -> Result<Vec<Value>> {
    let contents = std::fs::read(path)
        .with_context(|| format!("Failed to read collection {}", path.display()))?;
    match serde_json::from_slice::<Value>(&contents)
        .with_context(|| format!("Failed to parse collection {}", path.display()))?
    {
        Value::Array(rows) => Ok(rows),
        other => Err(anyhow!(
            "Collection {} is not a JSON array (found {})",
            path.display(),
            type_name(&other)
        )),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Load one kind's collection file into the configured database.
///
/// Blocking; callers on the runtime should go through `spawn_blocking`.
pub fn load_kind(cfg: &Config, kind: SignatureKind) -> Result<LoadReport> {
    let path = cfg.collection_path(kind);
    log::info!("[load] {kind} signatures from {}", path.display());
    let rows = read_collection(&path)?;

    let mut loader = Loader::open(&cfg.db_path)?.with_batch_size(cfg.batch_size);
    let report = loader.insert_all(kind, rows)?;

    log::info!(
        "[load] {kind}: {} attempted, {} inserted, {} failed",
        report.attempted,
        report.inserted,
        report.failures.len()
    );
    Ok(report)
}

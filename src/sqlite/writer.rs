//! Transactional batch writer for the run store.
//!
//! Each [`StorageSink`] owns its own connection. Workers writing to the same
//! store serialize on SQLite's write lock: every batch runs inside one
//! `BEGIN IMMEDIATE` transaction, so a batch either lands whole or not at
//! all, and no two sinks hold a write transaction at the same time.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use log::{debug, warn};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, TransactionBehavior};

use crate::config::{RunContext, StoreOptions};
use crate::decode::TimedRecord;
use crate::error::StorageError;
use crate::sqlite::schema::{
    row_values, Table, WritePolicy, METADATA_SQL, SCHEMA_VERSION, STORE_PRAGMAS,
};

/// Records waiting to be written, grouped by destination table.
#[derive(Debug, Default)]
pub struct StorageBatch {
    tables: BTreeMap<Table, Vec<TimedRecord>>,
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: TimedRecord) {
        self.tables
            .entry(record.record.table())
            .or_default()
            .push(record);
    }

    /// Make sure `table` is written even if no record lands in it, so a
    /// Replace table is cleared when its rebuilt contents are empty.
    pub fn include(&mut self, table: Table) {
        self.tables.entry(table).or_default();
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = TimedRecord>) {
        for record in records {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    /// True when there is no table to write, not even an empty one.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = (Table, &[TimedRecord])> {
        self.tables.iter().map(|(t, r)| (*t, r.as_slice()))
    }
}

pub struct StorageSink {
    conn: Connection,
    path: PathBuf,
    options: StoreOptions,
}

impl StorageSink {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path, options: &StoreOptions) -> Result<Self, StorageError> {
        let open_err = |source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path).map_err(open_err)?;
        conn.busy_timeout(options.busy_timeout).map_err(open_err)?;
        conn.execute_batch(STORE_PRAGMAS).map_err(open_err)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            options: options.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the run's chip and clock reference in the single metadata row.
    pub fn write_metadata(&mut self, ctx: &RunContext) -> Result<(), StorageError> {
        let reference = *ctx.reconciler.reference();
        let bounds = ctx.reconciler.bounds();
        let chip = ctx.chip.name();
        self.with_retries("metadata", |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(METADATA_SQL)?;
            tx.execute(
                "INSERT INTO metadata (id, schema_version, chip, reference_cycle,
                    reference_wall_ns, cycles_per_us, run_start_ns, run_end_ns)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    schema_version = ?1,
                    chip = ?2,
                    reference_cycle = ?3,
                    reference_wall_ns = ?4,
                    cycles_per_us = ?5,
                    run_start_ns = ?6,
                    run_end_ns = ?7",
                params![
                    SCHEMA_VERSION,
                    chip,
                    reference.reference_cycle_count as i64,
                    reference.reference_wall_time_ns,
                    reference.cycles_per_microsecond,
                    bounds.map(|b| b.start_ns),
                    bounds.map(|b| b.end_ns),
                ],
            )?;
            tx.commit()
        })
    }

    /// Write one table's records in a single transaction.
    ///
    /// The table is created if absent. For [`WritePolicy::Replace`] tables
    /// the existing rows are deleted inside the same transaction, so writing
    /// the same batch twice leaves the same contents. Returns the number of
    /// rows inserted.
    pub fn persist(
        &mut self,
        table: Table,
        records: &[TimedRecord],
    ) -> Result<usize, StorageError> {
        if let Some(stray) = records.iter().find(|r| r.record.table() != table) {
            return Err(StorageError::TableMismatch {
                expected: table.name(),
                actual: stray.record.table().name(),
            });
        }

        let insert_sql = table.insert_sql();
        let inserted = self.with_retries(table.name(), |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute_batch(table.create_sql())?;
            if table.policy() == WritePolicy::Replace {
                tx.execute(&format!("DELETE FROM {}", table.name()), [])?;
            }
            {
                let mut stmt = tx.prepare_cached(&insert_sql)?;
                for record in records {
                    stmt.execute(params_from_iter(row_values(record)))?;
                }
            }
            tx.commit()?;
            Ok(records.len())
        })?;

        debug!(
            "{}: committed {} rows to {}",
            self.path.display(),
            inserted,
            table.name()
        );
        Ok(inserted)
    }

    /// Write every table of a batch, one transaction per table.
    ///
    /// Stops at the first table that fails; tables committed before it stay
    /// committed.
    pub fn persist_batch(
        &mut self,
        batch: StorageBatch,
    ) -> Result<BTreeMap<Table, usize>, StorageError> {
        let mut written = BTreeMap::new();
        for (table, records) in batch.tables() {
            let n = self.persist(table, records)?;
            written.insert(table, n);
        }
        Ok(written)
    }

    fn with_retries<T>(
        &mut self,
        table: &'static str,
        mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, StorageError> {
        let max_attempts = self.options.commit_retries + 1;
        let mut attempt = 1;
        loop {
            match op(&mut self.conn) {
                Ok(value) => return Ok(value),
                Err(err) if is_transient(&err) && attempt < max_attempts => {
                    warn!(
                        "{}: attempt {}/{} on {} failed: {}",
                        self.path.display(),
                        attempt,
                        max_attempts,
                        table,
                        err
                    );
                    thread::sleep(self.options.retry_backoff * attempt);
                    attempt += 1;
                }
                Err(err) if is_transient(&err) => {
                    return Err(StorageError::CommitFailed {
                        table,
                        attempts: attempt,
                        source: err,
                    });
                }
                Err(err) => return Err(StorageError::Sqlite { table, source: err }),
            }
        }
    }
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked)
    )
}

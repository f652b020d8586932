// 🗄️ Warehouse - one SQLite connection, schema, and units of work
//
// The warehouse owns the physical connection. Work happens inside a
// `Session`, which begins a transaction lazily and rolls back on drop unless
// committed.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How long a writer waits on a locked database before failing
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(15);

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS clients (
        id TEXT PRIMARY KEY NOT NULL,
        age INTEGER,
        gender TEXT,
        net_worth REAL
    );

    CREATE INDEX IF NOT EXISTS ix_clients_net_worth ON clients(net_worth);
    CREATE INDEX IF NOT EXISTS ix_clients_age ON clients(age);

    CREATE TABLE IF NOT EXISTS transactions (
        id TEXT PRIMARY KEY NOT NULL,
        client_id TEXT REFERENCES clients(id) ON DELETE SET NULL,
        raw_service TEXT NOT NULL,
        raw_payment_method TEXT NOT NULL,
        transaction_date TEXT,
        amount REAL NOT NULL CHECK (amount > 0),
        city TEXT,
        consultant TEXT,
        service_category TEXT NOT NULL,
        payment_method_category TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS ix_transactions_client_id ON transactions(client_id);
    CREATE INDEX IF NOT EXISTS ix_transactions_raw_service ON transactions(raw_service);
    CREATE INDEX IF NOT EXISTS ix_transactions_service_category ON transactions(service_category);
    CREATE INDEX IF NOT EXISTS ix_transactions_date_amount ON transactions(transaction_date, amount);
    CREATE INDEX IF NOT EXISTS ix_transactions_client_date ON transactions(client_id, transaction_date);

    CREATE TABLE IF NOT EXISTS analysis_results (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        analysis_name TEXT NOT NULL,
        result_json TEXT NOT NULL,
        parameters TEXT,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS ix_analysis_results_name ON analysis_results(analysis_name, created_at);
";

const DROP_ALL: &str = "
    DROP TABLE IF EXISTS transactions;
    DROP TABLE IF EXISTS clients;
    DROP TABLE IF EXISTS analysis_results;
";

// ============================================================================
// WAREHOUSE
// ============================================================================

pub struct Warehouse {
    conn: Connection,
    /// `None` for in-memory databases
    path: Option<PathBuf>,
}

impl Warehouse {
    /// Open (or create) a file-backed warehouse and ensure the schema exists.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let warehouse = Warehouse {
            conn,
            path: Some(path.to_path_buf()),
        };
        warehouse.initialize()?;
        info!(path = %path.display(), "Warehouse initialized");
        Ok(warehouse)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        info!("Opening in-memory warehouse");
        let warehouse = Warehouse {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    fn initialize(&self) -> StorageResult<()> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        if self.path.is_some() {
            // WAL for crash recovery; not available for :memory:
            let mode: String = self.conn.pragma_update_and_check(
                None,
                "journal_mode",
                "WAL",
                |row| row.get(0),
            )?;
            tracing::debug!(journal_mode = %mode, "Journal mode set");
        }
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Start a unit of work. Only one should be open at a time.
    pub fn session(&self) -> Session<'_> {
        Session {
            conn: &self.conn,
            in_transaction: Cell::new(false),
        }
    }

    /// Drop every table and recreate the schema (used before a fresh load).
    pub fn clear_all(&self) -> StorageResult<()> {
        self.conn.execute_batch(DROP_ALL)?;
        self.conn.execute_batch(SCHEMA)?;
        warn!("All warehouse data cleared");
        Ok(())
    }

    /// Release the connection, reporting any close failure.
    pub fn close(self) -> StorageResult<()> {
        self.conn.close().map_err(|(_, err)| StorageError::from(err))?;
        info!("Warehouse connection closed");
        Ok(())
    }
}

// ============================================================================
// SESSION (unit of work)
// ============================================================================

/// Transactional scope for one load batch or one analysis run.
///
/// The transaction begins on first use; `commit` ends it and the next use
/// begins a new one. Dropping an uncommitted session rolls it back.
pub struct Session<'w> {
    conn: &'w Connection,
    in_transaction: Cell<bool>,
}

impl<'w> Session<'w> {
    /// Connection with a transaction guaranteed to be open.
    pub fn connection(&self) -> StorageResult<&'w Connection> {
        if !self.in_transaction.get() {
            self.conn.execute_batch("BEGIN")?;
            self.in_transaction.set(true);
        }
        Ok(self.conn)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction.get()
    }

    /// Statements run eagerly inside the open transaction, so there is no
    /// pending write buffer; this only marks a batch boundary in the logs.
    pub fn flush(&self) -> StorageResult<()> {
        if self.in_transaction.get() {
            let pending = self.conn.changes();
            tracing::debug!(pending, "Session flushed");
        }
        Ok(())
    }

    pub fn commit(&self) -> StorageResult<()> {
        if self.in_transaction.replace(false) {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    pub fn rollback(&self) -> StorageResult<()> {
        if self.in_transaction.replace(false) {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Finish the unit of work, discarding anything uncommitted.
    pub fn close(self) -> StorageResult<()> {
        self.rollback()
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.in_transaction.get() {
            if let Err(err) = self.rollback() {
                warn!(error = %err, "Rollback on session drop failed");
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

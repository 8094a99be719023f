//! Connection handling shared by the `SQLite` stores.

use crate::{Error, Result};
use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard};

/// Acquires a mutex, recovering from poisoning.
///
/// A poisoned lock means an earlier critical section panicked; the guarded
/// value is still usable, so the poison is logged and cleared.
pub fn acquire_lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Storage mutex was poisoned, recovering");
            metrics::counter!("storage_mutex_poison_recovery_total").increment(1);
            poisoned.into_inner()
        },
    }
}

/// Applies WAL journaling, NORMAL sync, and a 5 second busy timeout.
///
/// In-memory databases silently keep the `memory` journal mode.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the busy timeout cannot be set.
pub fn configure_connection(conn: &Connection) -> Result<()> {
    // journal_mode returns a row, so pragma_update reports it as an error on
    // some builds; the mode is best effort.
    let _ = conn.pragma_update(None, "journal_mode", "WAL");
    let _ = conn.pragma_update(None, "synchronous", "NORMAL");
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(|e| Error::OperationFailed {
            operation: "configure_sqlite".to_string(),
            cause: e.to_string(),
        })
}

//! Process-wide handle registry for engines and transactions.
//!
//! Handles are opaque non-zero integers; every entry point validates
//! its handle here and maps unknown ones to the "not initialized"
//! error. The result pool is created with the first engine and its
//! free list is dropped when the last engine goes away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use kitedb_core::{Engine, Error, Result, Transaction};
use parking_lot::{Mutex, RwLock};

use crate::pool::ResultsPool;
use crate::types::{KitedbHandle, KitedbTxHandle};

static ENGINES: OnceLock<RwLock<HashMap<KitedbHandle, Arc<Engine>>>> = OnceLock::new();
static TRANSACTIONS: OnceLock<Mutex<HashMap<KitedbTxHandle, TxWrapper>>> = OnceLock::new();
static POOL: OnceLock<ResultsPool> = OnceLock::new();
static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// A registered in-flight transaction.
pub struct TxWrapper {
    /// Engine the transaction belongs to.
    pub engine: KitedbHandle,
    /// The transaction itself.
    pub tx: Transaction,
}

fn engines() -> &'static RwLock<HashMap<KitedbHandle, Arc<Engine>>> {
    ENGINES.get_or_init(|| RwLock::new(HashMap::new()))
}

fn transactions() -> &'static Mutex<HashMap<KitedbTxHandle, TxWrapper>> {
    TRANSACTIONS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// The process-wide result pool.
pub fn pool() -> &'static ResultsPool {
    POOL.get_or_init(ResultsPool::with_defaults)
}

/// Registers a new engine and returns its handle.
pub fn register_engine(engine: Engine) -> KitedbHandle {
    // The pool lives as long as any engine does.
    let _ = pool();
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    engines().write().insert(handle, Arc::new(engine));
    handle
}

/// Resolves an engine handle.
pub fn engine(handle: KitedbHandle) -> Result<Arc<Engine>> {
    engines()
        .read()
        .get(&handle)
        .cloned()
        .ok_or(Error::NotInitialized)
}

/// Destroys an engine, dropping its pending transactions; clears the
/// pool's free list when no engine remains.
pub fn unregister_engine(handle: KitedbHandle) -> Result<()> {
    let removed = engines().write().remove(&handle);
    if removed.is_none() {
        return Err(Error::NotInitialized);
    }
    transactions().lock().retain(|_, tx| tx.engine != handle);
    if engines().read().is_empty() {
        pool().clear();
    }
    Ok(())
}

/// Registers an in-flight transaction and returns its handle.
pub fn register_tx(engine: KitedbHandle, tx: Transaction) -> KitedbTxHandle {
    let handle = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
    transactions().lock().insert(handle, TxWrapper { engine, tx });
    handle
}

/// Removes and returns a transaction; terminal calls always free the
/// handle.
pub fn take_tx(handle: KitedbTxHandle) -> Result<Transaction> {
    transactions()
        .lock()
        .remove(&handle)
        .map(|w| w.tx)
        .ok_or_else(|| Error::bad_transaction("unknown or already finished transaction"))
}

/// Runs a closure against a registered transaction without consuming
/// it.
pub fn with_tx<T>(
    handle: KitedbTxHandle,
    f: impl FnOnce(&mut Transaction) -> Result<T>,
) -> Result<T> {
    let mut transactions = transactions().lock();
    let wrapper = transactions
        .get_mut(&handle)
        .ok_or_else(|| Error::bad_transaction("unknown or already finished transaction"))?;
    f(&mut wrapper.tx)
}

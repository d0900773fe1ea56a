//! The replication worker: WAL catch-up, forced resync, live updates.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use kitedb_core::{
    Engine, Error, IndexDef, Lsn, Namespace, NamespaceDef, Query, QueryResults, QueryType,
    ReplicationState, Result, ResultEntry, ResultFlags, StorageOpts, TagsMatcher, UpdateObserver,
    WalRecord, NO_LSN,
};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{error, info, trace, warn};

use crate::config::{ReplicationConfig, ReplicationRole};
use crate::master::MasterClient;

const SIG_STOP: u8 = 0b01;
const SIG_RESYNC: u8 = 0b10;

/// Result flags for replication streams: CJSON payloads, item IDs,
/// and raw WAL records.
fn wal_result_flags() -> ResultFlags {
    ResultFlags::new(ResultFlags::CJSON | ResultFlags::WITH_ITEM_ID | ResultFlags::WITH_RAW)
}

fn slave_opts() -> StorageOpts {
    StorageOpts::new().enabled().create_if_missing().slave_mode()
}

/// Factory producing a master client for the current configuration.
pub type MasterConnector =
    Box<dyn Fn(&ReplicationConfig) -> Result<Arc<dyn MasterClient>> + Send + Sync>;

/// Counters of one sync pass, logged when the pass finishes.
#[derive(Default)]
struct SyncStat {
    updated: u64,
    deleted: u64,
    updated_indexes: u64,
    deleted_indexes: u64,
    updated_meta: u64,
    errors: u64,
    processed: i64,
    last_error: Option<Error>,
    master_state: Option<ReplicationState>,
}

impl fmt::Display for SyncStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if self.updated > 0 {
            write!(f, "{} items updated; ", self.updated)?;
            wrote = true;
        }
        if self.deleted > 0 {
            write!(f, "{} items deleted; ", self.deleted)?;
            wrote = true;
        }
        if self.updated_indexes > 0 {
            write!(f, "{} indexes updated; ", self.updated_indexes)?;
            wrote = true;
        }
        if self.deleted_indexes > 0 {
            write!(f, "{} indexes deleted; ", self.deleted_indexes)?;
            wrote = true;
        }
        if self.updated_meta > 0 {
            write!(f, "{} meta updated; ", self.updated_meta)?;
            wrote = true;
        }
        if self.errors > 0 {
            write!(
                f,
                "{} errors ({}) ",
                self.errors,
                self.last_error
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default()
            )?;
            wrote = true;
        }
        if !wrote {
            write!(f, "Up to date; ")?;
        }
        if self.processed > 0 {
            write!(f, "processed {} WAL records ", self.processed)?;
        }
        Ok(())
    }
}

/// Cursor guarding the race between catch-up and live updates.
struct SyncCursor {
    ns_name: String,
    max_lsn: Lsn,
}

struct Signals {
    flags: Mutex<u8>,
    cv: Condvar,
}

impl Signals {
    fn new() -> Self {
        Self {
            flags: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn send(&self, sig: u8) {
        *self.flags.lock() |= sig;
        self.cv.notify_one();
    }

    /// Blocks until at least one signal arrives, then drains them all;
    /// several `resync` sends during one pass coalesce into one.
    fn wait(&self) -> u8 {
        let mut flags = self.flags.lock();
        while *flags == 0 {
            self.cv.wait(&mut flags);
        }
        std::mem::take(&mut *flags)
    }
}

struct ReplicatorInner {
    slave: Arc<Engine>,
    connector: MasterConnector,
    master: RwLock<Option<Arc<dyn MasterClient>>>,
    config: RwLock<ReplicationConfig>,
    terminate: AtomicBool,
    syncing: AtomicBool,
    cursor: Mutex<SyncCursor>,
    signals: Signals,
}

/// Keeps a slave engine convergent with a master engine.
///
/// The worker consumes the master's WAL per namespace, falls back to a
/// forced full resync when the WAL is insufficient, and races live
/// streaming updates against bulk catch-up through the sync cursor.
pub struct Replicator {
    inner: Arc<ReplicatorInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Replicator {
    /// Creates a replicator for `slave`; `connector` builds the master
    /// client when the worker starts.
    pub fn new(
        slave: Arc<Engine>,
        connector: impl Fn(&ReplicationConfig) -> Result<Arc<dyn MasterClient>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ReplicatorInner {
                slave,
                connector: Box::new(connector),
                master: RwLock::new(None),
                config: RwLock::new(ReplicationConfig::default()),
                terminate: AtomicBool::new(false),
                syncing: AtomicBool::new(false),
                cursor: Mutex::new(SyncCursor {
                    ns_name: String::new(),
                    max_lsn: NO_LSN,
                }),
                signals: Signals::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Swaps the configuration; when connection-relevant fields change
    /// while running, the worker is stopped first. Returns true when a
    /// (re)start is needed.
    pub fn configure(&self, config: ReplicationConfig) -> bool {
        let need_stop = {
            let current = self.inner.config.read();
            self.inner.master.read().is_some()
                && (config.role != current.role
                    || config.master_dsn != current.master_dsn
                    || config.cluster_id != current.cluster_id
                    || config.conn_pool_size != current.conn_pool_size)
        };
        if need_stop {
            self.stop();
        }
        *self.inner.config.write() = config;
        need_stop || self.inner.master.read().is_none()
    }

    /// Starts the worker. A no-op success unless configured as slave.
    pub fn start(&self) -> Result<()> {
        if self.inner.master.read().is_some() {
            return Err(Error::logic("replicator is already started"));
        }
        let config = self.inner.config.read().clone();
        if config.role != ReplicationRole::Slave {
            return Ok(());
        }

        let master = (self.inner.connector)(&config)?;
        master.connect(&config.master_dsn)?;
        self.inner.terminate.store(false, Ordering::SeqCst);
        *self.inner.master.write() = Some(master);

        let inner = Arc::clone(&self.inner);
        *self.worker.lock() = Some(std::thread::spawn(move || inner.run()));
        Ok(())
    }

    /// Signals stop, joins the worker, and drops the master client.
    pub fn stop(&self) {
        self.inner.terminate.store(true, Ordering::SeqCst);
        self.inner.signals.send(SIG_STOP);
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
        *self.inner.master.write() = None;
    }

    /// Requests a new `syncDatabase` pass from the worker.
    pub fn resync(&self) {
        self.inner.signals.send(SIG_RESYNC);
    }

    /// True once the worker hit a fatal condition (no WAL on the
    /// master, cluster-ID mismatch) or was stopped.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminate.load(Ordering::SeqCst)
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ReplicatorInner {
    fn master(&self) -> Result<Arc<dyn MasterClient>> {
        self.master
            .read()
            .clone()
            .ok_or_else(|| Error::logic("replicator is not connected to a master"))
    }

    fn run(self: Arc<Self>) {
        let dsn = self.config.read().master_dsn.clone();
        info!(master = %dsn, "replicator started");

        let observer: Arc<dyn UpdateObserver> = self.clone();
        if let Ok(master) = self.master() {
            if let Err(err) = master.subscribe_updates(&observer, true) {
                error!("cannot subscribe to WAL updates: {err}");
            }
        }

        let _ = self.sync_database();

        while !self.terminate.load(Ordering::SeqCst) {
            let signals = self.signals.wait();
            if signals & SIG_STOP != 0 || self.terminate.load(Ordering::SeqCst) {
                break;
            }
            if signals & SIG_RESYNC != 0 {
                let _ = self.sync_database();
            }
        }

        if let Ok(master) = self.master() {
            let _ = master.subscribe_updates(&observer, false);
        }
        info!(master = %dsn, "replicator stopped");
    }

    /// One full pass over the master's namespaces.
    fn sync_database(&self) -> Result<()> {
        let master = self.master()?;
        let config = self.config.read().clone();
        info!(master = %config.master_dsn, "starting sync");

        let defs = match master.enum_namespaces() {
            Ok(defs) => defs,
            Err(err) => {
                error!("EnumNamespaces error: {err}");
                return Err(err);
            }
        };

        let mut outcome: Result<()> = Ok(());
        'namespaces: for def in &defs {
            if !config.sync_enabled(&def.name) {
                continue;
            }
            if self.terminate.load(Ordering::SeqCst) {
                break;
            }

            if let Err(err) = self.slave.open_namespace(&def.name, slave_opts()) {
                error!(namespace = %def.name, "open error: {err}");
            }

            // Arm the cursor: concurrent updates for this namespace
            // only raise max_lsn until catch-up finishes.
            {
                let mut cursor = self.cursor.lock();
                self.syncing.store(false, Ordering::SeqCst);
                cursor.ns_name = def.name.clone();
                cursor.max_lsn = NO_LSN;
                self.syncing.store(true, Ordering::SeqCst);
            }

            let mut done = false;
            while !done {
                if let Err(sync_err) = self.sync_namespace_by_wal(&master, def) {
                    error!(namespace = %def.name, "sync error: {sync_err}");
                    let terminating = self.terminate.load(Ordering::SeqCst);
                    let recovery = match &sync_err {
                        Error::DataHashMismatch { .. } if !terminating => {
                            if config.force_sync_on_wrong_data_hash {
                                Some(self.sync_namespace_forced(&master, def, "dataHash mismatch"))
                            } else {
                                Some(Ok(()))
                            }
                        }
                        Error::Network(_) => None,
                        _ if !terminating && config.force_sync_on_logic_error => {
                            Some(self.sync_namespace_forced(&master, def, "logic error occurred"))
                        }
                        _ => None,
                    };
                    match recovery {
                        Some(Ok(())) => {}
                        Some(Err(forced_err)) => {
                            error!(namespace = %def.name, "forced sync error: {forced_err}");
                            outcome = Err(forced_err);
                            break 'namespaces;
                        }
                        None => {
                            outcome = Err(sync_err);
                            break 'namespaces;
                        }
                    }
                }

                let Some(slave_ns) = self.slave.get_namespace(&def.name) else {
                    outcome = Err(Error::logic(format!(
                        "namespace '{}' disappeared during sync",
                        def.name
                    )));
                    break 'namespaces;
                };
                let cur_lsn = slave_ns.repl_state().last_lsn;
                // A live update may have arrived with a bigger LSN
                // during catch-up; loop once more to pull it via WAL.
                let cursor = self.cursor.lock();
                done = cursor.max_lsn <= cur_lsn;
            }
        }
        self.syncing.store(false, Ordering::SeqCst);

        outcome
    }

    /// Catches a namespace up through the master's WAL.
    fn sync_namespace_by_wal(
        &self,
        master: &Arc<dyn MasterClient>,
        def: &NamespaceDef,
    ) -> Result<()> {
        let slave_ns = self.slave.get_namespace(&def.name).ok_or_else(|| {
            Error::logic(format!("namespace '{}' disappeared during sync", def.name))
        })?;
        let lsn = slave_ns.repl_state().last_lsn;
        trace!(namespace = %def.name, lsn, "starting WAL sync");

        match master.select(&Query::wal(&def.name, lsn), wal_result_flags()) {
            Ok(qr) => self.apply_wal(&def.name, &qr),
            Err(Error::OutdatedWal(_)) => {
                self.sync_namespace_forced(master, def, "WAL has been outdated")
            }
            Err(err @ Error::NoWal(_)) => {
                self.terminate.store(true, Ordering::SeqCst);
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Rebuilds a namespace from scratch: drop, recreate, copy index
    /// definitions and meta, then bulk-load every item.
    fn sync_namespace_forced(
        &self,
        master: &Arc<dyn MasterClient>,
        def: &NamespaceDef,
        reason: &str,
    ) -> Result<()> {
        warn!(namespace = %def.name, reason, "starting FORCED sync");

        let dropped = self.slave.close_namespace(&def.name, true);
        match dropped {
            Ok(()) | Err(Error::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.slave.open_namespace(&def.name, slave_opts())?;
        self.sync_indexes_forced(def);
        self.sync_meta_forced(master, &def.name)?;

        let qr = master.select(&Query::new(&def.name), wal_result_flags())?;
        self.apply_wal(&def.name, &qr)
    }

    /// Copies the master's index definitions; individual failures are
    /// logged and skipped.
    fn sync_indexes_forced(&self, def: &NamespaceDef) {
        let Some(slave_ns) = self.slave.get_namespace(&def.name) else {
            return;
        };
        for idx in &def.indexes {
            trace!(namespace = %def.name, index = %idx.name, "copying index");
            if let Err(err) = slave_ns.add_index_replicated(idx) {
                error!(namespace = %def.name, index = %idx.name, "error adding index: {err}");
            }
        }
    }

    /// Copies the master's metadata; individual key failures are
    /// logged and skipped.
    fn sync_meta_forced(&self, master: &Arc<dyn MasterClient>, ns_name: &str) -> Result<()> {
        let keys = master.enum_meta(ns_name)?;
        let Some(slave_ns) = self.slave.get_namespace(ns_name) else {
            return Ok(());
        };
        for key in keys {
            match master.get_meta(ns_name, &key) {
                Ok(value) => {
                    if let Err(err) = slave_ns.put_meta_replicated(&key, &value) {
                        error!(namespace = ns_name, key = %key, "error setting meta: {err}");
                    }
                }
                Err(err) => {
                    error!(namespace = ns_name, key = %key, "error getting meta: {err}");
                }
            }
        }
        Ok(())
    }

    /// Applies a result stream (WAL catch-up or forced bulk load).
    ///
    /// Per-record errors are counted and logged without aborting the
    /// stream; on clean completion the slave namespace LSN advances
    /// and the master's data hash is checked for convergence.
    fn apply_wal(&self, ns_name: &str, qr: &QueryResults) -> Result<()> {
        let slave_ns = self.slave.get_namespace(ns_name);
        let mut stat = SyncStat::default();
        let mut slave_lsn = slave_ns
            .as_ref()
            .map(|ns| ns.repl_state().last_lsn)
            .unwrap_or(NO_LSN);

        let mut last_result: Result<()> = Ok(());
        for entry in qr.iter() {
            if self.terminate.load(Ordering::SeqCst) {
                break;
            }
            let lsn = entry.lsn();
            slave_lsn = slave_lsn.max(lsn);

            last_result = match entry {
                ResultEntry::Raw { record, .. } => {
                    self.apply_wal_record(lsn, ns_name, slave_ns.as_ref(), record, &mut stat)
                }
                ResultEntry::Item { payload, .. } => match qr.tags_matcher() {
                    // A plain item update: re-encode as CJSON and
                    // upsert with the stream's matcher.
                    Some(tags) => {
                        let mut tags = tags.clone();
                        kitedb_core::cjson_codec::encode(payload, &mut tags)
                            .and_then(|(cjson, _)| {
                                self.apply_item_cjson(
                                    lsn,
                                    ns_name,
                                    slave_ns.as_ref(),
                                    &cjson,
                                    kitedb_core::ModifyMode::Upsert,
                                    &tags,
                                    &mut stat,
                                )
                            })
                    }
                    None => Err(Error::logic("result stream carries no tags matcher")),
                },
            };

            if let Err(err) = &last_result {
                trace!(namespace = ns_name, lsn, "error processing WAL record: {err}");
                stat.last_error = Some(err.clone());
                stat.errors += 1;
            }
            stat.processed += 1;
        }

        let terminating = self.terminate.load(Ordering::SeqCst);
        if last_result.is_ok() && !terminating {
            if let Some(ns) = slave_ns.as_ref() {
                ns.set_slave_lsn(slave_lsn);
            }
        }

        let slave_state = slave_ns
            .as_ref()
            .map(|ns| ns.repl_state())
            .unwrap_or(ReplicationState::empty(0));
        if let Some(master_state) = &stat.master_state {
            if master_state.last_lsn >= 0
                && last_result.is_ok()
                && !terminating
                && slave_state.data_hash != master_state.data_hash
            {
                let err = Error::DataHashMismatch {
                    master: master_state.data_hash,
                    slave: slave_state.data_hash,
                };
                stat.last_error = Some(err.clone());
                last_result = Err(err);
            }
        }

        let status = if terminating { "terminated" } else { "done" };
        if stat.errors > 0 {
            error!(namespace = ns_name, "sync {status}: {stat}lsn #{}", slave_state.last_lsn);
        } else {
            info!(namespace = ns_name, "sync {status}: {stat}lsn #{}", slave_state.last_lsn);
        }

        last_result
    }

    /// Applies one WAL record to the slave namespace.
    fn apply_wal_record(
        &self,
        lsn: Lsn,
        ns_name: &str,
        slave_ns: Option<&Arc<Namespace>>,
        record: &WalRecord,
        stat: &mut SyncStat,
    ) -> Result<()> {
        match record {
            WalRecord::ItemModify { cjson, mode } => {
                let master_tags = self.master()?.tags_matcher(ns_name)?;
                self.apply_item_cjson(lsn, ns_name, slave_ns, cjson, *mode, &master_tags, stat)
            }
            WalRecord::IndexAdd { def } => {
                let ns = require_ns(slave_ns, ns_name)?;
                let result = IndexDef::from_json(def).and_then(|d| ns.add_index_replicated(&d));
                stat.updated_indexes += 1;
                result
            }
            WalRecord::IndexUpdate { def } => {
                let ns = require_ns(slave_ns, ns_name)?;
                let result =
                    IndexDef::from_json(def).and_then(|d| ns.update_index_replicated(&d));
                stat.updated_indexes += 1;
                result
            }
            WalRecord::IndexDrop { def } => {
                let ns = require_ns(slave_ns, ns_name)?;
                let result = IndexDef::from_json(def).and_then(|d| ns.drop_index_replicated(&d));
                stat.deleted_indexes += 1;
                result
            }
            WalRecord::PutMeta { key, value } => {
                let ns = require_ns(slave_ns, ns_name)?;
                ns.put_meta_replicated(key, value)?;
                stat.updated_meta += 1;
                Ok(())
            }
            WalRecord::UpdateQuery { sql } => {
                let ns = require_ns(slave_ns, ns_name)?;
                match Query::from_sql(sql) {
                    Ok(query) if query.query_type == QueryType::Delete => {
                        ns.apply_replicated_query(&query)?;
                        Ok(())
                    }
                    Ok(_) | Err(_) => {
                        // Only DELETE is replayed from query records;
                        // other statement kinds are a documented gap.
                        warn!(namespace = ns_name, sql = %sql, "unhandled query type in WAL record");
                        Ok(())
                    }
                }
            }
            WalRecord::NamespaceAdd => self.slave.open_namespace(ns_name, slave_opts()),
            WalRecord::NamespaceDrop => self.slave.close_namespace(ns_name, true),
            WalRecord::ReplState { state } => {
                // Not an applied mutation.
                stat.processed -= 1;
                let master_state = ReplicationState::from_json(state)?;
                let cluster_id = self.config.read().cluster_id;
                stat.master_state = Some(master_state);
                if master_state.cluster_id != cluster_id {
                    self.terminate.store(true, Ordering::SeqCst);
                    return Err(Error::logic(format!(
                        "wrong cluster ID: expected {cluster_id}, got {} from master. Terminating replicator",
                        master_state.cluster_id
                    )));
                }
                Ok(())
            }
        }
    }

    /// Builds a slave-side item from a CJSON payload and applies it.
    #[allow(clippy::too_many_arguments)]
    fn apply_item_cjson(
        &self,
        lsn: Lsn,
        ns_name: &str,
        slave_ns: Option<&Arc<Namespace>>,
        cjson: &[u8],
        mode: kitedb_core::ModifyMode,
        master_tags: &TagsMatcher,
        stat: &mut SyncStat,
    ) -> Result<()> {
        let ns = require_ns(slave_ns, ns_name)?;
        ns.merge_tags(master_tags)?;

        let mut item = ns.new_item();
        item.set_lsn(lsn);
        item.from_cjson(cjson)?;
        ns.apply_replicated(&mut item, mode)?;
        match mode {
            kitedb_core::ModifyMode::Delete => stat.deleted += 1,
            _ => stat.updated += 1,
        }
        Ok(())
    }

    /// Decides whether a live streamed update may be applied now.
    ///
    /// During catch-up for the same namespace the update is dropped
    /// and only raises `max_lsn`; the catch-up loop then re-fetches it
    /// through the WAL.
    fn can_apply_update(&self, lsn: Lsn, ns_name: &str) -> bool {
        if !self.config.read().sync_enabled(ns_name) {
            return false;
        }
        if !self.syncing.load(Ordering::SeqCst) {
            return true;
        }
        let mut cursor = self.cursor.lock();
        if !ns_name.eq_ignore_ascii_case(&cursor.ns_name) {
            return true;
        }
        trace!(
            namespace = ns_name,
            lsn,
            max_lsn = cursor.max_lsn,
            "skipping update due to concurrent sync"
        );
        if lsn > cursor.max_lsn {
            cursor.max_lsn = lsn;
        }
        false
    }
}

fn require_ns<'a>(
    slave_ns: Option<&'a Arc<Namespace>>,
    ns_name: &str,
) -> Result<&'a Arc<Namespace>> {
    slave_ns.ok_or_else(|| {
        Error::logic(format!(
            "slave namespace '{ns_name}' disappeared during apply"
        ))
    })
}

impl UpdateObserver for ReplicatorInner {
    fn on_wal_update(&self, lsn: Lsn, ns_name: &str, record: &WalRecord) {
        if !self.can_apply_update(lsn, ns_name) {
            return;
        }

        let slave_ns = self.slave.get_namespace(ns_name);
        let mut stat = SyncStat::default();
        match self.apply_wal_record(lsn, ns_name, slave_ns.as_ref(), record, &mut stat) {
            Ok(()) => {
                if let Some(ns) = slave_ns {
                    ns.set_slave_lsn(lsn);
                }
            }
            Err(err) => {
                error!(namespace = ns_name, lsn, "error applying WAL update: {err}");
            }
        }
    }

    fn on_connection_state(&self, status: Result<()>) {
        match status {
            Ok(()) => {
                trace!("connection established, requesting resync");
                self.signals.send(SIG_RESYNC);
            }
            Err(err) => {
                trace!("connection closed: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::master::InProcessMaster;

    fn test_replicator() -> Replicator {
        let slave = Arc::new(Engine::new());
        let replicator = Replicator::new(Arc::clone(&slave), |_config| {
            Ok(Arc::new(InProcessMaster::new(Arc::new(Engine::new()))) as Arc<dyn MasterClient>)
        });
        replicator.configure(ReplicationConfig::slave("inproc://"));
        replicator
    }

    #[test]
    fn live_update_passes_when_not_syncing() {
        let replicator = test_replicator();
        assert!(replicator.inner.can_apply_update(5, "docs"));
    }

    #[test]
    fn live_update_skipped_for_syncing_namespace() {
        let replicator = test_replicator();
        {
            let mut cursor = replicator.inner.cursor.lock();
            cursor.ns_name = "docs".into();
            cursor.max_lsn = NO_LSN;
        }
        replicator.inner.syncing.store(true, Ordering::SeqCst);

        // Same namespace: dropped, max_lsn raised.
        assert!(!replicator.inner.can_apply_update(42, "docs"));
        assert_eq!(replicator.inner.cursor.lock().max_lsn, 42);

        // A smaller LSN does not lower the cursor.
        assert!(!replicator.inner.can_apply_update(7, "docs"));
        assert_eq!(replicator.inner.cursor.lock().max_lsn, 42);

        // A different namespace applies live.
        assert!(replicator.inner.can_apply_update(42, "other"));
    }

    #[test]
    fn live_update_skipped_for_system_and_filtered_namespaces() {
        let replicator = test_replicator();
        assert!(!replicator.inner.can_apply_update(1, "#config"));

        replicator.configure(ReplicationConfig::slave("inproc://").with_namespaces(["docs"]));
        assert!(replicator.inner.can_apply_update(1, "docs"));
        assert!(!replicator.inner.can_apply_update(1, "other"));
    }

    #[test]
    fn configure_reports_restart_needed() {
        let replicator = test_replicator();
        // Not started: restart needed is always true.
        assert!(replicator.configure(ReplicationConfig::slave("inproc://a")));
    }

    #[test]
    fn stat_display_mirrors_counters() {
        let mut stat = SyncStat::default();
        assert_eq!(stat.to_string(), "Up to date; ");

        stat.updated = 3;
        stat.processed = 4;
        let dump = stat.to_string();
        assert!(dump.contains("3 items updated"));
        assert!(dump.contains("processed 4 WAL records"));
    }
}

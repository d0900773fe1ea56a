//! The in-memory engine implementing the collaborator contract.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::error::{Error, Result};
use crate::item::Item;
use crate::namespace::{Namespace, WalEvent};
use crate::query::{Query, QueryType};
use crate::results::QueryResults;
use crate::transaction::Transaction;
use crate::types::{IndexDef, ModifyMode, NamespaceDef, ResultFlags, StorageOpts};
use crate::wal::WalRecord;

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Cluster this engine belongs to; replication refuses to cross
    /// cluster boundaries.
    pub cluster_id: i32,
    /// Per-namespace WAL retention window, in records.
    pub wal_window: usize,
    /// Whether namespaces keep a WAL at all.
    pub enable_wal: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cluster_id: 0,
            wal_window: 4096,
            enable_wal: true,
        }
    }
}

impl EngineConfig {
    /// Sets the cluster ID.
    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: i32) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    /// Sets the WAL retention window.
    #[must_use]
    pub fn with_wal_window(mut self, window: usize) -> Self {
        self.wal_window = window;
        self
    }

    /// Disables the WAL entirely.
    #[must_use]
    pub fn without_wal(mut self) -> Self {
        self.enable_wal = false;
        self
    }
}

/// Receives streamed WAL updates from an engine (or a master client).
pub trait UpdateObserver: Send + Sync {
    /// A WAL record was produced for `ns_name` at `lsn`.
    fn on_wal_update(&self, lsn: crate::types::Lsn, ns_name: &str, record: &WalRecord);

    /// Transport connection state changed (master clients only).
    fn on_connection_state(&self, status: Result<()>) {
        let _ = status;
    }
}

/// An embeddable document engine: schema-flexible namespaces behind a
/// thread-safe facade.
///
/// Storage, index structures, and query planning are external
/// collaborators; this engine keeps everything in memory while
/// honoring the full collaborator contract.
pub struct Engine {
    config: EngineConfig,
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    observers: RwLock<Vec<Arc<dyn UpdateObserver>>>,
    storage_path: Mutex<Option<PathBuf>>,
}

impl Engine {
    /// Creates an engine with default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates an engine with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            namespaces: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            storage_path: Mutex::new(None),
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn ns(&self, name: &str) -> Result<Arc<Namespace>> {
        self.get_namespace(name)
            .ok_or_else(|| Error::not_found(format!("namespace '{name}' does not exist")))
    }

    /// Looks up a namespace handle.
    pub fn get_namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.read().get(name).cloned()
    }

    /// Opens (or creates) a namespace. Idempotent for existing ones.
    pub fn open_namespace(&self, name: &str, opts: StorageOpts) -> Result<()> {
        {
            let namespaces = self.namespaces.read();
            if let Some(existing) = namespaces.get(name) {
                existing.set_opts(opts);
                return Ok(());
            }
        }
        if !opts.create_if_missing {
            return Err(Error::not_found(format!(
                "namespace '{name}' does not exist"
            )));
        }
        let with_wal = self.config.enable_wal && !name.starts_with('#');
        let ns = Arc::new(Namespace::new(
            name,
            opts,
            self.config.cluster_id,
            self.config.wal_window,
            with_wal,
        ));
        self.namespaces.write().insert(name.to_owned(), ns);
        debug!(namespace = name, "namespace opened");
        self.notify(&[(0, WalRecord::NamespaceAdd)], name);
        Ok(())
    }

    /// Closes a namespace, optionally dropping its data.
    pub fn close_namespace(&self, name: &str, drop_data: bool) -> Result<()> {
        let removed = self.namespaces.write().remove(name);
        match removed {
            Some(_) => {
                if drop_data {
                    self.notify(&[(0, WalRecord::NamespaceDrop)], name);
                }
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "namespace '{name}' does not exist"
            ))),
        }
    }

    /// Drops a namespace and its data.
    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        self.close_namespace(name, true)
    }

    /// Enumerates namespace definitions, sorted by name.
    pub fn enum_namespaces(&self) -> Vec<NamespaceDef> {
        let mut defs: Vec<NamespaceDef> = self
            .namespaces
            .read()
            .values()
            .map(|ns| ns.def())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Records the storage root for the storage collaborator.
    pub fn enable_storage(&self, path: &str) -> Result<()> {
        std::fs::create_dir_all(path)
            .map_err(|e| Error::logic(format!("cannot create storage path '{path}': {e}")))?;
        *self.storage_path.lock() = Some(PathBuf::from(path));
        Ok(())
    }

    /// The storage root, when enabled.
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage_path.lock().clone()
    }

    /// Opens the reserved system namespaces.
    pub fn init_system_namespaces(&self) -> Result<()> {
        for name in ["#config", "#namespaces"] {
            self.open_namespace(name, StorageOpts::new().create_if_missing())?;
        }
        Ok(())
    }

    /// Flushes a namespace to the storage collaborator.
    pub fn commit(&self, ns_name: &str) -> Result<()> {
        self.ns(ns_name).map(|_| ())
    }

    /// Adds an index to a namespace.
    pub fn add_index(&self, ns_name: &str, def: &IndexDef) -> Result<()> {
        let event = self.ns(ns_name)?.add_index(def, false)?;
        self.notify_opt(event, ns_name);
        Ok(())
    }

    /// Alters an index.
    pub fn update_index(&self, ns_name: &str, def: &IndexDef) -> Result<()> {
        let event = self.ns(ns_name)?.update_index(def, false)?;
        self.notify_opt(event, ns_name);
        Ok(())
    }

    /// Drops an index.
    pub fn drop_index(&self, ns_name: &str, def: &IndexDef) -> Result<()> {
        let event = self.ns(ns_name)?.drop_index(def, false)?;
        self.notify_opt(event, ns_name);
        Ok(())
    }

    /// Writes a metadata key.
    pub fn put_meta(&self, ns_name: &str, key: &str, value: &str) -> Result<()> {
        let event = self.ns(ns_name)?.put_meta(key, value, false)?;
        self.notify_opt(event, ns_name);
        Ok(())
    }

    /// Reads a metadata key; missing keys read as empty.
    pub fn get_meta(&self, ns_name: &str, key: &str) -> Result<String> {
        Ok(self.ns(ns_name)?.get_meta(key))
    }

    /// Enumerates metadata keys.
    pub fn enum_meta(&self, ns_name: &str) -> Result<Vec<String>> {
        Ok(self.ns(ns_name)?.enum_meta())
    }

    /// Creates a fresh item for a namespace.
    pub fn new_item(&self, ns_name: &str) -> Result<Item> {
        Ok(self.ns(ns_name)?.new_item())
    }

    /// Inserts an item; errors if the key exists.
    pub fn insert(&self, ns_name: &str, item: &mut Item) -> Result<()> {
        self.modify(ns_name, item, ModifyMode::Insert)
    }

    /// Updates an item; errors if the key is missing.
    pub fn update(&self, ns_name: &str, item: &mut Item) -> Result<()> {
        self.modify(ns_name, item, ModifyMode::Update)
    }

    /// Inserts or replaces an item.
    pub fn upsert(&self, ns_name: &str, item: &mut Item) -> Result<()> {
        self.modify(ns_name, item, ModifyMode::Upsert)
    }

    /// Deletes an item by primary key.
    pub fn delete(&self, ns_name: &str, item: &mut Item) -> Result<()> {
        self.modify(ns_name, item, ModifyMode::Delete)
    }

    /// Applies one item modification.
    pub fn modify(&self, ns_name: &str, item: &mut Item, mode: ModifyMode) -> Result<()> {
        let event = self.ns(ns_name)?.modify(item, mode)?;
        self.notify_opt(event, ns_name);
        Ok(())
    }

    /// Executes a select query (items only, no replication extras).
    pub fn select(&self, query: &Query) -> Result<QueryResults> {
        self.select_with_flags(query, ResultFlags::default())
    }

    /// Executes a select query; with [`ResultFlags::WITH_RAW`] the
    /// result stream carries raw WAL records and leads with a
    /// replication-state record for convergence checks.
    pub fn select_with_flags(&self, query: &Query, flags: ResultFlags) -> Result<QueryResults> {
        let ns = self.ns(&query.namespace)?;
        let mut results = QueryResults::new();
        results.set_context(&query.namespace, ns.tags_snapshot());

        // Replication streams lead with the master's state so the
        // consumer can verify the cluster before applying anything.
        if flags.contains(ResultFlags::WITH_RAW) {
            let state = ns.repl_state();
            results.add_raw(
                state.last_lsn,
                WalRecord::ReplState {
                    state: state.to_json(),
                },
            );
        }

        if query.is_wal_query() {
            let from = query
                .wal_from()
                .ok_or_else(|| Error::params("WAL query requires an integer lsn bound"))?;
            for (lsn, record) in ns.wal_after(from)? {
                results.add_raw(lsn, record);
            }
        } else {
            for item in ns.select_where(query) {
                results.add_payload(item.lsn, item.id, item.payload);
            }
            for merge in &query.merge_queries {
                let sub = self.ns(&merge.namespace)?;
                for item in sub.select_where(merge) {
                    results.add_payload(item.lsn, item.id, item.payload);
                }
            }
        }
        Ok(results)
    }

    /// Executes a select from SQL text.
    pub fn select_sql(&self, sql: &str) -> Result<QueryResults> {
        let query = Query::from_sql(sql)?;
        if query.query_type != QueryType::Select {
            return Err(Error::params("only SELECT is valid here"));
        }
        self.select(&query)
    }

    /// Deletes items matching a query; the result carries the removed
    /// items.
    pub fn delete_query(&self, query: &Query) -> Result<QueryResults> {
        let ns = self.ns(&query.namespace)?;
        let (removed, event) = ns.delete_where(query)?;
        let mut results = QueryResults::new();
        results.set_context(&query.namespace, ns.tags_snapshot());
        for item in removed {
            results.add_payload(item.lsn, item.id, item.payload);
        }
        self.notify_opt(event, &query.namespace);
        Ok(results)
    }

    /// Starts a transaction bound to one namespace.
    pub fn new_transaction(&self, ns_name: &str) -> Result<Transaction> {
        self.ns(ns_name)?;
        Ok(Transaction::new(ns_name))
    }

    /// Applies a transaction's steps atomically with respect to
    /// readers of the namespace; emits every applied item in step
    /// order.
    pub fn commit_transaction(&self, tx: Transaction) -> Result<QueryResults> {
        let ns = self.ns(tx.namespace())?;
        let ns_name = tx.namespace().to_owned();
        let mut steps = tx.into_steps();
        let events = ns.apply_steps(&mut steps)?;

        let mut results = QueryResults::new();
        results.set_context(&ns_name, ns.tags_snapshot());
        for (item, _) in &steps {
            results.add_item(item);
        }
        self.notify(&events, &ns_name);
        Ok(results)
    }

    /// Discards a transaction's steps.
    pub fn rollback_transaction(&self, tx: Transaction) -> Result<()> {
        drop(tx);
        Ok(())
    }

    /// Subscribes or unsubscribes a WAL update observer.
    pub fn subscribe_updates(&self, observer: &Arc<dyn UpdateObserver>, subscribe: bool) {
        let mut observers = self.observers.write();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        if subscribe {
            observers.push(Arc::clone(observer));
        }
    }

    fn notify_opt(&self, event: Option<WalEvent>, ns_name: &str) {
        if let Some(event) = event {
            self.notify(std::slice::from_ref(&event), ns_name);
        }
    }

    fn notify(&self, events: &[WalEvent], ns_name: &str) {
        if events.is_empty() {
            return;
        }
        let observers = self.observers.read().clone();
        for (lsn, record) in events {
            for observer in &observers {
                observer.on_wal_update(*lsn, ns_name, record);
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CondType, KeyValue};
    use crate::results::ResultEntry;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    fn pk_index() -> IndexDef {
        IndexDef {
            name: "id".into(),
            index_type: "hash".into(),
            is_pk: true,
        }
    }

    fn engine_with_ns(name: &str) -> Engine {
        let engine = Engine::new();
        engine
            .open_namespace(name, StorageOpts::new().enabled().create_if_missing())
            .unwrap();
        engine.add_index(name, &pk_index()).unwrap();
        engine
    }

    fn upsert_json(engine: &Engine, ns: &str, payload: serde_json::Value) -> Item {
        let mut item = engine.new_item(ns).unwrap();
        item.set_payload(payload);
        engine.upsert(ns, &mut item).unwrap();
        item
    }

    #[test]
    fn open_requires_create_if_missing() {
        let engine = Engine::new();
        let err = engine
            .open_namespace("docs", StorageOpts::new().enabled())
            .unwrap_err();
        assert_eq!(err.code(), 13);
    }

    #[test]
    fn select_returns_upserted_items() {
        let engine = engine_with_ns("docs");
        upsert_json(&engine, "docs", json!({"id": 1, "v": "a"}));
        upsert_json(&engine, "docs", json!({"id": 2, "v": "b"}));

        let results = engine.select_sql("SELECT * FROM docs").unwrap();
        assert_eq!(results.len(), 2);

        let results = engine
            .select(&Query::new("docs").filter("v", CondType::Eq, KeyValue::Str("b".into())))
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn wal_select_carries_raw_records_and_state() {
        let engine = engine_with_ns("docs");
        upsert_json(&engine, "docs", json!({"id": 1}));

        let results = engine
            .select_with_flags(
                &Query::wal("docs", -1),
                ResultFlags::new(
                    ResultFlags::CJSON | ResultFlags::WITH_ITEM_ID | ResultFlags::WITH_RAW,
                ),
            )
            .unwrap();

        // leading repl state + index add + item modify
        assert_eq!(results.len(), 3);
        match results.iter().next().unwrap() {
            ResultEntry::Raw {
                record: WalRecord::ReplState { state },
                ..
            } => {
                let state = crate::types::ReplicationState::from_json(state).unwrap();
                assert_eq!(state.last_lsn, 2);
            }
            other => panic!("expected leading repl state, got {other:?}"),
        }
    }

    #[test]
    fn delete_query_removes_and_reports() {
        let engine = engine_with_ns("docs");
        for i in 0..4 {
            upsert_json(&engine, "docs", json!({"id": i}));
        }
        let query = Query::from_sql("DELETE FROM docs WHERE id < 2").unwrap();
        let results = engine.delete_query(&query).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(engine.select_sql("SELECT * FROM docs").unwrap().len(), 2);
    }

    #[test]
    fn transaction_commit_emits_items_in_step_order() {
        let engine = engine_with_ns("t");
        let mut tx = engine.new_transaction("t").unwrap();
        for i in 0..3 {
            let mut item = engine.new_item("t").unwrap();
            item.set_payload(json!({"id": i, "n": i * 10}));
            tx.modify(item, ModifyMode::Upsert);
        }
        let results = engine.commit_transaction(tx).unwrap();
        assert_eq!(results.len(), 3);
        let ids: Vec<i64> = results
            .iter()
            .map(|e| match e {
                ResultEntry::Item { payload, .. } => payload["id"].as_i64().unwrap(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(engine.select_sql("SELECT * FROM t").unwrap().len(), 3);
    }

    #[test]
    fn transaction_rollback_applies_nothing() {
        let engine = engine_with_ns("t");
        let mut tx = engine.new_transaction("t").unwrap();
        let mut item = engine.new_item("t").unwrap();
        item.set_payload(json!({"id": 1}));
        tx.modify(item, ModifyMode::Upsert);
        engine.rollback_transaction(tx).unwrap();
        assert!(engine.select_sql("SELECT * FROM t").unwrap().is_empty());
    }

    #[test]
    fn observers_see_item_modifications() {
        struct Recorder(PlMutex<Vec<(i64, String)>>);
        impl UpdateObserver for Recorder {
            fn on_wal_update(&self, lsn: i64, ns_name: &str, _record: &WalRecord) {
                self.0.lock().push((lsn, ns_name.to_owned()));
            }
        }

        let engine = engine_with_ns("docs");
        let recorder = Arc::new(Recorder(PlMutex::new(Vec::new())));
        let observer: Arc<dyn UpdateObserver> = recorder.clone();
        engine.subscribe_updates(&observer, true);

        upsert_json(&engine, "docs", json!({"id": 1}));
        assert_eq!(recorder.0.lock().len(), 1);

        engine.subscribe_updates(&observer, false);
        upsert_json(&engine, "docs", json!({"id": 2}));
        assert_eq!(recorder.0.lock().len(), 1);
    }

    #[test]
    fn enable_storage_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();
        let path = dir.path().join("db");
        engine.enable_storage(path.to_str().unwrap()).unwrap();
        assert_eq!(engine.storage_path().unwrap(), path);
        assert!(path.exists());
    }

    #[test]
    fn system_namespaces_are_created() {
        let engine = Engine::new();
        engine.init_system_namespaces().unwrap();
        assert!(engine.get_namespace("#config").is_some());
        assert!(engine.get_namespace("#namespaces").is_some());
    }

    #[test]
    fn enum_namespaces_is_sorted() {
        let engine = Engine::new();
        for name in ["b", "a", "c"] {
            engine
                .open_namespace(name, StorageOpts::new().create_if_missing())
                .unwrap();
        }
        let names: Vec<String> = engine
            .enum_namespaces()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}

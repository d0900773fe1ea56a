//! Namespaces: named item collections with indexes, meta, and a WAL.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use parking_lot::RwLock;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::cjson;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::query::{Query, QueryType};
use crate::tags::TagsMatcher;
use crate::types::{
    IndexDef, Lsn, ModifyMode, NamespaceDef, ReplicationState, StorageOpts, NO_LSN,
};
use crate::wal::WalRecord;

/// Primary-key value of a stored item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ItemKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(String),
}

/// An item at rest inside a namespace.
#[derive(Debug, Clone)]
pub struct StoredItem {
    /// Engine-managed item ID.
    pub id: u64,
    /// LSN of the last modification.
    pub lsn: Lsn,
    /// Item payload.
    pub payload: Value,
}

/// A WAL change event produced by a master-side mutation, handed to
/// the engine for observer notification.
pub(crate) type WalEvent = (Lsn, WalRecord);

struct NsState {
    opts: StorageOpts,
    indexes: Vec<IndexDef>,
    items: BTreeMap<ItemKey, StoredItem>,
    meta: BTreeMap<String, String>,
    tags: TagsMatcher,
    wal: Option<VecDeque<(Lsn, WalRecord)>>,
    wal_trimmed_to: Lsn,
    wal_window: usize,
    last_lsn: Lsn,
    data_hash: u64,
    cluster_id: i32,
    serial: i64,
    next_item_id: u64,
}

/// A named collection of items.
///
/// All mutation goes through the engine; the namespace serializes its
/// own state behind one lock, so operations on distinct namespaces
/// proceed concurrently.
pub struct Namespace {
    name: String,
    state: RwLock<NsState>,
}

impl Namespace {
    pub(crate) fn new(
        name: impl Into<String>,
        opts: StorageOpts,
        cluster_id: i32,
        wal_window: usize,
        with_wal: bool,
    ) -> Self {
        let name = name.into();
        let seed = name_seed(&name);
        Self {
            name: name.clone(),
            state: RwLock::new(NsState {
                opts,
                indexes: Vec::new(),
                items: BTreeMap::new(),
                meta: BTreeMap::new(),
                tags: TagsMatcher::new(seed),
                wal: with_wal.then(VecDeque::new),
                wal_trimmed_to: 0,
                wal_window,
                last_lsn: NO_LSN,
                data_hash: 0,
                cluster_id,
                serial: 0,
                next_item_id: 1,
            }),
        }
    }

    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open options the namespace carries.
    pub fn opts(&self) -> StorageOpts {
        self.state.read().opts
    }

    pub(crate) fn set_opts(&self, opts: StorageOpts) {
        self.state.write().opts = opts;
    }

    /// Definition of the namespace for enumeration.
    pub fn def(&self) -> NamespaceDef {
        let state = self.state.read();
        NamespaceDef {
            name: self.name.clone(),
            indexes: state.indexes.clone(),
        }
    }

    /// Creates a fresh item bound to this namespace's matcher snapshot.
    pub fn new_item(&self) -> Item {
        Item::new(self.state.read().tags.clone())
    }

    /// A snapshot of the tags matcher.
    pub fn tags_snapshot(&self) -> TagsMatcher {
        self.state.read().tags.clone()
    }

    /// Merges a broader matcher (from the master) into this namespace.
    pub fn merge_tags(&self, other: &TagsMatcher) -> Result<()> {
        let mut state = self.state.write();
        if state.tags.size() >= other.size() {
            return Ok(());
        }
        if !state.tags.try_merge(other) {
            return Err(Error::logic(format!(
                "tags matcher of '{}' is incompatible with the master's",
                self.name
            )));
        }
        Ok(())
    }

    /// Current replication state.
    pub fn repl_state(&self) -> ReplicationState {
        let state = self.state.read();
        ReplicationState {
            last_lsn: state.last_lsn,
            data_hash: state.data_hash,
            cluster_id: state.cluster_id,
        }
    }

    /// Sets the slave-side LSN after a replicated apply; never moves
    /// backwards.
    pub fn set_slave_lsn(&self, lsn: Lsn) {
        let mut state = self.state.write();
        if lsn > state.last_lsn {
            state.last_lsn = lsn;
        }
    }

    /// Applies a local (master-side) item modification.
    pub(crate) fn modify(&self, item: &mut Item, mode: ModifyMode) -> Result<Option<WalEvent>> {
        let mut state = self.state.write();
        if state.opts.slave_mode {
            return Err(Error::logic(format!(
                "namespace '{}' is in slave mode",
                self.name
            )));
        }
        Self::modify_locked(&mut state, item, mode, false)
    }

    /// Applies a batch of transaction steps under one lock.
    pub(crate) fn apply_steps(
        &self,
        steps: &mut [(Item, ModifyMode)],
    ) -> Result<Vec<WalEvent>> {
        let mut state = self.state.write();
        if state.opts.slave_mode {
            return Err(Error::logic(format!(
                "namespace '{}' is in slave mode",
                self.name
            )));
        }
        let mut events = Vec::new();
        for (item, mode) in steps.iter_mut() {
            if let Some(event) = Self::modify_locked(&mut state, item, *mode, false)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    /// Applies an item replicated from the master; the item's LSN was
    /// set by the replicator and the namespace WAL is not written.
    pub fn apply_replicated(&self, item: &mut Item, mode: ModifyMode) -> Result<()> {
        let mut state = self.state.write();
        Self::modify_locked(&mut state, item, mode, true)?;
        Ok(())
    }

    fn modify_locked(
        state: &mut NsState,
        item: &mut Item,
        mode: ModifyMode,
        replicated: bool,
    ) -> Result<Option<WalEvent>> {
        if !replicated && mode != ModifyMode::Delete {
            apply_precepts(state, item)?;
        }

        let (cjson_bytes, tags_updated) = cjson::encode(item.payload(), &mut state.tags)?;
        item.set_tags_updated(tags_updated);

        let key = item_key(state, item.payload())?;
        let changed = match mode {
            ModifyMode::Insert => {
                if state.items.contains_key(&key) {
                    return Err(Error::conflict(format!(
                        "item with key '{}' already exists",
                        key_display(&key)
                    )));
                }
                Self::store_locked(state, key.clone(), item, replicated);
                true
            }
            ModifyMode::Update => {
                if !state.items.contains_key(&key) {
                    return Err(Error::not_found(format!(
                        "item '{}' not found",
                        key_display(&key)
                    )));
                }
                Self::store_locked(state, key.clone(), item, replicated);
                true
            }
            ModifyMode::Upsert => {
                Self::store_locked(state, key.clone(), item, replicated);
                true
            }
            ModifyMode::Delete => {
                if let Some(old) = state.items.remove(&key) {
                    state.data_hash = state.data_hash.wrapping_sub(item_digest(&old.payload));
                    item.set_id(old.id);
                    true
                } else {
                    false
                }
            }
        };

        if replicated || !changed {
            return Ok(None);
        }

        let lsn = Self::next_lsn(state);
        item.set_lsn(lsn);
        if mode != ModifyMode::Delete {
            if let Some(stored) = state.items.get_mut(&key) {
                stored.lsn = lsn;
            }
        }
        let record = WalRecord::ItemModify {
            cjson: cjson_bytes,
            mode,
        };
        Self::append_wal(state, lsn, record.clone());
        Ok(Some((lsn, record)))
    }

    fn store_locked(state: &mut NsState, key: ItemKey, item: &mut Item, replicated: bool) {
        let digest = item_digest(item.payload());
        match state.items.get_mut(&key) {
            Some(existing) => {
                state.data_hash = state
                    .data_hash
                    .wrapping_sub(item_digest(&existing.payload))
                    .wrapping_add(digest);
                existing.payload = item.payload().clone();
                if replicated {
                    existing.lsn = item.lsn();
                }
                item.set_id(existing.id);
            }
            None => {
                let id = state.next_item_id;
                state.next_item_id += 1;
                state.data_hash = state.data_hash.wrapping_add(digest);
                state.items.insert(
                    key,
                    StoredItem {
                        id,
                        lsn: item.lsn(),
                        payload: item.payload().clone(),
                    },
                );
                item.set_id(id);
            }
        }
    }

    fn next_lsn(state: &mut NsState) -> Lsn {
        state.last_lsn = state.last_lsn.max(0) + 1;
        state.last_lsn
    }

    fn append_wal(state: &mut NsState, lsn: Lsn, record: WalRecord) {
        if let Some(wal) = state.wal.as_mut() {
            wal.push_back((lsn, record));
            while wal.len() > state.wal_window {
                if let Some((trimmed, _)) = wal.pop_front() {
                    state.wal_trimmed_to = trimmed;
                }
            }
        }
    }

    /// Adds an index definition.
    pub(crate) fn add_index(&self, def: &IndexDef, replicated: bool) -> Result<Option<WalEvent>> {
        let mut state = self.state.write();
        if let Some(existing) = state.indexes.iter().find(|i| i.name == def.name) {
            if existing == def {
                return Ok(None);
            }
            return Err(Error::conflict(format!(
                "index '{}' already exists with a different definition",
                def.name
            )));
        }
        state.indexes.push(def.clone());
        if replicated {
            return Ok(None);
        }
        let lsn = Self::next_lsn(&mut state);
        let record = WalRecord::IndexAdd {
            def: def.to_json(),
        };
        Self::append_wal(&mut state, lsn, record.clone());
        Ok(Some((lsn, record)))
    }

    /// Replaces an index definition.
    pub(crate) fn update_index(
        &self,
        def: &IndexDef,
        replicated: bool,
    ) -> Result<Option<WalEvent>> {
        let mut state = self.state.write();
        let slot = state
            .indexes
            .iter_mut()
            .find(|i| i.name == def.name)
            .ok_or_else(|| Error::not_found(format!("index '{}' not found", def.name)))?;
        *slot = def.clone();
        if replicated {
            return Ok(None);
        }
        let lsn = Self::next_lsn(&mut state);
        let record = WalRecord::IndexUpdate {
            def: def.to_json(),
        };
        Self::append_wal(&mut state, lsn, record.clone());
        Ok(Some((lsn, record)))
    }

    /// Drops an index by name.
    pub(crate) fn drop_index(&self, def: &IndexDef, replicated: bool) -> Result<Option<WalEvent>> {
        let mut state = self.state.write();
        let pos = state
            .indexes
            .iter()
            .position(|i| i.name == def.name)
            .ok_or_else(|| Error::not_found(format!("index '{}' not found", def.name)))?;
        state.indexes.remove(pos);
        if replicated {
            return Ok(None);
        }
        let lsn = Self::next_lsn(&mut state);
        let record = WalRecord::IndexDrop {
            def: def.to_json(),
        };
        Self::append_wal(&mut state, lsn, record.clone());
        Ok(Some((lsn, record)))
    }

    /// Writes a metadata key.
    pub(crate) fn put_meta(
        &self,
        key: &str,
        value: &str,
        replicated: bool,
    ) -> Result<Option<WalEvent>> {
        let mut state = self.state.write();
        state.meta.insert(key.to_owned(), value.to_owned());
        if replicated {
            return Ok(None);
        }
        let lsn = Self::next_lsn(&mut state);
        let record = WalRecord::PutMeta {
            key: key.to_owned(),
            value: value.to_owned(),
        };
        Self::append_wal(&mut state, lsn, record.clone());
        Ok(Some((lsn, record)))
    }

    /// Reads a metadata key; missing keys read as empty.
    pub fn get_meta(&self, key: &str) -> String {
        self.state.read().meta.get(key).cloned().unwrap_or_default()
    }

    /// Enumerates metadata keys.
    pub fn enum_meta(&self) -> Vec<String> {
        self.state.read().meta.keys().cloned().collect()
    }

    /// Snapshot of all items in key order.
    pub fn items_snapshot(&self) -> Vec<StoredItem> {
        self.state.read().items.values().cloned().collect()
    }

    /// Snapshot of items matching a query's filters.
    pub fn select_where(&self, query: &Query) -> Vec<StoredItem> {
        self.state
            .read()
            .items
            .values()
            .filter(|item| query.matches(&item.payload))
            .cloned()
            .collect()
    }

    /// Deletes items matching a query; returns the removed items.
    pub(crate) fn delete_where(
        &self,
        query: &Query,
    ) -> Result<(Vec<StoredItem>, Option<WalEvent>)> {
        let mut state = self.state.write();
        if state.opts.slave_mode && query.query_type == QueryType::Delete {
            return Err(Error::logic(format!(
                "namespace '{}' is in slave mode",
                self.name
            )));
        }
        let keys: Vec<ItemKey> = state
            .items
            .iter()
            .filter(|(_, item)| query.matches(&item.payload))
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed = Vec::new();
        for key in keys {
            if let Some(item) = state.items.remove(&key) {
                state.data_hash = state.data_hash.wrapping_sub(item_digest(&item.payload));
                removed.push(item);
            }
        }
        if removed.is_empty() {
            return Ok((removed, None));
        }
        let lsn = Self::next_lsn(&mut state);
        let record = WalRecord::UpdateQuery {
            sql: query.to_sql(),
        };
        Self::append_wal(&mut state, lsn, record.clone());
        Ok((removed, Some((lsn, record))))
    }

    /// Executes a replicated bulk query (from an `UpdateQuery` record).
    pub fn apply_replicated_query(&self, query: &Query) -> Result<usize> {
        let mut state = self.state.write();
        let keys: Vec<ItemKey> = state
            .items
            .iter()
            .filter(|(_, item)| query.matches(&item.payload))
            .map(|(k, _)| k.clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if let Some(item) = state.items.remove(&key) {
                state.data_hash = state.data_hash.wrapping_sub(item_digest(&item.payload));
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// WAL records with `lsn > from`.
    ///
    /// Fails with `noWAL` when the namespace has no WAL at all, and
    /// with `outdatedWAL` when retention already dropped records the
    /// caller still needs.
    pub fn wal_after(&self, from: Lsn) -> Result<Vec<(Lsn, WalRecord)>> {
        let state = self.state.read();
        let wal = state
            .wal
            .as_ref()
            .ok_or_else(|| Error::no_wal(format!("namespace '{}' has no WAL", self.name)))?;
        if state.wal_trimmed_to > 0 && from < state.wal_trimmed_to {
            return Err(Error::outdated_wal(format!(
                "WAL of '{}' is outdated: requested from lsn {}, retained from {}",
                self.name,
                from,
                state.wal_trimmed_to + 1
            )));
        }
        Ok(wal
            .iter()
            .filter(|(lsn, _)| *lsn > from)
            .cloned()
            .collect())
    }

    /// Drops WAL records with `lsn <= up_to` (retention / tests).
    pub fn trim_wal(&self, up_to: Lsn) {
        let mut state = self.state.write();
        if let Some(wal) = state.wal.as_mut() {
            while wal.front().is_some_and(|(lsn, _)| *lsn <= up_to) {
                wal.pop_front();
            }
        }
        if up_to > state.wal_trimmed_to {
            state.wal_trimmed_to = up_to;
        }
    }

    /// Number of stored items.
    pub fn item_count(&self) -> usize {
        self.state.read().items.len()
    }

    /// Adds an index copied from the replication stream; no WAL
    /// record is produced.
    pub fn add_index_replicated(&self, def: &IndexDef) -> Result<()> {
        self.add_index(def, true).map(|_| ())
    }

    /// Alters an index from the replication stream.
    pub fn update_index_replicated(&self, def: &IndexDef) -> Result<()> {
        self.update_index(def, true).map(|_| ())
    }

    /// Drops an index from the replication stream.
    pub fn drop_index_replicated(&self, def: &IndexDef) -> Result<()> {
        self.drop_index(def, true).map(|_| ())
    }

    /// Writes a metadata key from the replication stream.
    pub fn put_meta_replicated(&self, key: &str, value: &str) -> Result<()> {
        self.put_meta(key, value, true).map(|_| ())
    }
}

fn apply_precepts(state: &mut NsState, item: &mut Item) -> Result<()> {
    if item.precepts().is_empty() {
        return Ok(());
    }
    let precepts = item.precepts().to_vec();
    for precept in &precepts {
        let (field, func) = precept
            .split_once('=')
            .ok_or_else(|| Error::params(format!("invalid precept '{precept}'")))?;
        match func.trim() {
            "serial()" => {
                state.serial += 1;
                let serial = state.serial;
                if let Value::Object(obj) = item.payload_mut() {
                    obj.insert(field.trim().to_owned(), Value::from(serial));
                }
            }
            other => {
                return Err(Error::params(format!("unknown precept function '{other}'")))
            }
        }
    }
    Ok(())
}

fn item_key(state: &NsState, payload: &Value) -> Result<ItemKey> {
    let pk = state
        .indexes
        .iter()
        .find(|i| i.is_pk)
        .map(|i| i.name.as_str())
        .ok_or_else(|| Error::params("namespace has no primary-key index"))?;
    match payload.get(pk) {
        Some(Value::Number(n)) => n
            .as_i64()
            .map(ItemKey::Int)
            .ok_or_else(|| Error::params("primary key must be an integer or string")),
        Some(Value::String(s)) => Ok(ItemKey::Str(s.clone())),
        _ => Err(Error::params(format!(
            "item payload is missing primary key '{pk}'"
        ))),
    }
}

fn key_display(key: &ItemKey) -> String {
    match key {
        ItemKey::Int(v) => v.to_string(),
        ItemKey::Str(s) => s.clone(),
    }
}

/// First 8 bytes of SHA-256 over the canonical JSON payload.
///
/// Namespace `data_hash` is the wrapping sum of these digests, which
/// makes it independent of insertion order.
pub fn item_digest(payload: &Value) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();
    u64::from_le_bytes([
        digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
    ])
}

fn name_seed(name: &str) -> i32 {
    let mut seed: u32 = 0x811c_9dc5;
    for b in name.bytes() {
        seed ^= u32::from(b);
        seed = seed.wrapping_mul(0x0100_0193);
    }
    (seed & 0x7fff) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CondType, KeyValue};
    use serde_json::json;

    fn test_ns() -> Namespace {
        let ns = Namespace::new("docs", StorageOpts::new().enabled(), 1, 1024, true);
        ns.add_index(
            &IndexDef {
                name: "id".into(),
                index_type: "hash".into(),
                is_pk: true,
            },
            false,
        )
        .unwrap();
        ns
    }

    fn upsert(ns: &Namespace, payload: Value) -> Item {
        let mut item = ns.new_item();
        item.set_payload(payload);
        ns.modify(&mut item, ModifyMode::Upsert).unwrap();
        item
    }

    #[test]
    fn upsert_assigns_lsn_and_id() {
        let ns = test_ns();
        let item = upsert(&ns, json!({"id": 1, "v": "a"}));
        // Index add took lsn 1.
        assert_eq!(item.lsn(), 2);
        assert_eq!(item.id(), 1);
        assert!(item.is_tags_updated());
        assert_eq!(ns.item_count(), 1);
    }

    #[test]
    fn insert_conflicts_on_existing_key() {
        let ns = test_ns();
        upsert(&ns, json!({"id": 1}));
        let mut dup = ns.new_item();
        dup.set_payload(json!({"id": 1}));
        let err = ns.modify(&mut dup, ModifyMode::Insert).unwrap_err();
        assert_eq!(err.code(), 7);
    }

    #[test]
    fn update_requires_existing_key() {
        let ns = test_ns();
        let mut item = ns.new_item();
        item.set_payload(json!({"id": 1}));
        let err = ns.modify(&mut item, ModifyMode::Update).unwrap_err();
        assert_eq!(err.code(), 13);
    }

    #[test]
    fn delete_missing_is_a_noop() {
        let ns = test_ns();
        let before = ns.repl_state();
        let mut item = ns.new_item();
        item.set_payload(json!({"id": 42}));
        ns.modify(&mut item, ModifyMode::Delete).unwrap();
        assert_eq!(ns.repl_state(), before);
    }

    #[test]
    fn data_hash_is_order_independent() {
        let a = test_ns();
        upsert(&a, json!({"id": 1, "v": "x"}));
        upsert(&a, json!({"id": 2, "v": "y"}));

        let b = test_ns();
        upsert(&b, json!({"id": 2, "v": "y"}));
        upsert(&b, json!({"id": 1, "v": "x"}));

        assert_eq!(a.repl_state().data_hash, b.repl_state().data_hash);
    }

    #[test]
    fn data_hash_reverts_after_delete() {
        let ns = test_ns();
        upsert(&ns, json!({"id": 1, "v": "x"}));
        let hash_one = ns.repl_state().data_hash;

        upsert(&ns, json!({"id": 2, "v": "y"}));
        let mut del = ns.new_item();
        del.set_payload(json!({"id": 2}));
        ns.modify(&mut del, ModifyMode::Delete).unwrap();

        assert_eq!(ns.repl_state().data_hash, hash_one);
    }

    #[test]
    fn slave_mode_blocks_local_writes() {
        let ns = Namespace::new(
            "docs",
            StorageOpts::new().enabled().slave_mode(),
            1,
            1024,
            true,
        );
        ns.add_index(
            &IndexDef {
                name: "id".into(),
                index_type: "hash".into(),
                is_pk: true,
            },
            true,
        )
        .unwrap();
        let mut item = ns.new_item();
        item.set_payload(json!({"id": 1}));
        let err = ns.modify(&mut item, ModifyMode::Upsert).unwrap_err();
        assert_eq!(err.code(), 4);
    }

    #[test]
    fn replicated_apply_keeps_the_given_lsn() {
        let ns = Namespace::new(
            "docs",
            StorageOpts::new().enabled().slave_mode(),
            1,
            1024,
            true,
        );
        ns.add_index(
            &IndexDef {
                name: "id".into(),
                index_type: "hash".into(),
                is_pk: true,
            },
            true,
        )
        .unwrap();

        let mut item = ns.new_item();
        item.set_payload(json!({"id": 1}));
        item.set_lsn(17);
        ns.apply_replicated(&mut item, ModifyMode::Upsert).unwrap();

        // Replicated applies never advance last_lsn by themselves.
        assert_eq!(ns.repl_state().last_lsn, NO_LSN);
        ns.set_slave_lsn(17);
        assert_eq!(ns.repl_state().last_lsn, 17);
        assert_eq!(ns.items_snapshot()[0].lsn, 17);
    }

    #[test]
    fn set_slave_lsn_never_moves_backwards() {
        let ns = test_ns();
        ns.set_slave_lsn(10);
        ns.set_slave_lsn(5);
        assert_eq!(ns.repl_state().last_lsn, 10);
    }

    #[test]
    fn wal_after_filters_by_lsn() {
        let ns = test_ns();
        upsert(&ns, json!({"id": 1}));
        upsert(&ns, json!({"id": 2}));

        let records = ns.wal_after(NO_LSN).unwrap();
        assert_eq!(records.len(), 3); // index add + two items
        let records = ns.wal_after(2).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn trimmed_wal_reports_outdated() {
        let ns = test_ns();
        for i in 0..5 {
            upsert(&ns, json!({"id": i}));
        }
        ns.trim_wal(3);

        let err = ns.wal_after(1).unwrap_err();
        assert_eq!(err.code(), 16);
        // Requests past the trim point still work.
        assert!(ns.wal_after(3).is_ok());
    }

    #[test]
    fn namespace_without_wal_reports_no_wal() {
        let ns = Namespace::new("docs", StorageOpts::new(), 1, 1024, false);
        let err = ns.wal_after(NO_LSN).unwrap_err();
        assert_eq!(err.code(), 17);
    }

    #[test]
    fn wal_window_trims_oldest() {
        let ns = Namespace::new("docs", StorageOpts::new(), 1, 4, true);
        ns.add_index(
            &IndexDef {
                name: "id".into(),
                index_type: "hash".into(),
                is_pk: true,
            },
            false,
        )
        .unwrap();
        for i in 0..10 {
            let mut item = ns.new_item();
            item.set_payload(json!({"id": i}));
            ns.modify(&mut item, ModifyMode::Upsert).unwrap();
        }
        let err = ns.wal_after(NO_LSN).unwrap_err();
        assert_eq!(err.code(), 16);
    }

    #[test]
    fn serial_precept_assigns_increasing_ids() {
        let ns = test_ns();
        let mut first = ns.new_item();
        first.set_payload(json!({"v": "a"}));
        first.set_precepts(vec!["id=serial()".into()]);
        ns.modify(&mut first, ModifyMode::Upsert).unwrap();

        let mut second = ns.new_item();
        second.set_payload(json!({"v": "b"}));
        second.set_precepts(vec!["id=serial()".into()]);
        ns.modify(&mut second, ModifyMode::Upsert).unwrap();

        assert_eq!(first.payload()["id"], json!(1));
        assert_eq!(second.payload()["id"], json!(2));
    }

    #[test]
    fn unknown_precept_is_rejected() {
        let ns = test_ns();
        let mut item = ns.new_item();
        item.set_payload(json!({"id": 1}));
        item.set_precepts(vec!["id=now()".into()]);
        let err = ns.modify(&mut item, ModifyMode::Upsert).unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[test]
    fn meta_round_trip() {
        let ns = test_ns();
        ns.put_meta("schema", "v2", false).unwrap();
        assert_eq!(ns.get_meta("schema"), "v2");
        assert_eq!(ns.get_meta("missing"), "");
        assert_eq!(ns.enum_meta(), vec!["schema".to_owned()]);
    }

    #[test]
    fn delete_where_removes_and_records_query() {
        let ns = test_ns();
        for i in 0..5 {
            upsert(&ns, json!({"id": i}));
        }
        let query = Query::from_sql("DELETE FROM docs WHERE id >= 3").unwrap();
        let (removed, event) = ns.delete_where(&query).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(ns.item_count(), 3);
        match event {
            Some((_, WalRecord::UpdateQuery { sql })) => {
                assert_eq!(sql, "DELETE FROM docs WHERE id >= 3");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn select_where_filters() {
        let ns = test_ns();
        for i in 0..5 {
            upsert(&ns, json!({"id": i}));
        }
        let query = Query::new("docs").filter("id", CondType::Lt, KeyValue::Int(2));
        assert_eq!(ns.select_where(&query).len(), 2);
    }

    #[test]
    fn duplicate_index_with_same_def_is_idempotent() {
        let ns = test_ns();
        let def = IndexDef {
            name: "id".into(),
            index_type: "hash".into(),
            is_pk: true,
        };
        assert!(ns.add_index(&def, false).unwrap().is_none());

        let different = IndexDef {
            name: "id".into(),
            index_type: "tree".into(),
            is_pk: true,
        };
        assert_eq!(ns.add_index(&different, false).unwrap_err().code(), 7);
    }
}

//! Core type definitions for KiteDB.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Log sequence number assigned by the master per namespace.
///
/// `-1` means "no LSN yet" (fresh items, empty namespaces).
pub type Lsn = i64;

/// The "not yet assigned" LSN value.
pub const NO_LSN: Lsn = -1;

/// How an item-modify operation treats the existing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ModifyMode {
    /// Replace an existing item; error if missing.
    Update = 0,
    /// Add a new item; error if one already exists.
    Insert = 1,
    /// Insert or replace.
    Upsert = 2,
    /// Remove by primary key.
    Delete = 3,
}

impl ModifyMode {
    /// Converts a wire integer to a mode.
    pub fn from_u64(v: u64) -> Result<Self> {
        match v {
            0 => Ok(Self::Update),
            1 => Ok(Self::Insert),
            2 => Ok(Self::Upsert),
            3 => Ok(Self::Delete),
            other => Err(Error::params(format!("invalid modify mode {other}"))),
        }
    }

    /// The wire integer for this mode.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self as u64
    }
}

/// Payload encoding of an incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadFormat {
    /// Textual JSON.
    Json = 0,
    /// Compact binary CJSON.
    CJson = 1,
}

impl PayloadFormat {
    /// Converts a wire integer to a format.
    pub fn from_u64(v: u64) -> Result<Self> {
        match v {
            0 => Ok(Self::Json),
            1 => Ok(Self::CJson),
            other => Err(Error::params(format!("invalid source item format {other}"))),
        }
    }
}

/// Options applied when opening a namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOpts {
    /// Persist the namespace through the storage collaborator.
    pub enabled: bool,
    /// Create the namespace if it does not exist yet.
    pub create_if_missing: bool,
    /// Reject local mutations; only the replicator may write.
    pub slave_mode: bool,
}

impl StorageOpts {
    /// Creates empty options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            enabled: false,
            create_if_missing: false,
            slave_mode: false,
        }
    }

    /// Enables storage.
    #[must_use]
    pub const fn enabled(mut self) -> Self {
        self.enabled = true;
        self
    }

    /// Creates the namespace when missing.
    #[must_use]
    pub const fn create_if_missing(mut self) -> Self {
        self.create_if_missing = true;
        self
    }

    /// Marks the namespace slave-mode.
    #[must_use]
    pub const fn slave_mode(mut self) -> Self {
        self.slave_mode = true;
        self
    }
}

/// Bitmask controlling how query results are serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultFlags(pub u32);

impl ResultFlags {
    /// Items rendered as textual JSON.
    pub const JSON: u32 = 0x01;
    /// Items referenced by engine-managed IDs only.
    pub const PTRS: u32 = 0x02;
    /// Items rendered as CJSON.
    pub const CJSON: u32 = 0x04;
    /// Prepend each item with its internal ID.
    pub const WITH_ITEM_ID: u32 = 0x08;
    /// Include a payload-types block for stale caller matchers.
    pub const WITH_PAYLOAD_TYPES: u32 = 0x10;
    /// Include raw WAL records.
    pub const WITH_RAW: u32 = 0x20;

    /// Creates a flag set from raw bits.
    #[must_use]
    pub const fn new(bits: u32) -> Self {
        Self(bits)
    }

    /// Tests whether all `bits` are present.
    #[must_use]
    pub const fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

/// Definition of a secondary (or primary) index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index (and indexed field) name.
    pub name: String,
    /// Index structure: `hash`, `tree`, or `text`.
    #[serde(rename = "type", default = "IndexDef::default_type")]
    pub index_type: String,
    /// True for the primary-key index.
    #[serde(rename = "pk", default)]
    pub is_pk: bool,
}

impl IndexDef {
    fn default_type() -> String {
        "hash".to_owned()
    }

    /// Parses a definition from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Renders the definition as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Description of a namespace as enumerated from an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDef {
    /// Namespace name.
    pub name: String,
    /// Index definitions, in creation order.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

/// Per-namespace replication state.
///
/// `last_lsn` is monotonically non-decreasing; `data_hash` is the
/// order-independent content digest at `last_lsn`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationState {
    /// LSN of the last applied record.
    #[serde(rename = "lastLsn")]
    pub last_lsn: Lsn,
    /// Content digest at `last_lsn`.
    #[serde(rename = "dataHash")]
    pub data_hash: u64,
    /// Cluster the namespace belongs to.
    #[serde(rename = "clusterId")]
    pub cluster_id: i32,
}

impl ReplicationState {
    /// State of an empty namespace in the given cluster.
    #[must_use]
    pub const fn empty(cluster_id: i32) -> Self {
        Self {
            last_lsn: NO_LSN,
            data_hash: 0,
            cluster_id,
        }
    }

    /// Parses state from its JSON form.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Renders the state as JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modify_mode_wire_values() {
        assert_eq!(ModifyMode::from_u64(2).unwrap(), ModifyMode::Upsert);
        assert_eq!(ModifyMode::Delete.as_u64(), 3);
        assert!(ModifyMode::from_u64(9).is_err());
    }

    #[test]
    fn storage_opts_builder() {
        let opts = StorageOpts::new().enabled().create_if_missing().slave_mode();
        assert!(opts.enabled && opts.create_if_missing && opts.slave_mode);
    }

    #[test]
    fn index_def_json_roundtrip() {
        let def = IndexDef::from_json(r#"{"name":"id","type":"hash","pk":true}"#).unwrap();
        assert_eq!(def.name, "id");
        assert!(def.is_pk);
        let back = IndexDef::from_json(&def.to_json()).unwrap();
        assert_eq!(back, def);
    }

    #[test]
    fn index_def_defaults() {
        let def = IndexDef::from_json(r#"{"name":"v"}"#).unwrap();
        assert_eq!(def.index_type, "hash");
        assert!(!def.is_pk);
    }

    #[test]
    fn replication_state_json_field_names() {
        let state = ReplicationState {
            last_lsn: 20,
            data_hash: 7,
            cluster_id: 1,
        };
        let json = state.to_json();
        assert!(json.contains("lastLsn"));
        assert!(json.contains("dataHash"));
        assert!(json.contains("clusterId"));
        assert_eq!(ReplicationState::from_json(&json).unwrap(), state);
    }

    #[test]
    fn result_flags_contains() {
        let flags = ResultFlags::new(ResultFlags::CJSON | ResultFlags::WITH_RAW);
        assert!(flags.contains(ResultFlags::CJSON));
        assert!(!flags.contains(ResultFlags::JSON));
    }
}

//! WAL record variants and their wire encoding.

use kitedb_codec::{Decoder, Encoder};

use crate::error::Result;
use crate::types::ModifyMode;

const TAG_ITEM_MODIFY: u64 = 1;
const TAG_INDEX_ADD: u64 = 2;
const TAG_INDEX_DROP: u64 = 3;
const TAG_INDEX_UPDATE: u64 = 4;
const TAG_PUT_META: u64 = 5;
const TAG_UPDATE_QUERY: u64 = 6;
const TAG_NAMESPACE_ADD: u64 = 7;
const TAG_NAMESPACE_DROP: u64 = 8;
const TAG_REPL_STATE: u64 = 9;

/// A replayable change record, addressed by LSN within its namespace.
#[derive(Debug, Clone, PartialEq)]
pub enum WalRecord {
    /// An item was written or deleted.
    ItemModify {
        /// CJSON payload of the item.
        cjson: Vec<u8>,
        /// How the item was applied.
        mode: ModifyMode,
    },
    /// An index was added.
    IndexAdd {
        /// Index-definition JSON.
        def: String,
    },
    /// An index was dropped.
    IndexDrop {
        /// Index-definition JSON.
        def: String,
    },
    /// An index was altered.
    IndexUpdate {
        /// Index-definition JSON.
        def: String,
    },
    /// A metadata key was written.
    PutMeta {
        /// Metadata key.
        key: String,
        /// Metadata value.
        value: String,
    },
    /// A bulk query mutated the namespace.
    UpdateQuery {
        /// SQL text of the query.
        sql: String,
    },
    /// The namespace was created.
    NamespaceAdd,
    /// The namespace was dropped.
    NamespaceDrop,
    /// Master replication state snapshot.
    ReplState {
        /// Replication-state JSON.
        state: String,
    },
}

impl WalRecord {
    /// Encodes the record for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        match self {
            Self::ItemModify { cjson, mode } => {
                enc.put_varuint(TAG_ITEM_MODIFY);
                enc.put_varuint(mode.as_u64());
                enc.put_vbytes(cjson);
            }
            Self::IndexAdd { def } => {
                enc.put_varuint(TAG_INDEX_ADD);
                enc.put_vstring(def);
            }
            Self::IndexDrop { def } => {
                enc.put_varuint(TAG_INDEX_DROP);
                enc.put_vstring(def);
            }
            Self::IndexUpdate { def } => {
                enc.put_varuint(TAG_INDEX_UPDATE);
                enc.put_vstring(def);
            }
            Self::PutMeta { key, value } => {
                enc.put_varuint(TAG_PUT_META);
                enc.put_vstring(key);
                enc.put_vstring(value);
            }
            Self::UpdateQuery { sql } => {
                enc.put_varuint(TAG_UPDATE_QUERY);
                enc.put_vstring(sql);
            }
            Self::NamespaceAdd => enc.put_varuint(TAG_NAMESPACE_ADD),
            Self::NamespaceDrop => enc.put_varuint(TAG_NAMESPACE_DROP),
            Self::ReplState { state } => {
                enc.put_varuint(TAG_REPL_STATE);
                enc.put_vstring(state);
            }
        }
        enc.into_bytes()
    }

    /// Decodes a record from the wire.
    ///
    /// Unknown variant tags decode to `None`; readers skip them so new
    /// record kinds never break an older consumer.
    pub fn decode(bytes: &[u8]) -> Result<Option<Self>> {
        let mut dec = Decoder::new(bytes);
        let record = match dec.get_varuint()? {
            TAG_ITEM_MODIFY => {
                let mode = ModifyMode::from_u64(dec.get_varuint()?)?;
                let cjson = dec.get_vbytes()?.to_vec();
                Self::ItemModify { cjson, mode }
            }
            TAG_INDEX_ADD => Self::IndexAdd {
                def: dec.get_vstring()?,
            },
            TAG_INDEX_DROP => Self::IndexDrop {
                def: dec.get_vstring()?,
            },
            TAG_INDEX_UPDATE => Self::IndexUpdate {
                def: dec.get_vstring()?,
            },
            TAG_PUT_META => Self::PutMeta {
                key: dec.get_vstring()?,
                value: dec.get_vstring()?,
            },
            TAG_UPDATE_QUERY => Self::UpdateQuery {
                sql: dec.get_vstring()?,
            },
            TAG_NAMESPACE_ADD => Self::NamespaceAdd,
            TAG_NAMESPACE_DROP => Self::NamespaceDrop,
            TAG_REPL_STATE => Self::ReplState {
                state: dec.get_vstring()?,
            },
            _ => return Ok(None),
        };
        Ok(Some(record))
    }
}

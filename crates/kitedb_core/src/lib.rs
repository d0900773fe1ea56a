//! # KiteDB Core
//!
//! Core engine for KiteDB: an embeddable document database with
//! schema-flexible namespaces.
//!
//! This crate provides:
//! - The data model: items, tags matchers, CJSON payloads, precepts
//! - WAL record variants with wire encoding
//! - Queries (binary wire form and an SQL subset)
//! - Result containers and their serialization
//! - Transactions
//! - The in-memory engine implementing the collaborator contract
//!   consumed by the foreign boundary and the replicator

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cjson;
mod engine;
mod error;
mod item;
mod namespace;
mod query;
mod results;
mod tags;
mod transaction;
mod types;
mod wal;

pub use engine::{Engine, EngineConfig, UpdateObserver};
pub use error::{Error, Result, ERR_CODE_NOT_INITIALIZED};
pub use item::Item;
pub use namespace::{item_digest, ItemKey, Namespace, StoredItem};
pub use query::{CondType, JoinType, KeyValue, Query, QueryType, Where, LOG_ERROR, LSN_FIELD};
pub use results::{
    decode_results, DecodedEntry, DecodedResults, PayloadTypesBlock, QueryResults, ResultEntry,
};
pub use tags::TagsMatcher;
pub use transaction::Transaction;
pub use types::{
    IndexDef, Lsn, ModifyMode, NamespaceDef, PayloadFormat, ReplicationState, ResultFlags,
    StorageOpts, NO_LSN,
};
pub use wal::WalRecord;

pub mod cjson_codec {
    //! CJSON payload encode/decode entry points.
    pub use crate::cjson::{decode, encode};
}

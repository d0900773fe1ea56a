//! # KiteDB FFI
//!
//! Stable C ABI for KiteDB bindings.
//!
//! This crate provides:
//! - C-compatible entry points for the full engine command set
//! - Opaque integer handles for engines and transactions, validated
//!   at every entry point
//! - A bounded, reusable result-container pool with admission control
//! - Error-code mapping and message marshalling
//!
//! ## Memory Ownership
//!
//! - Input buffers and strings are caller-owned for the call duration
//! - Result buffers are engine-owned; return them via
//!   `kitedb_free_buffer` / `kitedb_free_buffers`
//! - Error messages are engine-allocated C strings; free them with
//!   `kitedb_free_cstring`
//!
//! ## Error Handling
//!
//! Entry points never panic; every failure surfaces as a structured
//! `{code, message}` pair. A result-producing call never returns a
//! container together with a non-zero error code.

#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod buffer;
mod database;
mod logger;
mod pool;
mod query;
mod registry;
mod transaction;
mod types;

pub use buffer::{kitedb_free_buffer, kitedb_free_buffers, kitedb_free_cstring};
pub use database::*;
pub use logger::{
    kitedb_disable_logger, kitedb_enable_logger, KitedbLogWriter, LOG_LEVEL_ERROR,
    LOG_LEVEL_INFO, LOG_LEVEL_TRACE, LOG_LEVEL_WARNING,
};
pub use pool::{ResultsPool, ResultsWrapper, MAX_CONCURRENT_QUERIES, RESULTS_POOL_SIZE};
pub use query::*;
pub use transaction::*;
pub use types::*;

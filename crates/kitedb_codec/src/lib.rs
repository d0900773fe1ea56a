//! # KiteDB Codec
//!
//! Compact binary wire codec for KiteDB.
//!
//! This crate provides:
//! - Little-endian varint/varuint primitives (LEB128, zigzag for signed)
//! - Length-prefixed strings and byte slices
//! - A positional encoder/decoder pair used by queries, items, results,
//!   and WAL records
//!
//! There is no framing or checksumming at this layer; callers own the
//! outer envelope.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use error::{CodecError, CodecResult};

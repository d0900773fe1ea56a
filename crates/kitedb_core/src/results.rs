//! Query results and their wire serialization.

use kitedb_codec::{Decoder, Encoder};
use serde_json::Value;

use crate::cjson;
use crate::error::{Error, Result};
use crate::item::Item;
use crate::tags::TagsMatcher;
use crate::types::{Lsn, ResultFlags};
use crate::wal::WalRecord;

/// One entry of a result stream.
#[derive(Debug, Clone)]
pub enum ResultEntry {
    /// A plain item.
    Item {
        /// LSN of the item's last modification.
        lsn: Lsn,
        /// Engine-managed item ID.
        id: u64,
        /// Item payload.
        payload: Value,
    },
    /// A raw WAL record (replication streams only).
    Raw {
        /// LSN of the record.
        lsn: Lsn,
        /// The record itself.
        record: WalRecord,
    },
}

impl ResultEntry {
    /// LSN of the entry.
    pub fn lsn(&self) -> Lsn {
        match self {
            Self::Item { lsn, .. } | Self::Raw { lsn, .. } => *lsn,
        }
    }
}

/// An ordered sequence of result entries plus the tags-matcher
/// snapshot they were produced under.
#[derive(Debug, Clone, Default)]
pub struct QueryResults {
    entries: Vec<ResultEntry>,
    tags: Option<TagsMatcher>,
    namespace: String,
}

impl QueryResults {
    /// Creates an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the namespace and matcher snapshot the entries belong to.
    pub fn set_context(&mut self, namespace: impl Into<String>, tags: TagsMatcher) {
        self.namespace = namespace.into();
        self.tags = Some(tags);
    }

    /// Namespace the results came from.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Matcher snapshot for CJSON re-encoding on the consumer side.
    pub fn tags_matcher(&self) -> Option<&TagsMatcher> {
        self.tags.as_ref()
    }

    /// Appends an applied item.
    pub fn add_item(&mut self, item: &Item) {
        self.entries.push(ResultEntry::Item {
            lsn: item.lsn(),
            id: item.id(),
            payload: item.payload().clone(),
        });
    }

    /// Appends a stored payload.
    pub fn add_payload(&mut self, lsn: Lsn, id: u64, payload: Value) {
        self.entries.push(ResultEntry::Item { lsn, id, payload });
    }

    /// Appends a raw WAL record.
    pub fn add_raw(&mut self, lsn: Lsn, record: WalRecord) {
        self.entries.push(ResultEntry::Raw { lsn, record });
    }

    /// Entry count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the entries in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ResultEntry> {
        self.entries.iter()
    }

    /// Clears entries and context for container reuse.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags = None;
        self.namespace.clear();
    }

    /// Serializes the results into `out` according to `flags`.
    ///
    /// Wire layout: varuint flags, varuint count, payload-types block
    /// (marker byte, then namespace + matcher dump when the caller's
    /// `pt_versions` lag behind the snapshot), then one entry per
    /// record: a kind byte, varint LSN, and a flags-dependent body.
    pub fn serialize(&self, out: &mut Encoder, flags: ResultFlags, pt_versions: &[i32]) -> Result<()> {
        out.put_varuint(u64::from(flags.0));
        out.put_varuint(self.entries.len() as u64);

        let tags = self.tags.clone().unwrap_or_else(|| TagsMatcher::new(0));
        let caller_version = pt_versions.first().copied().unwrap_or(-1);
        let send_types = flags.contains(ResultFlags::WITH_PAYLOAD_TYPES)
            && caller_version < tags.version() as i32;
        if send_types {
            out.put_u8(1);
            out.put_vstring(&self.namespace);
            out.put_varuint(u64::from(tags.version()));
            out.put_varint(i64::from(tags.state_token()));
            out.put_varuint(tags.names().len() as u64);
            for name in tags.names() {
                out.put_vstring(name);
            }
        } else {
            out.put_u8(0);
        }

        let mut cjson_tags = tags;
        for entry in &self.entries {
            match entry {
                ResultEntry::Item { lsn, id, payload } => {
                    out.put_u8(0);
                    out.put_varint(*lsn);
                    if flags.contains(ResultFlags::WITH_ITEM_ID) {
                        out.put_varuint(*id);
                    }
                    if flags.contains(ResultFlags::JSON) {
                        out.put_vstring(&payload.to_string());
                    } else if flags.contains(ResultFlags::CJSON) {
                        let (bytes, _) = cjson::encode(payload, &mut cjson_tags)?;
                        out.put_vbytes(&bytes);
                    } else {
                        out.put_varuint(*id);
                    }
                }
                ResultEntry::Raw { lsn, record } => {
                    if !flags.contains(ResultFlags::WITH_RAW) {
                        continue;
                    }
                    out.put_u8(1);
                    out.put_varint(*lsn);
                    out.put_vbytes(&record.encode());
                }
            }
        }
        Ok(())
    }
}

/// A payload-types block decoded from a result buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadTypesBlock {
    /// Namespace the matcher belongs to.
    pub namespace: String,
    /// Matcher version.
    pub version: u32,
    /// Matcher state token.
    pub state_token: i32,
    /// Field names in tag order.
    pub names: Vec<String>,
}

/// One decoded result entry, as seen by a binding.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedEntry {
    /// Item rendered as JSON text.
    Json {
        /// Entry LSN.
        lsn: Lsn,
        /// Item ID when requested.
        id: Option<u64>,
        /// JSON text.
        json: String,
    },
    /// Item rendered as CJSON bytes.
    CJson {
        /// Entry LSN.
        lsn: Lsn,
        /// Item ID when requested.
        id: Option<u64>,
        /// CJSON bytes.
        cjson: Vec<u8>,
    },
    /// Item referenced by ID only.
    Ptr {
        /// Entry LSN.
        lsn: Lsn,
        /// Item ID when requested in the header position.
        id: Option<u64>,
        /// Item ID reference.
        item_id: u64,
    },
    /// A raw WAL record.
    Raw {
        /// Entry LSN.
        lsn: Lsn,
        /// The record; `None` for unknown future variants.
        record: Option<WalRecord>,
    },
}

/// A decoded result buffer: the binding-side view of [`QueryResults::serialize`].
#[derive(Debug, Clone)]
pub struct DecodedResults {
    /// Flags the buffer was serialized with.
    pub flags: ResultFlags,
    /// Payload-types block, when the engine sent one.
    pub payload_types: Option<PayloadTypesBlock>,
    /// Decoded entries in stream order.
    pub entries: Vec<DecodedEntry>,
}

/// Decodes a serialized result buffer.
pub fn decode_results(bytes: &[u8]) -> Result<DecodedResults> {
    let mut dec = Decoder::new(bytes);
    let flags = ResultFlags::new(dec.get_varuint()? as u32);
    let count = dec.get_varuint()?;

    let payload_types = if dec.get_u8()? == 1 {
        let namespace = dec.get_vstring()?;
        let version = dec.get_varuint()? as u32;
        let state_token = dec.get_varint()? as i32;
        let name_count = dec.get_varuint()?;
        let mut names = Vec::new();
        for _ in 0..name_count {
            names.push(dec.get_vstring()?);
        }
        Some(PayloadTypesBlock {
            namespace,
            version,
            state_token,
            names,
        })
    } else {
        None
    };

    let mut entries = Vec::new();
    for _ in 0..count {
        if dec.eof() {
            // Raw entries are omitted when WITH_RAW is unset; the
            // count is an upper bound in that case.
            break;
        }
        match dec.get_u8()? {
            0 => {
                let lsn = dec.get_varint()?;
                let id = if flags.contains(ResultFlags::WITH_ITEM_ID) {
                    Some(dec.get_varuint()?)
                } else {
                    None
                };
                if flags.contains(ResultFlags::JSON) {
                    entries.push(DecodedEntry::Json {
                        lsn,
                        id,
                        json: dec.get_vstring()?,
                    });
                } else if flags.contains(ResultFlags::CJSON) {
                    entries.push(DecodedEntry::CJson {
                        lsn,
                        id,
                        cjson: dec.get_vbytes()?.to_vec(),
                    });
                } else {
                    entries.push(DecodedEntry::Ptr {
                        lsn,
                        id,
                        item_id: dec.get_varuint()?,
                    });
                }
            }
            1 => {
                let lsn = dec.get_varint()?;
                let record = WalRecord::decode(dec.get_vbytes()?)?;
                entries.push(DecodedEntry::Raw { lsn, record });
            }
            other => {
                return Err(Error::ParseBin(format!("invalid result entry kind {other}")))
            }
        }
    }

    Ok(DecodedResults {
        flags,
        payload_types,
        entries,
    })
}

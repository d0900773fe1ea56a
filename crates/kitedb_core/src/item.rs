//! Items: single documents moving through the engine.

use serde_json::Value;

use crate::cjson;
use crate::error::{Error, Result};
use crate::tags::TagsMatcher;
use crate::types::{Lsn, NO_LSN};

/// A document bound to one namespace.
///
/// An item is born from [`crate::Engine::new_item`] carrying a snapshot
/// of the namespace tags matcher, filled from a JSON or CJSON payload,
/// and handed back to the engine for apply. After apply it carries the
/// engine-assigned LSN and item ID.
#[derive(Debug, Clone)]
pub struct Item {
    payload: Value,
    tags: TagsMatcher,
    lsn: Lsn,
    id: u64,
    precepts: Vec<String>,
    tags_updated: bool,
}

impl Item {
    pub(crate) fn new(tags: TagsMatcher) -> Self {
        Self {
            payload: Value::Null,
            tags,
            lsn: NO_LSN,
            id: 0,
            precepts: Vec::new(),
            tags_updated: false,
        }
    }

    /// Fills the item from a textual JSON payload.
    ///
    /// Delete-mode payloads only need to carry the primary key; the
    /// apply path matches deletes by key and ignores other fields.
    pub fn from_json(&mut self, bytes: &[u8]) -> Result<()> {
        let value: Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(Error::params("item payload must be a JSON object"));
        }
        self.payload = value;
        Ok(())
    }

    /// Fills the item from a CJSON payload using its matcher snapshot.
    pub fn from_cjson(&mut self, bytes: &[u8]) -> Result<()> {
        self.payload = cjson::decode(bytes, &self.tags)?;
        Ok(())
    }

    /// Renders the payload as a JSON string.
    pub fn to_json(&self) -> String {
        self.payload.to_string()
    }

    /// The item payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut Value {
        &mut self.payload
    }

    pub fn set_payload(&mut self, payload: Value) {
        self.payload = payload;
    }

    /// The matcher snapshot the item was created against.
    pub fn tags(&self) -> &TagsMatcher {
        &self.tags
    }

    pub(crate) fn tags_mut(&mut self) -> &mut TagsMatcher {
        &mut self.tags
    }

    /// Token of the matcher snapshot; CJSON callers must match it.
    pub fn state_token(&self) -> i32 {
        self.tags.state_token()
    }

    /// Attaches server-side precepts, evaluated at apply time.
    pub fn set_precepts(&mut self, precepts: Vec<String>) {
        self.precepts = precepts;
    }

    /// The attached precepts.
    pub fn precepts(&self) -> &[String] {
        &self.precepts
    }

    /// LSN assigned on apply (`-1` before).
    pub fn lsn(&self) -> Lsn {
        self.lsn
    }

    /// Sets the LSN; used by the replicator before a slave-side apply.
    pub fn set_lsn(&mut self, lsn: Lsn) {
        self.lsn = lsn;
    }

    /// Engine-managed item ID assigned on apply (0 before).
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    /// True when applying this item grew the namespace tags matcher.
    pub fn is_tags_updated(&self) -> bool {
        self.tags_updated
    }

    pub(crate) fn set_tags_updated(&mut self, updated: bool) {
        self.tags_updated = updated;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_requires_object() {
        let mut item = Item::new(TagsMatcher::new(1));
        assert!(item.from_json(b"[1,2]").is_err());
        assert!(item.from_json(b"{\"id\":1}").is_ok());
        assert_eq!(item.payload(), &json!({"id": 1}));
    }

    #[test]
    fn from_json_reports_parse_errors() {
        let mut item = Item::new(TagsMatcher::new(1));
        let err = item.from_json(b"{oops").unwrap_err();
        assert_eq!(err.code(), 5);
    }

    #[test]
    fn cjson_roundtrip_through_item() {
        let mut tm = TagsMatcher::new(1);
        let payload = json!({"id": 7, "v": "x"});
        let (bytes, _) = crate::cjson::encode(&payload, &mut tm).unwrap();

        let mut item = Item::new(tm);
        item.from_cjson(&bytes).unwrap();
        assert_eq!(item.payload(), &payload);
    }

    #[test]
    fn fresh_item_has_no_lsn() {
        let item = Item::new(TagsMatcher::new(1));
        assert_eq!(item.lsn(), NO_LSN);
        assert_eq!(item.id(), 0);
        assert!(!item.is_tags_updated());
    }
}

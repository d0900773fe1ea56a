//! Queries: condition model, wire form, and the SQL subset.

use kitedb_codec::{Decoder, Encoder};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::Lsn;

/// The WAL pseudo-field: a query conditioned on it addresses the
/// namespace WAL rather than item storage.
pub const LSN_FIELD: &str = "#lsn";

/// Debug level at which failed queries are logged.
pub const LOG_ERROR: i32 = 1;

/// Comparison applied by a single where-condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CondType {
    /// Field exists with a non-null value.
    Any = 0,
    /// Equal.
    Eq = 1,
    /// Less than.
    Lt = 2,
    /// Less than or equal.
    Le = 3,
    /// Greater than.
    Gt = 4,
    /// Greater than or equal.
    Ge = 5,
}

impl CondType {
    /// Converts a wire integer to a condition.
    pub fn from_u64(v: u64) -> Result<Self> {
        match v {
            0 => Ok(Self::Any),
            1 => Ok(Self::Eq),
            2 => Ok(Self::Lt),
            3 => Ok(Self::Le),
            4 => Ok(Self::Gt),
            5 => Ok(Self::Ge),
            other => Err(Error::params(format!("invalid condition type {other}"))),
        }
    }

    fn sql_op(self) -> &'static str {
        match self {
            Self::Any => "IS NOT NULL",
            Self::Eq => "=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// How a trailing sub-query combines with the primary query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JoinType {
    /// Left join.
    Left = 0,
    /// Inner join.
    Inner = 1,
    /// Inner join in an OR chain.
    OrInner = 2,
    /// Merge result sets.
    Merge = 3,
}

impl JoinType {
    /// Converts a wire integer to a join type.
    pub fn from_u64(v: u64) -> Result<Self> {
        match v {
            0 => Ok(Self::Left),
            1 => Ok(Self::Inner),
            2 => Ok(Self::OrInner),
            3 => Ok(Self::Merge),
            other => Err(Error::params(format!("invalid join type {other}"))),
        }
    }
}

/// A condition value.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Double(f64),
    /// String value.
    Str(String),
}

impl KeyValue {
    fn encode(&self, enc: &mut Encoder) {
        match self {
            Self::Int(v) => {
                enc.put_u8(0);
                enc.put_varint(*v);
            }
            Self::Double(v) => {
                enc.put_u8(1);
                enc.put_double(*v);
            }
            Self::Str(v) => {
                enc.put_u8(2);
                enc.put_vstring(v);
            }
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        match dec.get_u8()? {
            0 => Ok(Self::Int(dec.get_varint()?)),
            1 => Ok(Self::Double(dec.get_double()?)),
            2 => Ok(Self::Str(dec.get_vstring()?)),
            other => Err(Error::ParseBin(format!("invalid key value type {other}"))),
        }
    }

    /// Compares against a payload field value; `None` for incomparable types.
    pub fn compare(&self, field: &Value) -> Option<std::cmp::Ordering> {
        match (self, field) {
            (Self::Int(v), Value::Number(n)) => n.as_f64()?.partial_cmp(&(*v as f64)),
            (Self::Double(v), Value::Number(n)) => n.as_f64()?.partial_cmp(v),
            (Self::Str(v), Value::String(s)) => Some(s.as_str().cmp(v.as_str())),
            _ => None,
        }
    }

    fn sql_literal(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::Double(v) => v.to_string(),
            Self::Str(v) => format!("'{v}'"),
        }
    }
}

/// A single where-condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    /// Field the condition applies to.
    pub field: String,
    /// Comparison type.
    pub cond: CondType,
    /// Condition values (empty for `Any`).
    pub values: Vec<KeyValue>,
}

/// What the query does to matching items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Read items.
    Select,
    /// Remove items.
    Delete,
}

/// A query over one namespace, with optional joined/merged sub-queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Target namespace.
    pub namespace: String,
    /// What the query does.
    pub query_type: QueryType,
    /// Conditions, combined with AND.
    pub filters: Vec<Where>,
    /// Debug level; propagated to every sub-query.
    pub debug_level: i32,
    /// How this query joins its parent (sub-queries only).
    pub join_type: JoinType,
    /// Sub-queries merged into the result set.
    pub merge_queries: Vec<Query>,
    /// Sub-queries joined against the primary.
    pub join_queries: Vec<Query>,
}

impl Query {
    /// Creates a select-all query over a namespace.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            query_type: QueryType::Select,
            filters: Vec::new(),
            debug_level: 0,
            join_type: JoinType::Left,
            merge_queries: Vec::new(),
            join_queries: Vec::new(),
        }
    }

    /// Adds a where-condition.
    #[must_use]
    pub fn filter(mut self, field: impl Into<String>, cond: CondType, value: KeyValue) -> Self {
        self.filters.push(Where {
            field: field.into(),
            cond,
            values: vec![value],
        });
        self
    }

    /// The WAL catch-up query: all records with `lsn > from`.
    pub fn wal(namespace: impl Into<String>, from: Lsn) -> Self {
        Self::new(namespace).filter(LSN_FIELD, CondType::Gt, KeyValue::Int(from))
    }

    /// True when the query addresses the namespace WAL.
    pub fn is_wal_query(&self) -> bool {
        self.filters
            .iter()
            .any(|w| w.field == LSN_FIELD && w.cond == CondType::Gt)
    }

    /// The `lsn >` bound of a WAL query.
    pub fn wal_from(&self) -> Option<Lsn> {
        self.filters
            .iter()
            .find(|w| w.field == LSN_FIELD && w.cond == CondType::Gt)
            .and_then(|w| match w.values.first() {
                Some(KeyValue::Int(v)) => Some(*v),
                _ => None,
            })
    }

    /// Encodes this query alone (no sub-queries).
    pub fn serialize(&self, enc: &mut Encoder) {
        enc.put_vstring(&self.namespace);
        enc.put_u8(match self.query_type {
            QueryType::Select => 0,
            QueryType::Delete => 1,
        });
        enc.put_varint(i64::from(self.debug_level));
        enc.put_varuint(self.filters.len() as u64);
        for w in &self.filters {
            enc.put_vstring(&w.field);
            enc.put_varuint(w.cond as u64);
            enc.put_varuint(w.values.len() as u64);
            for v in &w.values {
                v.encode(enc);
            }
        }
    }

    /// Decodes one query (no sub-queries).
    pub fn deserialize(dec: &mut Decoder<'_>) -> Result<Self> {
        let namespace = dec.get_vstring()?;
        let query_type = match dec.get_u8()? {
            0 => QueryType::Select,
            1 => QueryType::Delete,
            other => return Err(Error::ParseBin(format!("invalid query type {other}"))),
        };
        let debug_level = dec.get_varint()? as i32;
        let filter_count = dec.get_varuint()?;
        let mut filters = Vec::new();
        for _ in 0..filter_count {
            let field = dec.get_vstring()?;
            let cond = CondType::from_u64(dec.get_varuint()?)?;
            let value_count = dec.get_varuint()?;
            let mut values = Vec::new();
            for _ in 0..value_count {
                values.push(KeyValue::decode(dec)?);
            }
            filters.push(Where {
                field,
                cond,
                values,
            });
        }
        Ok(Self {
            namespace,
            query_type,
            filters,
            debug_level,
            join_type: JoinType::Left,
            merge_queries: Vec::new(),
            join_queries: Vec::new(),
        })
    }

    /// Encodes the query followed by its sub-queries, each prefixed
    /// with its join type.
    pub fn encode_packed(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.serialize(&mut enc);
        for sub in self.join_queries.iter().chain(&self.merge_queries) {
            enc.put_varuint(sub.join_type as u64);
            sub.serialize(&mut enc);
        }
        enc.into_bytes()
    }

    /// Decodes a packed query: one primary, then `joinType + query`
    /// pairs until end of buffer. `Merge` sub-queries join the merge
    /// list, all others the join list; the primary's debug level
    /// propagates to every sub-query.
    pub fn decode_packed(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut query = Self::deserialize(dec)?;
        while !dec.eof() {
            let join_type = JoinType::from_u64(dec.get_varuint()?)?;
            let mut sub = Self::deserialize(dec)?;
            sub.join_type = join_type;
            sub.debug_level = query.debug_level;
            if join_type == JoinType::Merge {
                query.merge_queries.push(sub);
            } else {
                query.join_queries.push(sub);
            }
        }
        Ok(query)
    }

    /// Parses the supported SQL subset:
    /// `SELECT * FROM ns [WHERE field op value]` and
    /// `DELETE FROM ns [WHERE field op value]`.
    pub fn from_sql(sql: &str) -> Result<Self> {
        let tokens: Vec<&str> = sql.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(Error::parse_sql("empty query"));
        }

        let (query_type, mut pos) = match tokens[0].to_ascii_uppercase().as_str() {
            "SELECT" => {
                if tokens.get(1).copied() != Some("*") {
                    return Err(Error::parse_sql("only SELECT * is supported"));
                }
                (QueryType::Select, 2)
            }
            "DELETE" => (QueryType::Delete, 1),
            other => {
                return Err(Error::parse_sql(format!(
                    "unsupported statement '{other}'"
                )))
            }
        };

        if tokens
            .get(pos)
            .map(|t| t.to_ascii_uppercase())
            .as_deref()
            != Some("FROM")
        {
            return Err(Error::parse_sql("expected FROM"));
        }
        pos += 1;
        let namespace = tokens
            .get(pos)
            .ok_or_else(|| Error::parse_sql("expected namespace after FROM"))?
            .to_string();
        pos += 1;

        let mut query = Self::new(namespace);
        query.query_type = query_type;

        if let Some(kw) = tokens.get(pos) {
            if !kw.eq_ignore_ascii_case("WHERE") {
                return Err(Error::parse_sql(format!("unexpected token '{kw}'")));
            }
            let field = tokens
                .get(pos + 1)
                .ok_or_else(|| Error::parse_sql("expected field after WHERE"))?;
            let op = tokens
                .get(pos + 2)
                .ok_or_else(|| Error::parse_sql("expected operator"))?;
            let raw = tokens
                .get(pos + 3)
                .ok_or_else(|| Error::parse_sql("expected value"))?;
            let cond = match *op {
                "=" | "==" => CondType::Eq,
                "<" => CondType::Lt,
                "<=" => CondType::Le,
                ">" => CondType::Gt,
                ">=" => CondType::Ge,
                other => {
                    return Err(Error::parse_sql(format!("unsupported operator '{other}'")))
                }
            };
            let value = if let Some(stripped) =
                raw.strip_prefix('\'').and_then(|r| r.strip_suffix('\''))
            {
                KeyValue::Str(stripped.to_owned())
            } else if let Ok(int) = raw.parse::<i64>() {
                KeyValue::Int(int)
            } else if let Ok(dbl) = raw.parse::<f64>() {
                KeyValue::Double(dbl)
            } else {
                return Err(Error::parse_sql(format!("unparsable value '{raw}'")));
            };
            query = query.filter(field.to_string(), cond, value);
        }

        Ok(query)
    }

    /// Renders the query back to its SQL subset form.
    pub fn to_sql(&self) -> String {
        let mut sql = match self.query_type {
            QueryType::Select => format!("SELECT * FROM {}", self.namespace),
            QueryType::Delete => format!("DELETE FROM {}", self.namespace),
        };
        for (i, w) in self.filters.iter().enumerate() {
            let keyword = if i == 0 { "WHERE" } else { "AND" };
            match w.cond {
                CondType::Any => {
                    sql.push_str(&format!(" {keyword} {} IS NOT NULL", w.field));
                }
                cond => {
                    if let Some(v) = w.values.first() {
                        sql.push_str(&format!(
                            " {keyword} {} {} {}",
                            w.field,
                            cond.sql_op(),
                            v.sql_literal()
                        ));
                    }
                }
            }
        }
        sql
    }

    /// Evaluates the filters against one item payload.
    pub fn matches(&self, payload: &Value) -> bool {
        self.filters.iter().all(|w| {
            if w.field == LSN_FIELD {
                return true;
            }
            let field = match payload.get(&w.field) {
                Some(v) => v,
                None => return false,
            };
            match w.cond {
                CondType::Any => !field.is_null(),
                cond => w.values.iter().any(|v| {
                    matches!(
                        (cond, v.compare(field)),
                        (CondType::Eq, Some(std::cmp::Ordering::Equal))
                            | (CondType::Lt, Some(std::cmp::Ordering::Less))
                            | (
                                CondType::Le,
                                Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                            )
                            | (CondType::Gt, Some(std::cmp::Ordering::Greater))
                            | (
                                CondType::Ge,
                                Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                            )
                    )
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn packed_roundtrip_with_subqueries() {
        let mut query = Query::new("docs")
            .filter("id", CondType::Gt, KeyValue::Int(10))
            .filter("v", CondType::Eq, KeyValue::Str("a".into()));
        query.debug_level = 2;

        let mut joined = Query::new("users").filter("age", CondType::Ge, KeyValue::Int(18));
        joined.join_type = JoinType::Inner;
        let mut merged = Query::new("archive");
        merged.join_type = JoinType::Merge;
        query.join_queries.push(joined);
        query.merge_queries.push(merged);

        let bytes = query.encode_packed();
        let mut dec = Decoder::new(&bytes);
        let decoded = Query::decode_packed(&mut dec).unwrap();

        assert_eq!(decoded.namespace, "docs");
        assert_eq!(decoded.filters, query.filters);
        assert_eq!(decoded.join_queries.len(), 1);
        assert_eq!(decoded.merge_queries.len(), 1);
        assert_eq!(decoded.join_queries[0].join_type, JoinType::Inner);
        // Debug level propagates into every sub-query.
        assert_eq!(decoded.join_queries[0].debug_level, 2);
        assert_eq!(decoded.merge_queries[0].debug_level, 2);
    }

    #[test]
    fn wal_query_detection() {
        let q = Query::wal("docs", 10);
        assert!(q.is_wal_query());
        assert_eq!(q.wal_from(), Some(10));
        assert!(!Query::new("docs").is_wal_query());
    }

    #[test]
    fn sql_select_roundtrip() {
        let q = Query::from_sql("SELECT * FROM docs WHERE id > 5").unwrap();
        assert_eq!(q.query_type, QueryType::Select);
        assert_eq!(q.namespace, "docs");
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.to_sql(), "SELECT * FROM docs WHERE id > 5");
    }

    #[test]
    fn sql_delete_with_string_value() {
        let q = Query::from_sql("DELETE FROM docs WHERE v = 'a'").unwrap();
        assert_eq!(q.query_type, QueryType::Delete);
        assert_eq!(q.filters[0].values[0], KeyValue::Str("a".into()));
    }

    #[test]
    fn sql_rejects_unsupported() {
        assert!(Query::from_sql("UPDATE docs SET x = 1").is_err());
        assert!(Query::from_sql("SELECT id FROM docs").is_err());
        assert!(Query::from_sql("").is_err());
    }

    #[test]
    fn filter_matching() {
        let q = Query::new("docs").filter("id", CondType::Gt, KeyValue::Int(10));
        assert!(q.matches(&json!({"id": 11})));
        assert!(!q.matches(&json!({"id": 10})));
        assert!(!q.matches(&json!({"other": 1})));

        let q = Query::new("docs").filter("v", CondType::Eq, KeyValue::Str("a".into()));
        assert!(q.matches(&json!({"v": "a"})));
        assert!(!q.matches(&json!({"v": "b"})));
    }
}

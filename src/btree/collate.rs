//! Key collation
//!
//! Comparators must match the ordering the index was built with, otherwise
//! traversal results are undefined.

use std::cmp::Ordering;

/// Total order over serialized keys
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

impl<F> KeyComparator for F
where
    F: Fn(&[u8], &[u8]) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self(a, b)
    }
}

/// Plain bytewise ordering
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCollator;

impl KeyComparator for RawCollator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Ordering for view index keys: emitted key first, then document id.
///
/// Keys that do not parse as view keys sort bytewise against each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct ViewKeyCollator;

impl KeyComparator for ViewKeyCollator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match (ViewKey::parse(a), ViewKey::parse(b)) {
            (Some(ka), Some(kb)) => ka
                .json
                .cmp(kb.json)
                .then_with(|| ka.doc_id.cmp(kb.doc_id)),
            _ => a.cmp(b),
        }
    }
}

/// Doc id that sorts after every valid (UTF-8) document id
const DOC_ID_CEILING: &[u8] = &[0xFF];

/// A view index key: `[json_len: u16 BE][json key][doc id]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewKey<'a> {
    /// Key emitted by the map function, as JSON text
    pub json: &'a [u8],
    /// Id of the document that emitted it
    pub doc_id: &'a [u8],
}

impl<'a> ViewKey<'a> {
    /// Split a serialized view key; `None` if the length prefix is inconsistent
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < 2 {
            return None;
        }
        let json_len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
        if bytes.len() < 2 + json_len {
            return None;
        }
        Some(Self {
            json: &bytes[2..2 + json_len],
            doc_id: &bytes[2 + json_len..],
        })
    }

    /// Serialize a view key
    pub fn encode(json: &[u8], doc_id: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + json.len() + doc_id.len());
        out.extend_from_slice(&(json.len() as u16).to_be_bytes());
        out.extend_from_slice(json);
        out.extend_from_slice(doc_id);
        out
    }

    /// Smallest serialized key carrying `json`
    pub fn lower_bound(json: &[u8]) -> Vec<u8> {
        Self::encode(json, &[])
    }

    /// Key sorting after every document that emitted `json`
    pub fn upper_bound(json: &[u8]) -> Vec<u8> {
        Self::encode(json, DOC_ID_CEILING)
    }
}

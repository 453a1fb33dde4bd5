//! Query parameters
//!
//! Parses the query string of a `/query` request into a traversal plan.

use crate::btree::{KeySelection, ViewKey};
use crate::config::Config;
use crate::error::{FoldError, Result};

/// A parsed `/query` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// View to traverse
    pub view: usize,
    /// Max rows streamed back
    pub limit: u64,
    /// Serialized key bounds or lookup keys
    pub selection: KeySelection,
}

impl Query {
    /// Parse a raw query string (without the leading `?`)
    pub fn parse(query_string: &str, config: &Config) -> Result<Self> {
        let mut view = 0usize;
        let mut limit = None;
        let mut start: Option<Vec<u8>> = None;
        let mut end: Option<Vec<u8>> = None;
        let mut key: Option<Vec<u8>> = None;
        let mut ids: Vec<Vec<u8>> = Vec::new();

        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            let (name, raw) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(raw)?;

            match name {
                "view" => view = parse_number(name, &value)? as usize,
                "limit" => limit = Some(parse_number(name, &value)?),
                "startkey" | "start_key" => start = Some(value),
                "endkey" | "end_key" => end = Some(value),
                "key" => key = Some(value),
                "id" => ids.push(value),
                other => {
                    tracing::debug!("Ignoring unknown query parameter {:?}", other);
                }
            }
        }

        let selection = match key {
            Some(key) => {
                if start.is_some() || end.is_some() {
                    return Err(FoldError::Protocol(
                        "key cannot be combined with startkey/endkey".to_string(),
                    ));
                }
                if ids.is_empty() {
                    KeySelection::Range {
                        start: Some(ViewKey::lower_bound(&key)),
                        end: Some(ViewKey::upper_bound(&key)),
                    }
                } else {
                    KeySelection::Keys(ids.iter().map(|id| ViewKey::encode(&key, id)).collect())
                }
            }
            None => {
                if !ids.is_empty() {
                    return Err(FoldError::Protocol("id requires key".to_string()));
                }
                KeySelection::Range {
                    start: start.as_deref().map(ViewKey::lower_bound),
                    end: end.as_deref().map(ViewKey::upper_bound),
                }
            }
        };

        Ok(Self {
            view,
            limit: config.effective_limit(limit),
            selection,
        })
    }
}

/// Split a request URL into path and query string
pub fn split_url(url: &str) -> (&str, &str) {
    url.split_once('?').unwrap_or((url, ""))
}

/// Decode `%XX` escapes and `+` as space
pub fn percent_decode(input: &str) -> Result<Vec<u8>> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).ok_or_else(|| {
                    FoldError::Protocol(format!("truncated escape in {:?}", input))
                })?;
                let hi = hex_value(hex[0]);
                let lo = hex_value(hex[1]);
                match (hi, lo) {
                    (Some(hi), Some(lo)) => out.push(hi << 4 | lo),
                    _ => {
                        return Err(FoldError::Protocol(format!(
                            "invalid escape in {:?}",
                            input
                        )))
                    }
                }
                i += 3;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn parse_number(name: &str, value: &[u8]) -> Result<u64> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .ok_or_else(|| {
            FoldError::Protocol(format!(
                "{} must be a non-negative integer, got {:?}",
                name,
                String::from_utf8_lossy(value)
            ))
        })
}

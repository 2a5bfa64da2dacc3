//! Decoder for pinned-map dump text.
//!
//! `bpftool map dump` output has no guaranteed schema: newer builds emit a
//! JSON array of key/value objects, older ones emit `key:`/`value:` line
//! pairs with hex-encoded bytes. This module turns either form into a
//! key → u64 mapping. The function is total: malformed entries are dropped
//! and the worst case is an empty map.

use ahash::AHashMap as HashMap;
use serde::Deserialize;
use std::borrow::Cow;

#[derive(Deserialize)]
struct JsonEntry {
    key: String,
    value: u64,
}

/// Parses a raw map dump into key → value pairs. Never fails.
pub fn parse_map_dump(raw: &str) -> HashMap<String, u64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return HashMap::new();
    }

    // Some bpftool builds print bare objects without the enclosing array.
    let candidate: Cow<'_, str> = if trimmed.starts_with('[') && trimmed.ends_with(']') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("[{trimmed}]"))
    };

    if let Ok(entries) = serde_json::from_str::<Vec<JsonEntry>>(&candidate) {
        let mut out = HashMap::with_capacity(entries.len());
        for entry in entries {
            // Later duplicates win.
            out.insert(entry.key, entry.value);
        }
        return out;
    }

    scan_lines(trimmed)
}

/// Line-oriented fallback for the plain `key:`/`value:` dump format.
fn scan_lines(raw: &str) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    let mut pending: Option<String> = None;

    for line in raw.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("key:") {
            pending = decode_hex_key(rest);
        } else if let Some(rest) = line.strip_prefix("value:") {
            // A value line with no pending key is dropped.
            if pending.is_some() {
                if let Some(value) = parse_numeral(rest.trim()) {
                    if let Some(key) = pending.take() {
                        out.insert(key, value);
                    }
                }
            }
        }
    }

    out
}

/// Decodes whitespace-separated hex bytes, strips trailing NUL padding and
/// interprets the rest as text. Returns None on any malformed byte.
fn decode_hex_key(hex: &str) -> Option<String> {
    let compact: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty()
        || compact.len() % 2 != 0
        || !compact.bytes().all(|b| b.is_ascii_hexdigit())
    {
        return None;
    }

    let mut bytes = Vec::with_capacity(compact.len() / 2);
    for i in (0..compact.len()).step_by(2) {
        let byte = u8::from_str_radix(&compact[i..i + 2], 16).ok()?;
        bytes.push(byte);
    }

    while bytes.last() == Some(&0) {
        bytes.pop();
    }

    Some(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parses a `0x`-prefixed hex numeral or a decimal numeral.
fn parse_numeral(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_hex_key_with_null_padding() {
        let parsed = parse_map_dump("key: 61 62 00\nvalue: 0x2a\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["ab"], 42);
    }

    #[test]
    fn decodes_decimal_values() {
        let parsed = parse_map_dump("key: 63 75 72 6c\nvalue: 17");
        assert_eq!(parsed["curl"], 17);
    }

    #[test]
    fn wraps_bare_json_objects() {
        let parsed = parse_map_dump(r#"{"key": "bash", "value": 3}"#);
        assert_eq!(parsed["bash"], 3);
    }

    #[test]
    fn value_without_pending_key_is_dropped() {
        let parsed = parse_map_dump("value: 12\nkey: 61\nvalue: 5");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["a"], 5);
    }

    #[test]
    fn malformed_hex_drops_the_entry() {
        let parsed = parse_map_dump("key: zz 61\nvalue: 5\nkey: 62\nvalue: 6");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["b"], 6);
    }

    #[test]
    fn non_ascii_key_lines_are_dropped() {
        // Multibyte characters must not trip the hex decoder.
        let parsed = parse_map_dump("key: €€\nvalue: 1\nkey: 61\nvalue: 2");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed["a"], 2);
    }

    #[test]
    fn garbage_yields_empty_map() {
        assert!(parse_map_dump("").is_empty());
        assert!(parse_map_dump("   \n\t").is_empty());
        assert!(parse_map_dump("no sensible structure here").is_empty());
        assert!(parse_map_dump("{\"half\": ").is_empty());
    }
}

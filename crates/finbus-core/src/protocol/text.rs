//! Legacy text codec (hand-rolled, recursive descent).
//!
//! Kept byte-compatible with the desktop client's fallback path, which is
//! why this module uses no parsing library and mirrors the legacy format's
//! quirks instead of fixing them:
//! - Strings are double-quoted with **no escape processing** on emission.
//! - Non-string, non-map, non-list scalars are emitted unquoted via their
//!   default textual form and decode back as **raw string tokens**, with no
//!   numeric or boolean coercion. Callers account for this.
//! - `type`/`content`/`status` are extracted by literal substring search;
//!   a field that does not match the `"<name>":"` shape reads as absent.
//! - An unrecognized or missing `status` reads as `PENDING`, never an error.
//!
//! Parsing rules:
//! - Never index blindly: every scan is bounds-checked, no `unwrap()` /
//!   `expect()` / `panic!()` on input paths.
//! - Comma splitting tracks brace depth, bracket depth, and quote state
//!   character by character, so commas inside nested structures or quoted
//!   strings never split a pair.

use serde_json::{Map, Value};

use crate::error::{FinbusError, Result};
use crate::protocol::{Envelope, EnvelopeCodec, Status};

#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

impl EnvelopeCodec for TextCodec {
    fn encode(&self, env: &Envelope) -> Result<String> {
        let mut out = String::with_capacity(64);
        out.push_str("{\"type\":\"");
        out.push_str(&env.msg_type);
        out.push_str("\",\"content\":\"");
        out.push_str(&env.content);
        out.push_str("\",\"status\":\"");
        out.push_str(env.status.as_str());
        out.push_str("\",\"data\":");
        write_object(&mut out, &env.data);
        out.push('}');
        Ok(out)
    }

    fn decode(&self, raw: &str) -> Result<Envelope> {
        let raw = raw.trim();
        if !raw.starts_with('{') || !raw.ends_with('}') {
            return Err(FinbusError::Decode("not a braced envelope".into()));
        }

        let msg_type = string_field(raw, "type").unwrap_or_default().to_string();
        let content = string_field(raw, "content").unwrap_or_default().to_string();
        let status = Status::parse(string_field(raw, "status").unwrap_or_default());
        let data = data_block(raw).map(parse_object).unwrap_or_default();

        Ok(Envelope {
            msg_type,
            content,
            status,
            data,
        })
    }
}

// --------------------
// Emission
// --------------------

fn write_object(out: &mut String, map: &Map<String, Value>) {
    out.push('{');
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('"');
        out.push_str(k);
        out.push_str("\":");
        write_value(out, v);
    }
    out.push('}');
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::String(s) => {
            out.push('"');
            out.push_str(s);
            out.push('"');
        }
        Value::Object(m) => write_object(out, m),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        // numbers, booleans, null: default textual form, unquoted
        other => out.push_str(&other.to_string()),
    }
}

// --------------------
// Field extraction
// --------------------

/// Literal search for `"<name>":"` followed by a scan to the next unescaped
/// quote. Not a general JSON parser: a field whose value contains an
/// unescaped quote, or that is not in this exact shape, reads as absent.
fn string_field<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("\"{name}\":\"");
    let start = raw.find(&needle)? + needle.len();
    let bytes = raw.as_bytes();
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'"' && bytes[i - 1] != b'\\' {
            return Some(&raw[start..i]);
        }
        i += 1;
    }
    None
}

/// Balanced `{...}` block following `"data":`, quote-aware.
fn data_block(raw: &str) -> Option<&str> {
    let start = raw.find("\"data\":")? + "\"data\":".len();
    let rest = raw[start..].trim_start();
    if !rest.starts_with('{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_quotes = false;
    for (i, b) in rest.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'{' if !in_quotes => depth += 1,
            b'}' if !in_quotes => {
                depth -= 1;
                if depth == 0 {
                    return Some(&rest[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

// --------------------
// Recursive descent over the payload bag
// --------------------

fn parse_object(block: &str) -> Map<String, Value> {
    let mut map = Map::new();
    let Some(inner) = strip_delimiters(block, '{', '}') else {
        return map;
    };
    for pair in split_top_level(inner) {
        if let Some((key, value)) = split_pair(pair) {
            map.insert(unquote(key.trim()).to_string(), parse_value(value));
        }
    }
    map
}

fn parse_array(block: &str) -> Vec<Value> {
    let Some(inner) = strip_delimiters(block, '[', ']') else {
        return Vec::new();
    };
    split_top_level(inner).into_iter().map(parse_value).collect()
}

/// Dispatch on the leading character: quoted string, nested object, nested
/// array, or a raw token passed through as a string.
fn parse_value(raw: &str) -> Value {
    let raw = raw.trim();
    match raw.chars().next() {
        Some('"') => Value::String(unquote(raw).to_string()),
        Some('{') => Value::Object(parse_object(raw)),
        Some('[') => Value::Array(parse_array(raw)),
        _ => Value::String(raw.to_string()),
    }
}

/// Split `inner` on commas at nesting depth zero. Tracks brace depth,
/// bracket depth, and quote state so nested structure stays intact.
fn split_top_level(inner: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut brace = 0usize;
    let mut bracket = 0usize;
    let mut in_quotes = false;
    let mut seg_start = 0usize;

    for (i, b) in inner.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'{' if !in_quotes => brace += 1,
            b'}' if !in_quotes => brace = brace.saturating_sub(1),
            b'[' if !in_quotes => bracket += 1,
            b']' if !in_quotes => bracket = bracket.saturating_sub(1),
            b',' if !in_quotes && brace == 0 && bracket == 0 => {
                parts.push(&inner[seg_start..i]);
                seg_start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&inner[seg_start..]);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// First `:` outside quotes separates key and value.
fn split_pair(pair: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    for (i, b) in pair.bytes().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b':' if !in_quotes => return Some((&pair[..i], &pair[i + 1..])),
            _ => {}
        }
    }
    None
}

fn strip_delimiters(block: &str, open: char, close: char) -> Option<&str> {
    block
        .trim()
        .strip_prefix(open)
        .and_then(|s| s.strip_suffix(close))
}

/// Trim one surrounding quote pair. No escape processing, by wire contract.
fn unquote(raw: &str) -> &str {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    }
}

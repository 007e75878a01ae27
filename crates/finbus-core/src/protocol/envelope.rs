//! The unit of exchange between client and server.
//!
//! An envelope carries a type tag (the dispatch key), a free-text content
//! line, a status, and an open string-keyed payload bag. The bag is always
//! present (an empty map, never a missing one), so callers read and write
//! it without null checks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome carried by an envelope. Defaults to `Pending` at construction;
/// the factory helpers set it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Status {
    Success,
    Error,
    #[default]
    Pending,
}

impl Status {
    /// String representation used on the wire (stable API).
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Error => "ERROR",
            Status::Pending => "PENDING",
        }
    }

    /// Lenient parse: anything unrecognized (or missing) reads as `Pending`.
    pub fn parse(s: &str) -> Self {
        match s {
            "SUCCESS" => Status::Success,
            "ERROR" => Status::Error,
            _ => Status::Pending,
        }
    }
}

impl From<String> for Status {
    fn from(s: String) -> Self {
        Status::parse(&s)
    }
}

impl From<Status> for String {
    fn from(s: Status) -> Self {
        s.as_str().to_string()
    }
}

/// Wire-level message: type tag, free text, status, payload bag.
///
/// Has no identity beyond structural equality; created per request or per
/// response and dropped after the write.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Dispatch key (field name is `type` on the wire). Echoed in responses.
    #[serde(rename = "type", default)]
    pub msg_type: String,
    /// Human-readable message, often an error or status line.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: Status,
    /// Open payload bag: string | number | bool | map | list | null.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Envelope {
    /// Envelope with a type tag and everything else at its default.
    pub fn new(msg_type: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            ..Self::default()
        }
    }

    /// SUCCESS envelope with the given tag and content.
    pub fn success(msg_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            content: content.into(),
            status: Status::Success,
            data: Map::new(),
        }
    }

    /// ERROR envelope with the given tag and content.
    pub fn error(msg_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            msg_type: msg_type.into(),
            content: content.into(),
            status: Status::Error,
            data: Map::new(),
        }
    }

    // Staged construction. Responses are often built field by field while a
    // handler works through its repository calls.

    pub fn set_type(&mut self, msg_type: impl Into<String>) -> &mut Self {
        self.msg_type = msg_type.into();
        self
    }

    pub fn set_content(&mut self, content: impl Into<String>) -> &mut Self {
        self.content = content.into();
        self
    }

    pub fn set_status(&mut self, status: Status) -> &mut Self {
        self.status = status;
        self
    }

    /// Put one payload entry.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Read one payload entry.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Builder-style `put` for one-expression construction.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

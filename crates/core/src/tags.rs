//! Custom tags - parsing the free-form tag string into a tags file.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Longest tag key, in characters.
pub const MAX_KEY_CHARS: usize = 128;

/// Longest tag value, in characters.
pub const MAX_VALUE_CHARS: usize = 256;

/// Characters allowed in keys and values: letters, digits, spaces and `_ . : / = + - @`.
///
/// Lengths are checked separately; a bounded repetition of these Unicode
/// classes exceeds the regex size limit.
static TAG_CHARS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\p{N}\p{Z}_.:/=+\-@]*$").ok());

fn allowed_chars(s: &str) -> bool {
    TAG_CHARS.as_ref().is_some_and(|re| re.is_match(s))
}

fn valid_key(key: &str) -> bool {
    (1..=MAX_KEY_CHARS).contains(&key.chars().count())
        && allowed_chars(key)
        && !key.to_ascii_lowercase().starts_with("aws:")
}

fn valid_value(value: &str) -> bool {
    value.chars().count() <= MAX_VALUE_CHARS && allowed_chars(value)
}

/// Errors raised while parsing custom tags.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    /// Entry without a `=` separator
    #[error("Malformed tag entry '{0}': expected Key=Value")]
    Malformed(String),

    /// Key with forbidden characters, bad length or reserved prefix
    #[error("Invalid tag key '{0}'")]
    InvalidKey(String),

    /// Value with forbidden characters or too long
    #[error("Invalid value for tag '{0}'")]
    InvalidValue(String),

    /// Same key given twice
    #[error("Duplicate tag key '{0}'")]
    DuplicateKey(String),
}

/// A single key/value tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key
    #[serde(rename = "Key")]
    pub key: String,

    /// Tag value
    #[serde(rename = "Value")]
    pub value: String,
}

/// Ordered list of validated tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagsList {
    tags: Vec<Tag>,
}

impl TagsList {
    /// Parse `Key=Value,Key2=Value2`. Blank input yields an empty list.
    pub fn parse(raw: &str) -> Result<Self, TagError> {
        let mut tags = Vec::new();
        let mut seen = HashSet::new();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let Some((key, value)) = entry.split_once('=') else {
                return Err(TagError::Malformed(entry.to_string()));
            };
            let key = key.trim();
            let value = value.trim();

            if !valid_key(key) {
                return Err(TagError::InvalidKey(key.to_string()));
            }
            if !valid_value(value) {
                return Err(TagError::InvalidValue(key.to_string()));
            }
            if !seen.insert(key.to_string()) {
                return Err(TagError::DuplicateKey(key.to_string()));
            }

            tags.push(Tag {
                key: key.to_string(),
                value: value.to_string(),
            });
        }

        Ok(Self { tags })
    }

    /// Parsed tags, in input order.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Whether no tags were given.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Tags in the parameters-file layout: `[{"Key": .., "Value": ..}]`.
    pub fn as_json_file(&self) -> serde_json::Value {
        serde_json::to_value(&self.tags).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}

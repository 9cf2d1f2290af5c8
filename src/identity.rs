//! Stable task identifiers, embedded in the text of a task as a block reference (` ^<id>`)

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of characters of an identifier (128 bits, hex-encoded)
pub const ID_LEN: usize = 32;

/// Marker that introduces an identifier in the text of a task
const MARKER: char = '^';

/// The identifier that joins a local task to its remote counterpart
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId {
    content: String,
}

impl TaskId {
    /// Generate a random identifier
    pub fn assign() -> Self {
        let random = uuid::Uuid::new_v4().to_simple().to_string();
        Self { content: random }
    }

    pub fn as_str(&self) -> &str {
        &self.content
    }
}

/// Structural validation of an identifier: exactly 32 lowercase hexadecimal characters
pub fn is_well_formed(candidate: &str) -> bool {
    candidate.len() == ID_LEN
        && candidate.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}

/// Error returned when parsing an invalid identifier
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedId(pub String);

impl Display for MalformedId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "malformed task identifier {:?}", self.0)
    }
}

impl std::error::Error for MalformedId {}

impl FromStr for TaskId {
    type Err = MalformedId;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if is_well_formed(s) {
            Ok(Self { content: s.to_string() })
        } else {
            Err(MalformedId(s.to_string()))
        }
    }
}

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(f, "{}", self.content)
    }
}

/// Used to support serde
impl Serialize for TaskId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.content)
    }
}
/// Used to support serde
impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(deserializer: D) -> Result<TaskId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Find a previously embedded identifier in the text of a task.
///
/// Only a whitespace-delimited `^<id>` token counts. Malformed identifiers are ignored, as if
/// the task had none.
pub fn extract(raw_text: &str) -> Option<TaskId> {
    raw_text
        .split_whitespace()
        .rev()
        .filter_map(|token| token.strip_prefix(MARKER))
        .find_map(|candidate| candidate.parse().ok())
}

/// Append the identifier marker to the text of a task.
///
/// Text that already carries an identifier is returned unchanged.
pub fn embed(raw_text: &str, id: &TaskId) -> String {
    if extract(raw_text).is_some() {
        return raw_text.to_string();
    }

    let trimmed = raw_text.trim_end();
    let trailing = &raw_text[trimmed.len()..];
    if trimmed.is_empty() {
        format!("{}{}{}", MARKER, id, trailing)
    } else {
        format!("{} {}{}{}", trimmed, MARKER, id, trailing)
    }
}

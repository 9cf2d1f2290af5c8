//! Remote entries, as returned by the transport

use serde::{Deserialize, Serialize};


/// A VersionTag is basically a CalDAV `etag`. Whenever it changes, this means the data has changed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionTag {
    tag: String
}

impl From<String> for VersionTag {
    fn from(tag: String) -> VersionTag {
        Self { tag }
    }
}

impl From<&str> for VersionTag {
    fn from(tag: &str) -> VersionTag {
        Self { tag: tag.to_string() }
    }
}

impl VersionTag {
    /// Get the inner version tag (usually a WebDAV `etag`)
    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Generate a random VersionTag
    pub fn random() -> Self {
        let random = uuid::Uuid::new_v4().to_hyphenated().to_string();
        Self { tag: random }
    }
}


/// A VTODO as stored on the server
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteEntry {
    /// The `UID` of the VTODO
    pub uid: String,
    /// Where this entry lives on the server (usually a path relative to the server root)
    pub href: String,
    pub version_tag: VersionTag,
    /// The whole iCal text, as served
    pub raw_text: String,
}

/// What the server tells after an entry has been created
#[derive(Clone, Debug, PartialEq)]
pub struct CreatedEntry {
    pub uid: String,
    pub href: String,
    pub version_tag: VersionTag,
}

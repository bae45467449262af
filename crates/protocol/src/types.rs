//! Core data types shared across the media endpoint boundary.
//!
//! These types represent catalog identities and item metadata as they appear
//! at the client boundary.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Numeric identity of a catalog item, as handed out by the remote source.
pub type MediaId = u32;

/// Opaque identifier of a remote browsing session.
///
/// The remote endpoint mints these on session creation; the supervisor treats
/// them as tokens to be echoed back on every subsequent call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric metadata tag.
///
/// Tag definitions (names, realms) are owned by the embedding application;
/// the protocol only carries the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub u32);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One metadata value: a primary string plus any additional values for
/// multi-valued tags (multiple artists, multiple genres).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaValue {
    values: Vec<String>,
}

impl MediaValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            values: vec![value.into()],
        }
    }

    pub fn with_values(values: Vec<String>) -> Self {
        Self { values }
    }

    /// The primary (first) value, if any.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// All values, in the order the source supplied them.
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Tag-to-value metadata map for one catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    entries: HashMap<Tag, MediaValue>,
}

impl MediaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, tag: Tag) -> Option<&MediaValue> {
        self.entries.get(&tag)
    }

    /// Adds or replaces the value for `tag`.
    pub fn insert(&mut self, tag: Tag, value: MediaValue) {
        self.entries.insert(tag, value);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, &MediaValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single catalog item as returned from a read.
///
/// `kind` lists the tags this datum can be expanded by: a non-empty `kind`
/// marks a container (an artist datum expands into albums), an empty one a
/// leaf item (a track).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaDatum {
    kind: Vec<Tag>,
    metadata: MediaMetadata,
}

impl MediaDatum {
    pub fn new(kind: Vec<Tag>) -> Self {
        Self {
            kind,
            metadata: MediaMetadata::new(),
        }
    }

    pub fn with_metadata(kind: Vec<Tag>, metadata: MediaMetadata) -> Self {
        Self { kind, metadata }
    }

    pub fn kind(&self) -> &[Tag] {
        &self.kind
    }

    pub fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MediaMetadata {
        &mut self.metadata
    }

    /// True when this datum can be browsed into.
    pub fn is_container(&self) -> bool {
        !self.kind.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_value_primary() {
        let value = MediaValue::with_values(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(value.value(), Some("a"));
        assert_eq!(value.values().len(), 2);

        let empty = MediaValue::with_values(Vec::new());
        assert_eq!(empty.value(), None);
    }

    #[test]
    fn test_metadata_round_trip() {
        let mut metadata = MediaMetadata::new();
        metadata.insert(Tag(100), MediaValue::new("Morning Light"));
        metadata.insert(Tag(101), MediaValue::new("The Lanterns"));

        let json = serde_json::to_string(&metadata).unwrap();
        let back: MediaMetadata = serde_json::from_str(&json).unwrap();

        assert_eq!(back, metadata);
        assert_eq!(back.get(Tag(100)).and_then(MediaValue::value), Some("Morning Light"));
    }

    #[test]
    fn test_datum_container() {
        let artist = MediaDatum::new(vec![Tag(1), Tag(2)]);
        assert!(artist.is_container());

        let track = MediaDatum::new(Vec::new());
        assert!(!track.is_container());
    }
}

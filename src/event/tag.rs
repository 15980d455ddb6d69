// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Tags

use core::fmt;
use core::hash::{Hash, Hasher};
use core::slice::Iter;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use super::coordinate::Coordinate;
use super::id::EventId;
use crate::filter::SingleLetterTag;
use crate::timestamp::Timestamp;

/// Identifier (`d`) tag name
pub const IDENTIFIER: &str = "d";
/// Expiration tag name
pub const EXPIRATION: &str = "expiration";

/// Tag error
#[derive(Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// Tag with no elements
    #[error("empty tag")]
    EmptyTag,
    /// Expiration tag value is not a valid integer
    #[error("invalid expiration tag")]
    InvalidExpiration,
}

/// Tag
///
/// Non-empty ordered sequence of strings; the first element is the tag name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    buf: Vec<String>,
}

impl Tag {
    /// Parse tag from a sequence of strings.
    pub fn parse<I, S>(tag: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buf: Vec<String> = tag.into_iter().map(|v| v.into()).collect();
        if buf.is_empty() {
            return Err(Error::EmptyTag);
        }
        Ok(Self { buf })
    }

    /// Construct a custom tag from name and values.
    pub fn custom<S, I, V>(name: S, values: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let mut buf: Vec<String> = vec![name.into()];
        buf.extend(values.into_iter().map(|v| v.into()));
        Self { buf }
    }

    /// Compose a `d` tag.
    #[inline]
    pub fn identifier<S>(identifier: S) -> Self
    where
        S: Into<String>,
    {
        Self::custom(IDENTIFIER, [identifier])
    }

    /// Compose an `e` tag.
    #[inline]
    pub fn event(id: EventId) -> Self {
        Self::custom("e", [id.to_hex()])
    }

    /// Compose an `a` tag.
    #[inline]
    pub fn coordinate(coordinate: &Coordinate) -> Self {
        Self::custom("a", [coordinate.to_string()])
    }

    /// Compose an `expiration` tag.
    #[inline]
    pub fn expiration(timestamp: Timestamp) -> Self {
        Self::custom(EXPIRATION, [timestamp.to_string()])
    }

    /// Get tag name (first element).
    #[inline]
    pub fn name(&self) -> &str {
        // SAFETY: emptiness checked at construction
        &self.buf[0]
    }

    /// Get tag content (second element), if present.
    #[inline]
    pub fn content(&self) -> Option<&str> {
        self.buf.get(1).map(|s| s.as_str())
    }

    /// Get the single-letter tag name, if the name is one ASCII letter.
    pub fn single_letter_tag(&self) -> Option<SingleLetterTag> {
        let name: &str = self.name();
        if name.len() == 1 {
            SingleLetterTag::from_char(name.chars().next()?).ok()
        } else {
            None
        }
    }

    /// Get tag as slice of strings.
    #[inline]
    pub fn as_slice(&self) -> &[String] {
        &self.buf
    }
}

impl Serialize for Tag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.buf.len()))?;
        for value in self.buf.iter() {
            seq.serialize_element(value)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buf: Vec<String> = Vec::deserialize(deserializer)?;
        Self::parse(buf).map_err(serde::de::Error::custom)
    }
}

/// Tag indexes: single-letter tag name -> set of tag values
pub type TagsIndexes = BTreeMap<SingleLetterTag, BTreeSet<String>>;

/// Tag list
#[derive(Clone)]
pub struct Tags {
    list: Vec<Tag>,
    indexes: OnceLock<TagsIndexes>,
}

impl fmt::Debug for Tags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.list)
    }
}

impl PartialEq for Tags {
    fn eq(&self, other: &Self) -> bool {
        self.list == other.list
    }
}

impl Eq for Tags {}

impl Hash for Tags {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.list.hash(state);
    }
}

impl Default for Tags {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Tags {
    /// Construct new tag list.
    #[inline]
    pub fn new(list: Vec<Tag>) -> Self {
        Self {
            list,
            indexes: OnceLock::new(),
        }
    }

    /// Get number of tags.
    #[inline]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if contains no tags.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Get first tag
    #[inline]
    pub fn first(&self) -> Option<&Tag> {
        self.list.first()
    }

    /// Get tag at index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.list.get(index)
    }

    /// Iterate tags
    #[inline]
    pub fn iter(&self) -> Iter<'_, Tag> {
        self.list.iter()
    }

    /// Extract identifier (first value of the first `d` tag), if exists.
    pub fn identifier(&self) -> Option<&str> {
        self.list
            .iter()
            .find(|tag| tag.name() == IDENTIFIER)
            .and_then(|tag| tag.content())
    }

    /// Extract the expiration timestamp, if an `expiration` tag exists.
    ///
    /// A present but non-integer value is an error.
    pub fn expiration(&self) -> Result<Option<Timestamp>, Error> {
        match self.list.iter().find(|tag| tag.name() == EXPIRATION) {
            Some(tag) => {
                let raw: &str = tag.content().ok_or(Error::InvalidExpiration)?;
                let secs: i64 = raw.parse().map_err(|_| Error::InvalidExpiration)?;
                Ok(Some(Timestamp::from_secs(secs)))
            }
            None => Ok(None),
        }
    }

    fn build_indexes(&self) -> TagsIndexes {
        let mut idx: TagsIndexes = TagsIndexes::new();
        for tag in self.list.iter() {
            if let (Some(letter), Some(content)) = (tag.single_letter_tag(), tag.content()) {
                if !content.is_empty() {
                    idx.entry(letter).or_default().insert(content.to_string());
                }
            }
        }
        idx
    }

    /// Get indexes of the single-letter tags (built on first access).
    pub fn indexes(&self) -> &TagsIndexes {
        self.indexes.get_or_init(|| self.build_indexes())
    }
}

impl From<Vec<Tag>> for Tags {
    fn from(list: Vec<Tag>) -> Self {
        Self::new(list)
    }
}

impl IntoIterator for Tags {
    type Item = Tag;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.into_iter()
    }
}

impl Serialize for Tags {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.list.len()))?;
        for tag in self.list.iter() {
            seq.serialize_element(tag)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Tags {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let list: Vec<Tag> = Vec::deserialize(deserializer)?;
        Ok(Self::new(list))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Tag::parse(Vec::<String>::new()), Err(Error::EmptyTag));
    }

    #[test]
    fn test_identifier() {
        let tags = Tags::new(vec![
            Tag::custom("t", ["meme"]),
            Tag::identifier("slug"),
            Tag::identifier("other"),
        ]);
        assert_eq!(tags.identifier(), Some("slug"));
    }

    #[test]
    fn test_expiration() {
        let tags = Tags::new(vec![Tag::expiration(Timestamp::from_secs(1_700_000_000))]);
        assert_eq!(
            tags.expiration(),
            Ok(Some(Timestamp::from_secs(1_700_000_000)))
        );

        let tags = Tags::new(vec![Tag::custom(EXPIRATION, ["soon"])]);
        assert_eq!(tags.expiration(), Err(Error::InvalidExpiration));

        let tags = Tags::default();
        assert_eq!(tags.expiration(), Ok(None));
    }

    #[test]
    fn test_indexes_skip_non_letter_and_empty_values() {
        let tags = Tags::new(vec![
            Tag::custom("t", ["meme"]),
            Tag::custom("t", ["cat"]),
            Tag::custom("emoji", ["ignored"]),
            Tag::custom("r", Vec::<String>::new()),
            Tag::custom("x", [""]),
        ]);
        let idx = tags.indexes();
        let t = SingleLetterTag::from_char('t').unwrap();
        assert_eq!(idx.get(&t).map(|set| set.len()), Some(2));
        assert_eq!(idx.len(), 1);
    }
}

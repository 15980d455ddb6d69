// Copyright (c) 2025 Nostr Event Store Developers
// Distributed under the MIT software license

//! Filters

use core::fmt;
use core::str::FromStr;
use std::collections::{BTreeMap, BTreeSet};

use serde::de::{Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use crate::event::tag::TagsIndexes;
use crate::event::{Event, EventId, Kind, PublicKey};
use crate::timestamp::Timestamp;
use crate::util::JsonUtil;

/// Tag sets keyed by single-letter tag name
pub type GenericTags = BTreeMap<SingleLetterTag, BTreeSet<String>>;

/// [`SingleLetterTag`] error
#[derive(Debug, PartialEq, Eq)]
pub enum SingleLetterTagError {
    /// Invalid char
    InvalidChar,
}

impl std::error::Error for SingleLetterTagError {}

impl fmt::Display for SingleLetterTagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidChar => write!(f, "invalid char"),
        }
    }
}

/// Single-letter tag name (a-zA-Z)
///
/// Only single-letter tag names are indexable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SingleLetterTag(char);

impl SingleLetterTag {
    /// Parse single-letter tag from [`char`]
    pub fn from_char(c: char) -> Result<Self, SingleLetterTagError> {
        if c.is_ascii_alphabetic() {
            Ok(Self(c))
        } else {
            Err(SingleLetterTagError::InvalidChar)
        }
    }

    /// Get as [`char`]
    #[inline]
    pub fn as_char(&self) -> char {
        self.0
    }

    /// Check if lowercase
    #[inline]
    pub fn is_lowercase(&self) -> bool {
        self.0.is_ascii_lowercase()
    }

    /// Check if uppercase
    #[inline]
    pub fn is_uppercase(&self) -> bool {
        self.0.is_ascii_uppercase()
    }
}

impl fmt::Display for SingleLetterTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SingleLetterTag {
    type Err = SingleLetterTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => Err(SingleLetterTagError::InvalidChar),
        }
    }
}

impl Serialize for SingleLetterTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_char(self.0)
    }
}

impl<'de> Deserialize<'de> for SingleLetterTag {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let character: char = char::deserialize(deserializer)?;
        Self::from_char(character).map_err(serde::de::Error::custom)
    }
}

// Well-known letters used by the builders below.
const fn letter(c: char) -> SingleLetterTag {
    SingleLetterTag(c)
}

/// Query filter
///
/// A mapping from recognized keys to value sets. Multiple filters are
/// OR-composed by the store; within one filter all entries must match.
///
/// Tag entries come in two flavors: `#x` (any listed value present) and
/// `&x` (all listed values present). When both are given for the same
/// letter, the `&x` values are subtracted from the `#x` set before
/// evaluation; a set left empty is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Filter {
    /// List of [`EventId`]
    pub ids: Option<BTreeSet<EventId>>,
    /// List of [`PublicKey`]
    pub authors: Option<BTreeSet<PublicKey>>,
    /// List of kinds
    pub kinds: Option<BTreeSet<Kind>>,
    /// Case-insensitive substring predicate on the event content
    pub search: Option<String>,
    /// Events must be newer than or equal to this to pass
    pub since: Option<Timestamp>,
    /// Events must be older than or equal to this to pass
    pub until: Option<Timestamp>,
    /// Maximum number of events (timeline order, per filter)
    pub limit: Option<usize>,
    /// OR tag queries (`#x` keys)
    pub generic_tags: GenericTags,
    /// AND tag queries (`&x` keys): the event's values must be a superset
    pub and_tags: GenericTags,
}

impl Filter {
    /// Create new empty [`Filter`]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add [`EventId`]
    #[inline]
    pub fn id(self, id: EventId) -> Self {
        self.ids([id])
    }

    /// Add event ids
    pub fn ids<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EventId>,
    {
        self.ids.get_or_insert_with(BTreeSet::new).extend(ids);
        self
    }

    /// Add author
    #[inline]
    pub fn author(self, author: PublicKey) -> Self {
        self.authors([author])
    }

    /// Add authors
    pub fn authors<I>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = PublicKey>,
    {
        self.authors
            .get_or_insert_with(BTreeSet::new)
            .extend(authors);
        self
    }

    /// Add kind
    #[inline]
    pub fn kind(self, kind: Kind) -> Self {
        self.kinds([kind])
    }

    /// Add kinds
    pub fn kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = Kind>,
    {
        self.kinds.get_or_insert_with(BTreeSet::new).extend(kinds);
        self
    }

    /// Add an `#e` tag query
    #[inline]
    pub fn event(self, id: EventId) -> Self {
        self.custom_tag(letter('e'), id.to_hex())
    }

    /// Add a `#p` tag query
    #[inline]
    pub fn pubkey(self, pubkey: PublicKey) -> Self {
        self.custom_tag(letter('p'), pubkey.to_hex())
    }

    /// Add a `#t` (hashtag) query
    #[inline]
    pub fn hashtag<S>(self, hashtag: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(letter('t'), hashtag)
    }

    /// Add a `#d` (identifier) query
    #[inline]
    pub fn identifier<S>(self, identifier: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tag(letter('d'), identifier)
    }

    /// Add custom OR tag query
    #[inline]
    pub fn custom_tag<S>(self, tag: SingleLetterTag, value: S) -> Self
    where
        S: Into<String>,
    {
        self.custom_tags(tag, [value])
    }

    /// Add custom OR tag queries
    pub fn custom_tags<I, S>(mut self, tag: SingleLetterTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generic_tags
            .entry(tag)
            .or_default()
            .extend(values.into_iter().map(|v| v.into()));
        self
    }

    /// Add custom AND (superset) tag query
    #[inline]
    pub fn and_custom_tag<S>(self, tag: SingleLetterTag, value: S) -> Self
    where
        S: Into<String>,
    {
        self.and_custom_tags(tag, [value])
    }

    /// Add custom AND (superset) tag queries
    pub fn and_custom_tags<I, S>(mut self, tag: SingleLetterTag, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.and_tags
            .entry(tag)
            .or_default()
            .extend(values.into_iter().map(|v| v.into()));
        self
    }

    /// Add search field
    #[inline]
    pub fn search<S>(mut self, value: S) -> Self
    where
        S: Into<String>,
    {
        self.search = Some(value.into());
        self
    }

    /// Add since UNIX timestamp (inclusive)
    #[inline]
    pub fn since(mut self, since: Timestamp) -> Self {
        self.since = Some(since);
        self
    }

    /// Add until UNIX timestamp (inclusive)
    #[inline]
    pub fn until(mut self, until: Timestamp) -> Self {
        self.until = Some(until);
        self
    }

    /// Add limit
    #[inline]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Check if [`Filter`] is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self == &Filter::default()
    }

    #[inline]
    fn ids_match(&self, event: &Event) -> bool {
        self.ids
            .as_ref()
            .map_or(true, |ids| ids.is_empty() || ids.contains(&event.id))
    }

    #[inline]
    fn authors_match(&self, event: &Event) -> bool {
        self.authors.as_ref().map_or(true, |authors| {
            authors.is_empty() || authors.contains(&event.pubkey)
        })
    }

    #[inline]
    fn kind_match(&self, event: &Event) -> bool {
        self.kinds.as_ref().map_or(true, |kinds| {
            kinds.is_empty() || kinds.contains(&event.kind)
        })
    }

    fn tag_match(&self, event: &Event) -> bool {
        if self.generic_tags.is_empty() && self.and_tags.is_empty() {
            return true;
        }

        let indexes: &TagsIndexes = event.tags.indexes();

        // `&x`: the event values must be a superset. An empty set is ignored.
        for (tag_name, required) in self.and_tags.iter() {
            if required.is_empty() {
                continue;
            }
            match indexes.get(tag_name) {
                Some(values) => {
                    if !required.iter().all(|v| values.contains(v)) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        // `#x`: any value must match, after subtracting the values already
        // required by `&x` for the same letter. A set left empty is ignored.
        for (tag_name, set) in self.generic_tags.iter() {
            let required: Option<&BTreeSet<String>> = self.and_tags.get(tag_name);
            let mut effective: bool = false;
            let mut matched: bool = false;
            for value in set.iter() {
                if required.map_or(false, |r| r.contains(value)) {
                    continue;
                }
                effective = true;
                if indexes
                    .get(tag_name)
                    .map_or(false, |values| values.contains(value))
                {
                    matched = true;
                    break;
                }
            }
            if effective && !matched {
                return false;
            }
        }

        true
    }

    fn search_match(&self, event: &Event) -> bool {
        match &self.search {
            Some(query) if !query.is_empty() => event
                .content
                .as_bytes()
                .windows(query.len())
                .any(|window| window.eq_ignore_ascii_case(query.as_bytes())),
            Some(..) | None => true,
        }
    }

    /// Determine if [`Filter`] matches the given [`Event`].
    #[inline]
    pub fn match_event(&self, event: &Event) -> bool {
        self.ids_match(event)
            && self.authors_match(event)
            && self.kind_match(event)
            && self.since.map_or(true, |t| event.created_at >= t)
            && self.until.map_or(true, |t| event.created_at <= t)
            && self.tag_match(event)
            && self.search_match(event)
    }
}

impl JsonUtil for Filter {
    type Err = serde_json::Error;
}

impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        if let Some(ids) = &self.ids {
            map.serialize_entry("ids", ids)?;
        }
        if let Some(authors) = &self.authors {
            map.serialize_entry("authors", authors)?;
        }
        if let Some(kinds) = &self.kinds {
            map.serialize_entry("kinds", kinds)?;
        }
        if let Some(search) = &self.search {
            map.serialize_entry("search", search)?;
        }
        if let Some(since) = &self.since {
            map.serialize_entry("since", since)?;
        }
        if let Some(until) = &self.until {
            map.serialize_entry("until", until)?;
        }
        if let Some(limit) = &self.limit {
            map.serialize_entry("limit", limit)?;
        }
        for (tag, values) in self.generic_tags.iter() {
            map.serialize_entry(&format!("#{tag}"), values)?;
        }
        for (tag, values) in self.and_tags.iter() {
            map.serialize_entry(&format!("&{tag}"), values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FilterVisitor;

        impl<'de> Visitor<'de> for FilterVisitor {
            type Value = Filter;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("filter map")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut filter = Filter::new();
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "ids" => filter.ids = Some(map.next_value()?),
                        "authors" => filter.authors = Some(map.next_value()?),
                        "kinds" => filter.kinds = Some(map.next_value()?),
                        "search" => filter.search = Some(map.next_value()?),
                        "since" => filter.since = Some(map.next_value()?),
                        "until" => filter.until = Some(map.next_value()?),
                        "limit" => filter.limit = Some(map.next_value()?),
                        other => {
                            let mut chars = other.chars();
                            match (chars.next(), chars.next(), chars.next()) {
                                (Some('#'), Some(c), None) => {
                                    let tag: SingleLetterTag = SingleLetterTag::from_char(c)
                                        .map_err(serde::de::Error::custom)?;
                                    filter.generic_tags.insert(tag, map.next_value()?);
                                }
                                (Some('&'), Some(c), None) => {
                                    let tag: SingleLetterTag = SingleLetterTag::from_char(c)
                                        .map_err(serde::de::Error::custom)?;
                                    filter.and_tags.insert(tag, map.next_value()?);
                                }
                                _ => {
                                    tracing::warn!(key = %other, "ignoring unknown filter key");
                                    map.next_value::<IgnoredAny>()?;
                                }
                            }
                        }
                    }
                }
                Ok(filter)
            }
        }

        deserializer.deserialize_map(FilterVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::build_event;

    #[test]
    fn test_single_letter_tag() {
        assert!(SingleLetterTag::from_char('t').is_ok());
        assert!(SingleLetterTag::from_char('T').is_ok());
        assert_eq!(
            SingleLetterTag::from_char('1'),
            Err(SingleLetterTagError::InvalidChar)
        );
        assert_eq!("p".parse::<SingleLetterTag>().unwrap().as_char(), 'p');
        assert!("pp".parse::<SingleLetterTag>().is_err());
    }

    #[test]
    fn test_serialization() {
        let filter = Filter::new()
            .kind(Kind::TEXT_NOTE)
            .hashtag("meme")
            .and_custom_tags(letter('t'), ["cat", "dog"])
            .search("test")
            .limit(10);
        let json = r##"{"kinds":[1],"search":"test","limit":10,"#t":["meme"],"&t":["cat","dog"]}"##;
        assert_eq!(filter.as_json(), json);
    }

    #[test]
    fn test_deserialization() {
        let json = r##"{"ids":["70b10f70c1318967eddf12527799411b1a9780ad9c43858f5e5fcd45486a13a5"],"#t":["meme"],"&t":["cat"],"since":10,"until":20,"unknown":["..."]}"##;
        let filter = Filter::from_json(json).unwrap();
        assert_eq!(filter.ids.as_ref().map(|ids| ids.len()), Some(1));
        assert_eq!(filter.since, Some(Timestamp::from_secs(10)));
        assert_eq!(filter.until, Some(Timestamp::from_secs(20)));
        assert!(filter.generic_tags.contains_key(&letter('t')));
        assert!(filter.and_tags.contains_key(&letter('t')));

        // Unknown keys are ignored
        let json = r##"{"unknown":["..."],"search":"test"}"##;
        let filter = Filter::from_json(json).unwrap();
        assert_eq!(filter, Filter::new().search("test"));
    }

    #[test]
    fn test_match_event_basic() {
        let event = build_event(7, 3, 1, 1_500, vec![vec!["t", "meme"], vec!["t", "cat"]]);

        assert!(Filter::new().id(event.id).match_event(&event));
        assert!(!Filter::new()
            .id(event.id)
            .kind(Kind::METADATA)
            .match_event(&event));
        assert!(Filter::new().author(event.pubkey).match_event(&event));
        assert!(Filter::new().hashtag("meme").match_event(&event));
        assert!(!Filter::new().hashtag("dog").match_event(&event));
    }

    #[test]
    fn test_since_until_inclusive() {
        let event = build_event(1, 1, 1, 1_500, vec![]);
        assert!(Filter::new()
            .since(Timestamp::from_secs(1_500))
            .match_event(&event));
        assert!(Filter::new()
            .until(Timestamp::from_secs(1_500))
            .match_event(&event));
        assert!(!Filter::new()
            .since(Timestamp::from_secs(1_501))
            .match_event(&event));
        assert!(!Filter::new()
            .until(Timestamp::from_secs(1_499))
            .match_event(&event));
    }

    #[test]
    fn test_and_tags_superset() {
        let t = letter('t');
        let event = build_event(1, 1, 1, 1_000, vec![vec!["t", "meme"], vec!["t", "cat"]]);

        assert!(Filter::new()
            .and_custom_tags(t, ["meme", "cat"])
            .match_event(&event));
        assert!(!Filter::new()
            .and_custom_tags(t, ["meme", "dog"])
            .match_event(&event));

        // Empty AND set is ignored
        let filter = Filter::new().and_custom_tags(t, Vec::<String>::new());
        assert!(filter.match_event(&event));
    }

    #[test]
    fn test_and_or_interaction() {
        let t = letter('t');

        // `&t:[a]` + `#t:[a]` evaluates as `&t:[a]` only
        let with_a = build_event(1, 1, 1, 1_000, vec![vec!["t", "a"]]);
        let filter = Filter::new().and_custom_tag(t, "a").custom_tag(t, "a");
        assert!(filter.match_event(&with_a));

        // OR values not consumed by AND still apply
        let filter = Filter::new()
            .and_custom_tags(t, ["meme", "cat"])
            .custom_tags(t, ["black", "white"]);
        let matching = build_event(
            2,
            1,
            1,
            1_000,
            vec![vec!["t", "meme"], vec!["t", "cat"], vec!["t", "black"]],
        );
        let missing_or = build_event(3, 1, 1, 1_000, vec![vec!["t", "meme"], vec!["t", "cat"]]);
        let missing_and = build_event(4, 1, 1, 1_000, vec![vec!["t", "meme"], vec!["t", "white"]]);
        assert!(filter.match_event(&matching));
        assert!(!filter.match_event(&missing_or));
        assert!(!filter.match_event(&missing_and));
    }

    #[test]
    fn test_search_match() {
        let event = build_event(1, 1, 1, 1_000, vec![]);
        let mut event = event;
        event.content = String::from("JoininBox is a minimalistic Linux environment");
        assert!(Filter::new().search("linux").match_event(&event));
        assert!(Filter::new().search("LINUX ENV").match_event(&event));
        assert!(!Filter::new().search("windows").match_event(&event));
        assert!(Filter::new().search("").match_event(&event));
    }

    #[test]
    fn test_filter_is_empty() {
        assert!(Filter::new().is_empty());
        assert!(!Filter::new().identifier("test").is_empty());
    }
}

//! A small, string-keyed metadata dictionary attached to tracks and streams.

use std::collections::BTreeMap;

/// Well-known metadata keys, mirroring the `GAVL_META_*` naming convention.
pub mod keys {
    pub const TITLE: &str = "title";
    pub const ARTIST: &str = "artist";
    pub const ALBUM: &str = "album";
    pub const DATE: &str = "date";
    pub const LANGUAGE: &str = "language";
    pub const ENCODER: &str = "encoder";
    pub const GENRE: &str = "genre";
    pub const COMMENT: &str = "comment";
    pub const TRACK_NUMBER: &str = "track_number";
}

/// A flat, string-keyed metadata dictionary with copy-on-write-friendly `Clone` semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetadataMap {
    entries: BTreeMap<String, String>,
}

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn merge(&mut self, other: &MetadataMap) {
        for (k, v) in other.iter() {
            self.entries.insert(k.to_string(), v.to_string());
        }
    }
}

//! Metadata tag parsing.
//!
//! Every container's tags end up in a [`TagMap`]. Key case follows the source format: Vorbis
//! comment and Matroska names are upper-cased, ID3 frame ids are stored as found.

use std::collections::BTreeMap;

pub mod id3;
pub mod matroska;
pub mod vorbis_comment;

/// Track gain in dB as a legacy ReplayGain string, e.g. `"-6.20 dB"`.
pub const REPLAYGAIN_TRACK_GAIN: &str = "REPLAYGAIN_TRACK_GAIN";

/// Track gain as a Q7.8 integer, as used by Opus files.
pub const R128_TRACK_GAIN: &str = "R128_TRACK_GAIN";

/// Non-fatal problems met while decoding a single tag.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("unsupported text encoding {0}")]
    UnsupportedEncoding(u8),

    #[error("tag text is not valid {0}")]
    InvalidText(&'static str),
}

/// Tag name to value map. Duplicate keys keep the last value written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: BTreeMap<String, String>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TagMap::new();
        map.extend(iter);
        map
    }
}

impl<K: Into<String>, V: Into<String>> Extend<(K, V)> for TagMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

use super::TagMap;

/// A Matroska `SimpleTag` element as produced by the external EBML reader.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimpleTag {
    pub name: String,
    /// `TagString` content, absent for binary or container-only tags.
    pub value: Option<String>,
    /// Nested `SimpleTag` children.
    pub children: Vec<SimpleTag>,
}

impl SimpleTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        SimpleTag {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }
}

/// Flattens simple tags into a map keyed by upper-cased name, children after their parent.
pub fn collect(tags: &[SimpleTag]) -> TagMap {
    let mut map = TagMap::new();
    let mut pending: Vec<&SimpleTag> = tags.iter().rev().collect();

    while let Some(tag) = pending.pop() {
        if let Some(value) = &tag.value {
            map.insert(tag.name.to_ascii_uppercase(), value.as_str());
        }
        pending.extend(tag.children.iter().rev());
    }

    map
}

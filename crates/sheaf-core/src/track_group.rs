use std::{ops::Index, sync::Arc};

use crate::Format;

/// Ordered, immutable set of formats selected as a unit.
///
/// Cloning shares the underlying storage. [`TrackGroupArray::index_of`]
/// matches groups by that shared identity, not by content.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackGroup {
    formats: Arc<[Format]>,
}

impl TrackGroup {
    /// # Panics
    ///
    /// Panics if `formats` is empty.
    #[must_use]
    pub fn new(formats: Vec<Format>) -> Self {
        assert!(!formats.is_empty(), "track group needs at least one format");
        Self {
            formats: formats.into(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.formats.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.formats.is_empty()
    }

    #[must_use]
    pub fn format(&self, index: usize) -> Option<&Format> {
        self.formats.get(index)
    }

    pub fn formats(&self) -> impl ExactSizeIterator<Item = &Format> {
        self.formats.iter()
    }

    /// Position of `format` inside this group, by value.
    #[must_use]
    pub fn index_of_format(&self, format: &Format) -> Option<usize> {
        self.formats.iter().position(|f| f == format)
    }

    /// Whether `other` is this very group (shared storage).
    #[must_use]
    pub fn same_group(&self, other: &TrackGroup) -> bool {
        Arc::ptr_eq(&self.formats, &other.formats)
    }
}

/// All groups a prepared bundle exposes. Indices are stable.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackGroupArray {
    groups: Vec<TrackGroup>,
}

impl TrackGroupArray {
    #[must_use]
    pub fn new(groups: Vec<TrackGroup>) -> Self {
        Self { groups }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&TrackGroup> {
        self.groups.get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TrackGroup> {
        self.groups.iter()
    }

    /// Index of `group`, matched by identity.
    #[must_use]
    pub fn index_of(&self, group: &TrackGroup) -> Option<usize> {
        self.groups.iter().position(|g| g.same_group(group))
    }
}

impl Index<usize> for TrackGroupArray {
    type Output = TrackGroup;

    fn index(&self, index: usize) -> &TrackGroup {
        &self.groups[index]
    }
}

/// A consumer's choice: a group plus the indices of the formats inside it
/// that may be played.
#[derive(Clone, Debug)]
pub struct TrackSelection {
    pub group: TrackGroup,
    pub tracks: Vec<usize>,
}

impl TrackSelection {
    #[must_use]
    pub fn new(group: TrackGroup, tracks: Vec<usize>) -> Self {
        Self { group, tracks }
    }

    /// Select every format in `group`.
    #[must_use]
    pub fn all(group: TrackGroup) -> Self {
        let tracks = (0..group.len()).collect();
        Self { group, tracks }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(ids: &[&str]) -> TrackGroup {
        TrackGroup::new(ids.iter().map(|id| Format::new().with_id(*id)).collect())
    }

    #[test]
    fn index_of_matches_identity_not_content() {
        let a = group(&["a"]);
        let array = TrackGroupArray::new(vec![a.clone(), group(&["b"])]);

        assert_eq!(array.index_of(&a), Some(0));
        assert_eq!(array.index_of(&array[1].clone()), Some(1));
        // Equal content, different group.
        assert_eq!(array.index_of(&group(&["a"])), None);
    }

    #[test]
    fn selection_all_covers_every_format() {
        let selection = TrackSelection::all(group(&["lo", "mid", "hi"]));
        assert_eq!(selection.tracks, vec![0, 1, 2]);
    }

    #[test]
    #[should_panic(expected = "at least one format")]
    fn empty_group_is_rejected() {
        let _ = TrackGroup::new(Vec::new());
    }
}

//! Track-group derivation.
//!
//! Reconciles the streams a demuxer found in a segment with the variants
//! the segment source can switch between. The single highest-ranked stream
//! becomes one adaptive group spanning every variant; every other stream is
//! exposed on its own.

use sheaf_core::{Format, TrackGroup, TrackGroupArray, mime};

/// Ranking of stream categories. Only a unique top-ranked stream is
/// expanded across variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PrimaryType {
    None,
    Text,
    Audio,
    Video,
}

impl PrimaryType {
    #[must_use]
    pub fn of(format: &Format) -> Self {
        match format.sample_mime_type.as_deref() {
            Some(m) if mime::is_video(m) => Self::Video,
            Some(m) if mime::is_audio(m) => Self::Audio,
            Some(m) if mime::is_text(m) => Self::Text,
            _ => Self::None,
        }
    }
}

/// Output of [`derive_track_groups`].
#[derive(Clone, Debug, PartialEq)]
pub struct DerivedTracks {
    pub groups: TrackGroupArray,
    /// Group index of the adaptive group, if one stream was unambiguous.
    pub primary_group: Option<usize>,
    pub primary_type: PrimaryType,
}

/// Build the exposed groups, one per stream, in stream order.
///
/// With a unique primary stream, its group holds one format per source
/// track: the stream's sample format overlaid with that variant's container
/// info. When the primary type is video, audio streams are overlaid with
/// `muxed_audio` and `application/eia-608` streams with `muxed_caption`.
#[must_use]
pub fn derive_track_groups(
    stream_formats: &[Format],
    source_tracks: &TrackGroup,
    muxed_audio: Option<&Format>,
    muxed_caption: Option<&Format>,
) -> DerivedTracks {
    let mut primary_type = PrimaryType::None;
    let mut primary_index = None;
    for (i, format) in stream_formats.iter().enumerate() {
        let ty = PrimaryType::of(format);
        if ty > primary_type {
            primary_type = ty;
            primary_index = Some(i);
        } else if ty == primary_type && primary_index.is_some() {
            // Two streams share the top rank: nothing is adaptive.
            primary_index = None;
        }
    }

    let groups = stream_formats
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            if Some(i) == primary_index {
                let formats: Vec<Format> = source_tracks
                    .formats()
                    .map(|variant| sample.with_container_info(variant))
                    .collect();
                if formats.is_empty() {
                    return TrackGroup::new(vec![sample.clone()]);
                }
                return TrackGroup::new(formats);
            }
            let container = if primary_type == PrimaryType::Video {
                match sample.sample_mime_type.as_deref() {
                    Some(m) if mime::is_audio(m) => muxed_audio,
                    Some(mime::APPLICATION_EIA608) => muxed_caption,
                    _ => None,
                }
            } else {
                None
            };
            TrackGroup::new(vec![Format::derive(container, sample)])
        })
        .collect();

    DerivedTracks {
        groups: TrackGroupArray::new(groups),
        primary_group: primary_index,
        primary_type,
    }
}

/// Per-group enabled flags plus their running count.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnabledGroups {
    states: Vec<bool>,
    count: usize,
}

impl EnabledGroups {
    /// `len` groups, all disabled.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            states: vec![false; len],
            count: 0,
        }
    }

    /// # Panics
    ///
    /// Panics if `group` is out of range or already in `enabled` state.
    pub fn set(&mut self, group: usize, enabled: bool) {
        let state = &mut self.states[group];
        assert_ne!(
            *state, enabled,
            "track group {group} is already {}",
            if enabled { "enabled" } else { "disabled" }
        );
        *state = enabled;
        if enabled {
            self.count += 1;
        } else {
            self.count -= 1;
        }
    }

    /// Out-of-range groups read as disabled.
    #[must_use]
    pub fn is_enabled(&self, group: usize) -> bool {
        self.states.get(group).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.states.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

use std::fmt;

/// Kind of media a track bundle carries. Reported with every load event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrackType {
    /// Muxed content: the main variant stream (video plus whatever rides with it).
    #[default]
    Default,
    Audio,
    Video,
    Text,
    Metadata,
    Unknown,
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Default => "default",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Text => "text",
            Self::Metadata => "metadata",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Why the segment source picked the format a segment was loaded with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SelectionReason {
    #[default]
    Unknown,
    /// First pick before any bandwidth estimate exists.
    Initial,
    /// Forced by the consumer.
    Manual,
    /// Chosen by the adaptive policy.
    Adaptive,
    /// Trick-play (I-frame only) selection.
    Trickplay,
}

/// What a loadable unit fetches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// Media segment demuxed into sample queues.
    Media,
    /// Segment encryption key.
    EncryptionKey,
    /// Media playlist refresh.
    MediaPlaylist,
    /// Anything else a source needs fetched.
    Other,
}

impl UnitKind {
    #[must_use]
    pub fn is_media(self) -> bool {
        matches!(self, Self::Media)
    }
}

use bitflags::bitflags;
use bytes::Bytes;

bitflags! {
    /// Track selection hints carried by a format (from `#EXT-X-MEDIA`).
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SelectionFlags: u8 {
        const DEFAULT = 1;
        const FORCED = 1 << 1;
        const AUTOSELECT = 1 << 2;
    }
}

/// Immutable description of one elementary or container stream.
///
/// Built once with the `with_*` builders and then only cloned. A
/// *container* format (a variant from the playlist) and a *sample* format
/// (what the demuxer found) are merged with [`Format::with_container_info`].
///
/// ```
/// use sheaf_core::{Format, mime};
///
/// let sample = Format::new().with_sample_mime_type(mime::VIDEO_H264).with_size(1920, 1080);
/// let variant = Format::new().with_id("720p").with_bitrate(2_500_000).with_size(1280, 720);
///
/// let derived = sample.with_container_info(&variant);
/// assert_eq!(derived.sample_mime_type.as_deref(), Some(mime::VIDEO_H264));
/// assert_eq!(derived.id.as_deref(), Some("720p"));
/// assert_eq!(derived.width, Some(1280));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Format {
    pub id: Option<String>,
    pub container_mime_type: Option<String>,
    pub sample_mime_type: Option<String>,
    /// RFC 6381 codecs string.
    pub codecs: Option<String>,
    /// Bits per second.
    pub bitrate: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    pub channel_count: Option<u16>,
    pub sample_rate: Option<u32>,
    pub selection_flags: SelectionFlags,
    /// BCP 47 language tag.
    pub language: Option<String>,
    /// Codec-specific setup data (SPS/PPS, AudioSpecificConfig, ...).
    pub initialization_data: Vec<Bytes>,
}

impl Format {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_container_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.container_mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_sample_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.sample_mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_codecs(mut self, codecs: impl Into<String>) -> Self {
        self.codecs = Some(codecs.into());
        self
    }

    #[must_use]
    pub fn with_bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn with_frame_rate(mut self, frame_rate: f32) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    #[must_use]
    pub fn with_audio(mut self, channel_count: u16, sample_rate: u32) -> Self {
        self.channel_count = Some(channel_count);
        self.sample_rate = Some(sample_rate);
        self
    }

    #[must_use]
    pub fn with_selection_flags(mut self, flags: SelectionFlags) -> Self {
        self.selection_flags = flags;
        self
    }

    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    #[must_use]
    pub fn with_initialization_data(mut self, data: Vec<Bytes>) -> Self {
        self.initialization_data = data;
        self
    }

    /// Overlay the container-level fields of `container` onto this sample
    /// format.
    ///
    /// Identity, bitrate, dimensions, selection flags and language come from
    /// `container`, verbatim, including absent values. Everything else keeps
    /// the sample-level value.
    #[must_use]
    pub fn with_container_info(&self, container: &Format) -> Format {
        Format {
            id: container.id.clone(),
            bitrate: container.bitrate,
            width: container.width,
            height: container.height,
            selection_flags: container.selection_flags,
            language: container.language.clone(),
            ..self.clone()
        }
    }

    /// Sample format as exposed downstream: merged with `container` when one
    /// is known, unchanged otherwise.
    #[must_use]
    pub fn derive(container: Option<&Format>, sample: &Format) -> Format {
        match container {
            Some(container) => sample.with_container_info(container),
            None => sample.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mime;

    fn sample() -> Format {
        Format::new()
            .with_id("1/256")
            .with_sample_mime_type(mime::AUDIO_AAC)
            .with_codecs("mp4a.40.2")
            .with_audio(2, 48_000)
            .with_bitrate(96_000)
            .with_initialization_data(vec![Bytes::from_static(&[0x11, 0x90])])
    }

    #[test]
    fn container_info_overrides_identity_fields() {
        let container = Format::new()
            .with_id("audio-en")
            .with_bitrate(128_000)
            .with_language("en")
            .with_selection_flags(SelectionFlags::DEFAULT | SelectionFlags::AUTOSELECT);

        let derived = sample().with_container_info(&container);

        assert_eq!(derived.id.as_deref(), Some("audio-en"));
        assert_eq!(derived.bitrate, Some(128_000));
        assert_eq!(derived.language.as_deref(), Some("en"));
        assert!(derived.selection_flags.contains(SelectionFlags::DEFAULT));
        // Sample-level details survive.
        assert_eq!(derived.sample_mime_type.as_deref(), Some(mime::AUDIO_AAC));
        assert_eq!(derived.codecs.as_deref(), Some("mp4a.40.2"));
        assert_eq!(derived.sample_rate, Some(48_000));
        assert_eq!(derived.initialization_data.len(), 1);
    }

    #[test]
    fn absent_container_values_are_copied_too() {
        let derived = sample().with_container_info(&Format::new().with_id("x"));
        assert_eq!(derived.bitrate, None);
        assert_eq!(derived.width, None);
    }

    #[test]
    fn derive_without_container_is_identity() {
        assert_eq!(Format::derive(None, &sample()), sample());
    }
}

//! MIME constants and category helpers.
//!
//! Only the top-level type decides the category: `video/*`, `audio/*` and
//! `text/*`. Caption formats carried as `application/*` are not text here.

pub const VIDEO_MP2T: &str = "video/mp2t";
pub const VIDEO_MP4: &str = "video/mp4";
pub const VIDEO_H264: &str = "video/avc";
pub const VIDEO_H265: &str = "video/hevc";

pub const AUDIO_MP4: &str = "audio/mp4";
pub const AUDIO_AAC: &str = "audio/mp4a-latm";
pub const AUDIO_MPEG: &str = "audio/mpeg";
pub const AUDIO_AC3: &str = "audio/ac3";
pub const AUDIO_E_AC3: &str = "audio/eac3";

pub const TEXT_VTT: &str = "text/vtt";

pub const APPLICATION_M3U8: &str = "application/x-mpegURL";
pub const APPLICATION_ID3: &str = "application/id3";
/// CEA-608 closed captions carried in the video elementary stream.
pub const APPLICATION_EIA608: &str = "application/eia-608";

/// Top-level type of a MIME string (`"video"` for `"video/avc"`).
#[must_use]
pub fn top_level_type(mime: &str) -> Option<&str> {
    mime.split_once('/').map(|(top, _)| top)
}

#[must_use]
pub fn is_video(mime: &str) -> bool {
    top_level_type(mime) == Some("video")
}

#[must_use]
pub fn is_audio(mime: &str) -> bool {
    top_level_type(mime) == Some("audio")
}

#[must_use]
pub fn is_text(mime: &str) -> bool {
    top_level_type(mime) == Some("text")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(VIDEO_H264, true, false, false)]
    #[case(AUDIO_AAC, false, true, false)]
    #[case(TEXT_VTT, false, false, true)]
    #[case(APPLICATION_EIA608, false, false, false)]
    #[case(APPLICATION_ID3, false, false, false)]
    #[case("garbage", false, false, false)]
    fn categories(
        #[case] mime: &str,
        #[case] video: bool,
        #[case] audio: bool,
        #[case] text: bool,
    ) {
        assert_eq!(is_video(mime), video);
        assert_eq!(is_audio(mime), audio);
        assert_eq!(is_text(mime), text);
    }

    #[test]
    fn top_level_type_splits_on_first_slash() {
        assert_eq!(top_level_type("video/avc"), Some("video"));
        assert_eq!(top_level_type("noslash"), None);
    }
}

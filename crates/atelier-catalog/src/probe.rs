//! Media probes: dimensions, durations, and video thumbnails.
//!
//! Decoding is an external capability behind [`MediaProbe`]; this module
//! only sequences the calls each media kind needs.

use std::time::Duration;

use async_trait::async_trait;

use atelier_types::MediaKind;

use crate::error::ProbeError;
use crate::payload::MediaPayload;

/// Upper bound on the video thumbnail sample position.
const MAX_THUMBNAIL_OFFSET: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// A frame sampled from a video.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoFrame {
    pub thumbnail: MediaPayload,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn image_dimensions(&self, media: &MediaPayload) -> Result<Dimensions, ProbeError>;

    /// Duration in seconds of an audio or video asset.
    async fn duration(&self, media: &MediaPayload, kind: MediaKind) -> Result<f64, ProbeError>;

    /// Sample one frame at `at`.
    async fn video_frame(&self, media: &MediaPayload, at: Duration) -> Result<VideoFrame, ProbeError>;
}

/// Everything the probes learned about an asset.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProbeReport {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration: Option<f64>,
    pub thumbnail: Option<MediaPayload>,
}

/// Thumbnail position for a video: `min(1s, 10% of duration)`.
pub fn thumbnail_sample_time(duration_secs: f64) -> Duration {
    if !duration_secs.is_finite() || duration_secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(duration_secs * 0.1)
        .map_or(MAX_THUMBNAIL_OFFSET, |at| at.min(MAX_THUMBNAIL_OFFSET))
}

/// Run the probes `kind` needs. Any failure rejects the whole probe.
pub async fn probe_media(
    probe: &dyn MediaProbe,
    kind: MediaKind,
    media: &MediaPayload,
) -> Result<ProbeReport, ProbeError> {
    match kind {
        MediaKind::Image => {
            let dims = probe.image_dimensions(media).await?;
            Ok(ProbeReport {
                width: Some(dims.width),
                height: Some(dims.height),
                ..ProbeReport::default()
            })
        }
        MediaKind::Video => {
            let duration = probe.duration(media, kind).await?;
            let frame = probe
                .video_frame(media, thumbnail_sample_time(duration))
                .await?;
            Ok(ProbeReport {
                width: Some(frame.width),
                height: Some(frame.height),
                duration: Some(duration),
                thumbnail: Some(frame.thumbnail),
            })
        }
        MediaKind::Audio => {
            let duration = probe.duration(media, kind).await?;
            Ok(ProbeReport {
                duration: Some(duration),
                ..ProbeReport::default()
            })
        }
    }
}

//! YouTube Live Streams API types.
//!
//! ## [`LiveStream`] - Technical Infrastructure
//! - **Technical config**: Frame rate, resolution, ingestion protocol
//! - **Ingestion details**: Ingest URL and stream key for the encoder
//! - **Relationship**: One stream can power multiple broadcasts over time

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Request body for `liveStreams.insert`.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStreamInsert {
    pub snippet: LiveStreamInsertSnippet,
    pub cdn: CdnSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStreamInsertSnippet {
    /// The stream's title.
    pub title: String,
}

/// A `liveStream` resource represents the technical video pipeline for transmitting
/// content to YouTube.
///
/// **Broadcasts vs Streams**: Streams carry the encoder-facing settings and the ingestion
/// address. They are "behind-the-scenes" resources that power the viewer-facing
/// broadcasts.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#resource>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStream {
    /// The ID that YouTube assigns to uniquely identify the stream.
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<LiveStreamSnippet>,
    /// Content distribution settings, including where the encoder must send video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cdn: Option<CdnSettings>,
}

/// The snippet object contains basic details about the stream.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#snippet>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStreamSnippet {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<Timestamp>,
}

/// The stream's content distribution network settings.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CdnSettings {
    /// The frame rate of the inbound video data, e.g. `30fps`.
    pub frame_rate: String,
    /// The resolution of the inbound video data, e.g. `1080p`.
    pub resolution: String,
    /// The method or protocol used to transmit the video stream, e.g. `rtmp`.
    pub ingestion_type: String,
    /// Filled in by YouTube once the stream exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion_info: Option<IngestionInfo>,
}

/// Where and how the encoder should push video.
///
/// See: <https://developers.google.com/youtube/v3/live/docs/liveStreams#cdn.ingestionInfo>
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionInfo {
    /// The stream key the encoder must present.
    pub stream_name: String,
    /// The primary ingestion URL.
    pub ingestion_address: String,
    /// The backup ingestion URL, if YouTube provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ingestion_address: Option<String>,
}

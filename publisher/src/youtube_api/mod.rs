//! YouTube Data API v3: the authenticated handle and the wire types it speaks.
//!
//! Live streaming uses two resources that work together:
//!
//! - a [`streams::LiveStream`] is the ingest side, the RTMP endpoint and stream key an
//!   encoder pushes to;
//! - a [`broadcasts::LiveBroadcast`] is what viewers see, with a title, a schedule, and a
//!   privacy setting.
//!
//! A broadcast only goes live once it is bound to a stream.

pub mod broadcasts;
pub mod client;
pub mod streams;
pub mod types;
pub mod videos;

pub use client::YouTubeClient;

pub use broadcasts::{LiveBroadcast, LiveBroadcastInsert};
pub use streams::{CdnSettings, IngestionInfo, LiveStream, LiveStreamInsert};
pub use types::PrivacyStatus;
pub use videos::{Video, VideoInsert};

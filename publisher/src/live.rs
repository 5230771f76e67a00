//! Provisioning of a live session: ingest stream, scheduled broadcast, and the binding
//! between them.
//!
//! The three calls run strictly in order. If one fails, the rest are skipped and whatever
//! was already created stays on the channel; the returned [`ProvisionError`] names the
//! failing step and the IDs that were left behind.

use crate::config::LiveProfile;
use crate::error::{CallError, ProvisionCause, ProvisionError, ProvisionStep};
use crate::youtube_api::broadcasts::{
    LiveBroadcast, LiveBroadcastInsert, LiveBroadcastSnippet, LiveBroadcastStatus,
};
use crate::youtube_api::streams::{CdnSettings, LiveStream, LiveStreamInsert, LiveStreamInsertSnippet};
use jiff::{SignedDuration, Timestamp};
use serde::Serialize;
use std::future::Future;

/// The live-streaming calls the provisioner needs.
pub trait LiveApi {
    fn insert_stream(
        &self,
        stream: &LiveStreamInsert,
    ) -> impl Future<Output = Result<LiveStream, CallError>> + Send;

    fn insert_broadcast(
        &self,
        broadcast: &LiveBroadcastInsert,
    ) -> impl Future<Output = Result<LiveBroadcast, CallError>> + Send;

    fn bind(
        &self,
        broadcast_id: &str,
        stream_id: &str,
    ) -> impl Future<Output = Result<LiveBroadcast, CallError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveSessionRequest {
    pub title: String,
    /// How long after "now" the broadcast is scheduled to start.
    pub scheduled_start_offset: SignedDuration,
}

/// Everything an encoder needs to start pushing video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveSessionResult {
    pub ingest_url: String,
    pub stream_key: String,
    pub broadcast_id: String,
    pub stream_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_ingest_url: Option<String>,
    pub scheduled_start_time: Timestamp,
}

impl LiveSessionResult {
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.broadcast_id)
    }
}

#[derive(Debug, Clone)]
pub struct LiveProvisioner<A> {
    api: A,
    profile: LiveProfile,
}

impl<A: LiveApi> LiveProvisioner<A> {
    pub fn new(api: A, profile: LiveProfile) -> Self {
        Self { api, profile }
    }

    /// Provisions a session called `title`, scheduled with the profile's default offset.
    pub async fn provision(&self, title: &str) -> Result<LiveSessionResult, ProvisionError> {
        self.provision_request(&LiveSessionRequest {
            title: title.to_string(),
            scheduled_start_offset: self.profile.schedule_offset,
        })
        .await
    }

    #[tracing::instrument(skip(self), fields(title = %request.title))]
    pub async fn provision_request(
        &self,
        request: &LiveSessionRequest,
    ) -> Result<LiveSessionResult, ProvisionError> {
        let stream = self
            .api
            .insert_stream(&self.stream_insert(&request.title))
            .await
            .map_err(|e| failed(ProvisionStep::StreamCreation, None, None, e))?;
        tracing::debug!(stream_id = %stream.id, "created ingest stream");

        let scheduled_start_time = Timestamp::now()
            .checked_add(request.scheduled_start_offset)
            .unwrap_or(Timestamp::MAX);
        let broadcast = self
            .api
            .insert_broadcast(&LiveBroadcastInsert {
                snippet: LiveBroadcastSnippet {
                    title: format!("{} Broadcast", request.title),
                    scheduled_start_time,
                },
                status: LiveBroadcastStatus {
                    privacy_status: self.profile.privacy,
                },
            })
            .await
            .map_err(|e| {
                failed(ProvisionStep::BroadcastCreation, Some(&stream.id), None, e)
            })?;
        tracing::debug!(broadcast_id = %broadcast.id, "created broadcast");

        self.api
            .bind(&broadcast.id, &stream.id)
            .await
            .map_err(|e| {
                failed(
                    ProvisionStep::Binding,
                    Some(&stream.id),
                    Some(&broadcast.id),
                    e,
                )
            })?;

        let Some(info) = stream.cdn.and_then(|cdn| cdn.ingestion_info) else {
            return Err(ProvisionError {
                step: ProvisionStep::IngestExtraction,
                stream_id: Some(stream.id.clone()),
                broadcast_id: Some(broadcast.id),
                source: ProvisionCause::MissingIngestionInfo(stream.id),
            });
        };

        tracing::info!(
            broadcast_id = %broadcast.id,
            stream_id = %stream.id,
            "live session ready"
        );
        Ok(LiveSessionResult {
            ingest_url: info.ingestion_address,
            stream_key: info.stream_name,
            broadcast_id: broadcast.id,
            stream_id: stream.id,
            backup_ingest_url: info.backup_ingestion_address,
            scheduled_start_time,
        })
    }

    fn stream_insert(&self, title: &str) -> LiveStreamInsert {
        LiveStreamInsert {
            snippet: LiveStreamInsertSnippet {
                title: title.to_string(),
            },
            cdn: CdnSettings {
                frame_rate: self.profile.frame_rate.clone(),
                resolution: self.profile.resolution.clone(),
                ingestion_type: self.profile.ingestion_type.clone(),
                ingestion_info: None,
            },
        }
    }
}

fn failed(
    step: ProvisionStep,
    stream_id: Option<&String>,
    broadcast_id: Option<&String>,
    error: CallError,
) -> ProvisionError {
    let error = ProvisionError {
        step,
        stream_id: stream_id.cloned(),
        broadcast_id: broadcast_id.cloned(),
        source: error.into(),
    };
    tracing::warn!(%error, "live provisioning aborted");
    error
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::youtube_api::streams::IngestionInfo;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Records every call and answers like the platform would.
    #[derive(Default)]
    struct FakeLive {
        calls: Mutex<Vec<String>>,
        streams: Mutex<Vec<LiveStreamInsert>>,
        broadcasts: Mutex<Vec<LiveBroadcastInsert>>,
        fail_broadcast: bool,
        fail_bind: bool,
        no_ingestion_info: bool,
    }

    fn rejected(message: &str) -> CallError {
        CallError::Api(ApiError {
            status: 403,
            message: message.to_string(),
            reason: Some("liveStreamingNotEnabled".into()),
        })
    }

    impl LiveApi for FakeLive {
        async fn insert_stream(&self, stream: &LiveStreamInsert) -> Result<LiveStream, CallError> {
            self.calls.lock().unwrap().push("insert_stream".into());
            self.streams.lock().unwrap().push(stream.clone());
            let ingestion_info = (!self.no_ingestion_info).then(|| IngestionInfo {
                stream_name: "abcd-efgh-ijkl-mnop".into(),
                ingestion_address: "rtmp://a.rtmp.youtube.com/live2".into(),
                backup_ingestion_address: Some(
                    "rtmp://b.rtmp.youtube.com/live2?backup=1".into(),
                ),
            });
            Ok(LiveStream {
                id: "s1".into(),
                snippet: None,
                cdn: Some(CdnSettings {
                    ingestion_info,
                    ..stream.cdn.clone()
                }),
            })
        }

        async fn insert_broadcast(
            &self,
            broadcast: &LiveBroadcastInsert,
        ) -> Result<LiveBroadcast, CallError> {
            self.calls.lock().unwrap().push("insert_broadcast".into());
            self.broadcasts.lock().unwrap().push(broadcast.clone());
            if self.fail_broadcast {
                return Err(rejected("Live streaming is not enabled for this channel."));
            }
            Ok(LiveBroadcast {
                id: "b1".into(),
                snippet: Some(broadcast.snippet.clone()),
                status: Some(broadcast.status.clone()),
                content_details: None,
            })
        }

        async fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<LiveBroadcast, CallError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("bind {broadcast_id}<->{stream_id}"));
            if self.fail_bind {
                return Err(rejected("bind refused"));
            }
            Ok(LiveBroadcast {
                id: broadcast_id.into(),
                snippet: None,
                status: None,
                content_details: None,
            })
        }
    }

    fn calls(api: &FakeLive) -> Vec<String> {
        api.calls.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn provisions_stream_broadcast_and_binding() {
        let provisioner = LiveProvisioner::new(FakeLive::default(), LiveProfile::default());

        let before = Timestamp::now();
        let result = provisioner.provision("Test Show").await.unwrap();

        assert_eq!(
            calls(&provisioner.api),
            vec!["insert_stream", "insert_broadcast", "bind b1<->s1"]
        );
        assert_eq!(result.stream_id, "s1");
        assert_eq!(result.broadcast_id, "b1");
        assert_eq!(result.ingest_url, "rtmp://a.rtmp.youtube.com/live2");
        assert_eq!(result.stream_key, "abcd-efgh-ijkl-mnop");
        assert_eq!(
            result.backup_ingest_url.as_deref(),
            Some("rtmp://b.rtmp.youtube.com/live2?backup=1")
        );

        let broadcast = provisioner.api.broadcasts.lock().unwrap()[0].clone();
        assert_eq!(broadcast.snippet.title, "Test Show Broadcast");
        assert_eq!(broadcast.status.privacy_status, crate::PrivacyStatus::Public);
        let drift = broadcast
            .snippet
            .scheduled_start_time
            .duration_since(before)
            - SignedDuration::from_mins(5);
        assert!(drift.abs() <= SignedDuration::from_secs(1), "drift {drift:?}");
        assert_eq!(broadcast.snippet.scheduled_start_time, result.scheduled_start_time);

        let stream = provisioner.api.streams.lock().unwrap()[0].clone();
        assert_eq!(stream.snippet.title, "Test Show");
        assert_eq!(stream.cdn.frame_rate, "30fps");
        assert_eq!(stream.cdn.resolution, "1080p");
        assert_eq!(stream.cdn.ingestion_type, "rtmp");
    }

    #[tokio::test]
    async fn broadcast_failure_skips_binding() {
        let api = FakeLive {
            fail_broadcast: true,
            ..FakeLive::default()
        };
        let provisioner = LiveProvisioner::new(api, LiveProfile::default());

        let err = provisioner.provision("Test Show").await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::BroadcastCreation);
        assert_eq!(err.stream_id.as_deref(), Some("s1"));
        assert_eq!(err.broadcast_id, None);
        assert!(err.to_string().contains("broadcast creation"));
        assert!(err.to_string().contains("s1"));
        assert_eq!(
            calls(&provisioner.api),
            vec!["insert_stream", "insert_broadcast"]
        );
    }

    #[tokio::test]
    async fn bind_failure_reports_both_resources() {
        let api = FakeLive {
            fail_bind: true,
            ..FakeLive::default()
        };
        let provisioner = LiveProvisioner::new(api, LiveProfile::default());

        let err = provisioner.provision("Late Night").await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::Binding);
        assert_eq!(err.stream_id.as_deref(), Some("s1"));
        assert_eq!(err.broadcast_id.as_deref(), Some("b1"));
        assert!(matches!(err.source, ProvisionCause::Call(CallError::Api(_))));
    }

    #[tokio::test]
    async fn missing_ingestion_info_is_an_extraction_failure() {
        let api = FakeLive {
            no_ingestion_info: true,
            ..FakeLive::default()
        };
        let provisioner = LiveProvisioner::new(api, LiveProfile::default());

        let err = provisioner.provision("Quiet").await.unwrap_err();
        assert_eq!(err.step, ProvisionStep::IngestExtraction);
        assert!(matches!(err.source, ProvisionCause::MissingIngestionInfo(ref id) if id == "s1"));
    }

    #[tokio::test]
    async fn custom_offset_is_honoured() {
        let provisioner = LiveProvisioner::new(FakeLive::default(), LiveProfile::default());
        let before = Timestamp::now();
        let result = provisioner
            .provision_request(&LiveSessionRequest {
                title: "Tomorrow".into(),
                scheduled_start_offset: SignedDuration::from_hours(24),
            })
            .await
            .unwrap();
        let offset = result.scheduled_start_time.duration_since(before);
        assert!(offset >= SignedDuration::from_hours(24));
        assert!(offset < SignedDuration::from_hours(24) + SignedDuration::from_secs(1));
    }

    #[test]
    fn result_serializes_for_scripts() {
        let result = LiveSessionResult {
            ingest_url: "rtmp://a.rtmp.youtube.com/live2".into(),
            stream_key: "abcd-efgh".into(),
            broadcast_id: "b1".into(),
            stream_id: "s1".into(),
            backup_ingest_url: None,
            scheduled_start_time: "2025-03-01T12:05:00Z".parse().unwrap(),
        };
        insta::assert_json_snapshot!(result, @r#"
        {
          "ingest_url": "rtmp://a.rtmp.youtube.com/live2",
          "stream_key": "abcd-efgh",
          "broadcast_id": "b1",
          "stream_id": "s1",
          "scheduled_start_time": "2025-03-01T12:05:00Z"
        }
        "#);
    }
}

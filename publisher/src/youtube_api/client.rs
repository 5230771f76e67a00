//! The authenticated API handle.

use crate::config::ApiEndpoints;
use crate::error::{ApiError, CallError, TransportError};
use crate::live::LiveApi;
use crate::upload::{Chunk, ChunkResponse, ResumableTransport, UploadSession};
use crate::youtube_api::{
    broadcasts::{LiveBroadcast, LiveBroadcastInsert},
    streams::{LiveStream, LiveStreamInsert},
    videos::{Video, VideoInsert},
};
use http::{Method, StatusCode, header};
use oauth2::AccessToken;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::io::ReaderStream;
use tracing::instrument;

/// Statuses on which Google asks resumable clients to query the session and resume.
const RESUMABLE_RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// A YouTube Data API client bound to one access token.
///
/// The handle does not refresh its token; get a fresh one from
/// [`AuthSessionManager`](crate::session::AuthSessionManager) for each user action.
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    /// `AccessToken` redacts itself in `Debug` output.
    access_token: AccessToken,
    client: reqwest::Client,
    endpoints: ApiEndpoints,
}

impl YouTubeClient {
    pub fn new(access_token: String, client: reqwest::Client, endpoints: ApiEndpoints) -> Self {
        Self {
            access_token: AccessToken::new(access_token),
            client,
            endpoints,
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.secret()
    }

    pub fn endpoints(&self) -> &ApiEndpoints {
        &self.endpoints
    }

    fn authorized(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.access_token.secret())
    }

    async fn send(
        &self,
        url: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CallError> {
        request
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.to_string(),
                source,
            })
            .map_err(CallError::from)
    }

    pub(crate) async fn make_authenticated_request(
        &self,
        method: Method,
        url: &str,
        query_params: Option<&[(&str, &str)]>,
        json_body: Option<&impl Serialize>,
    ) -> Result<reqwest::Response, CallError> {
        let mut request = self.authorized(method, url);

        if let Some(params) = query_params {
            request = request.query(params);
        }
        if let Some(body) = json_body {
            request = request.json(body);
        }

        let response = self.send(url, request).await?;
        if !response.status().is_success() {
            return Err(api_error(response).await.into());
        }
        Ok(response)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        what: &'static str,
        url: &str,
        query_params: &[(&str, &str)],
        json_body: Option<&impl Serialize>,
    ) -> Result<T, CallError> {
        self.make_authenticated_request(Method::POST, url, Some(query_params), json_body)
            .await?
            .json()
            .await
            .map_err(|source| CallError::Decode { what, source })
    }

    /// Creates an ingest stream.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveStreams/insert>
    #[instrument(skip_all, fields(title = %stream.snippet.title))]
    pub async fn insert_live_stream(
        &self,
        stream: &LiveStreamInsert,
    ) -> Result<LiveStream, CallError> {
        let url = format!("{}/liveStreams", self.endpoints.api_base);
        self.call(
            "liveStreams.insert",
            &url,
            &[("part", "snippet,cdn,contentDetails")],
            Some(stream),
        )
        .await
    }

    /// Creates a scheduled broadcast.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/insert>
    #[instrument(skip_all, fields(title = %broadcast.snippet.title))]
    pub async fn insert_live_broadcast(
        &self,
        broadcast: &LiveBroadcastInsert,
    ) -> Result<LiveBroadcast, CallError> {
        let url = format!("{}/liveBroadcasts", self.endpoints.api_base);
        self.call(
            "liveBroadcasts.insert",
            &url,
            &[("part", "snippet,contentDetails,status")],
            Some(broadcast),
        )
        .await
    }

    /// Binds a broadcast to the stream that will carry its video.
    ///
    /// <https://developers.google.com/youtube/v3/live/docs/liveBroadcasts/bind>
    #[instrument(skip(self))]
    pub async fn bind_live_broadcast(
        &self,
        broadcast_id: &str,
        stream_id: &str,
    ) -> Result<LiveBroadcast, CallError> {
        let url = format!("{}/liveBroadcasts/bind", self.endpoints.api_base);
        self.call(
            "liveBroadcasts.bind",
            &url,
            &[
                ("part", "id,contentDetails"),
                ("id", broadcast_id),
                ("streamId", stream_id),
            ],
            None::<&()>,
        )
        .await
    }

    /// Opens a resumable upload session and returns its URI.
    ///
    /// <https://developers.google.com/youtube/v3/guides/using_resumable_upload_protocol>
    #[instrument(skip_all, fields(title = %metadata.snippet.title, total_bytes = total_bytes))]
    pub async fn begin_resumable_upload(
        &self,
        metadata: &VideoInsert,
        total_bytes: u64,
        mime_type: &str,
    ) -> Result<UploadSession, CallError> {
        let url = format!("{}/videos", self.endpoints.upload_base);
        let request = self
            .authorized(Method::POST, &url)
            .query(&[("uploadType", "resumable"), ("part", "snippet,status")])
            .header("X-Upload-Content-Type", mime_type)
            .header("X-Upload-Content-Length", total_bytes)
            .json(metadata);

        let response = self.send(&url, request).await?;
        let status = response.status();
        if RESUMABLE_RETRY_STATUSES.contains(&status.as_u16()) {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(api_error(response).await.into());
        }

        let uri = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                CallError::Protocol("upload session response has no Location header".into())
            })?;
        Ok(UploadSession {
            uri: uri.to_string(),
        })
    }

    /// Streams one window of the source into the session.
    #[instrument(skip_all, fields(offset = chunk.offset, len = chunk.len, total = chunk.total))]
    pub async fn upload_chunk(
        &self,
        session: &UploadSession,
        chunk: Chunk,
    ) -> Result<ChunkResponse, CallError> {
        let Chunk {
            offset,
            len,
            total,
            body,
        } = chunk;
        let content_range = if len == 0 {
            format!("bytes */{total}")
        } else {
            format!("bytes {offset}-{}/{total}", offset + len - 1)
        };
        let request = self
            .authorized(Method::PUT, &session.uri)
            .header(header::CONTENT_RANGE, content_range)
            .header(header::CONTENT_LENGTH, len)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(
                body.into_reader(),
            )));

        let response = self.send(&session.uri, request).await?;
        chunk_response(&session.uri, response).await
    }

    /// Asks the session how many bytes it holds.
    #[instrument(skip_all)]
    pub async fn query_upload_status(
        &self,
        session: &UploadSession,
        total_bytes: u64,
    ) -> Result<ChunkResponse, CallError> {
        let request = self
            .authorized(Method::PUT, &session.uri)
            .header(header::CONTENT_RANGE, format!("bytes */{total_bytes}"))
            .header(header::CONTENT_LENGTH, 0);

        let response = self.send(&session.uri, request).await?;
        chunk_response(&session.uri, response).await
    }
}

async fn api_error(response: reqwest::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ApiError::from_body(status, &body)
}

/// Interprets the answer to a chunk or a status query.
async fn chunk_response(url: &str, response: reqwest::Response) -> Result<ChunkResponse, CallError> {
    let status = response.status();
    match status {
        StatusCode::OK | StatusCode::CREATED => {
            let video: Video = response
                .json()
                .await
                .map_err(|source| CallError::Decode {
                    what: "uploaded video",
                    source,
                })?;
            Ok(ChunkResponse::Complete(video))
        }
        StatusCode::PERMANENT_REDIRECT => {
            let range = response
                .headers()
                .get(header::RANGE)
                .map(|v| v.to_str().unwrap_or_default());
            let acknowledged = acknowledged_from_range(range)?;
            tracing::trace!(acknowledged, "server acknowledged bytes");
            Ok(ChunkResponse::Incomplete { acknowledged })
        }
        s if RESUMABLE_RETRY_STATUSES.contains(&s.as_u16()) => Err(TransportError::Status {
            url: url.to_string(),
            status: s.as_u16(),
        }
        .into()),
        _ => Err(api_error(response).await.into()),
    }
}

/// Parses the `Range: bytes=0-N` header of a `308` into the number of bytes held.
fn acknowledged_from_range(range: Option<&str>) -> Result<u64, CallError> {
    let Some(range) = range else {
        return Ok(0);
    };
    let last = range
        .trim()
        .strip_prefix("bytes=0-")
        .and_then(|n| n.parse::<u64>().ok())
        .ok_or_else(|| CallError::Protocol(format!("unexpected Range header '{range}'")))?;
    Ok(last + 1)
}

impl LiveApi for YouTubeClient {
    async fn insert_stream(&self, stream: &LiveStreamInsert) -> Result<LiveStream, CallError> {
        self.insert_live_stream(stream).await
    }

    async fn insert_broadcast(
        &self,
        broadcast: &LiveBroadcastInsert,
    ) -> Result<LiveBroadcast, CallError> {
        self.insert_live_broadcast(broadcast).await
    }

    async fn bind(&self, broadcast_id: &str, stream_id: &str) -> Result<LiveBroadcast, CallError> {
        self.bind_live_broadcast(broadcast_id, stream_id).await
    }
}

impl ResumableTransport for YouTubeClient {
    async fn begin(
        &self,
        metadata: &VideoInsert,
        total_bytes: u64,
        mime_type: &str,
    ) -> Result<UploadSession, CallError> {
        self.begin_resumable_upload(metadata, total_bytes, mime_type)
            .await
    }

    async fn send_chunk(
        &self,
        session: &UploadSession,
        chunk: Chunk,
    ) -> Result<ChunkResponse, CallError> {
        self.upload_chunk(session, chunk).await
    }

    async fn query_status(
        &self,
        session: &UploadSession,
        total_bytes: u64,
    ) -> Result<ChunkResponse, CallError> {
        self.query_upload_status(session, total_bytes).await
    }
}

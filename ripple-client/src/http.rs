//! HTTP transport over the feed REST API.
//!
//! One typed method per feed operation, sharing a single response-mapping
//! path into the engine's transport taxonomy: 2xx decodes the authoritative
//! record (`Decode` on a body the client cannot parse), 401/403 becomes
//! `Unauthorized`, any other non-2xx becomes `Rejected` carrying the
//! server's `{ code, message }` body when it sends one, and transport-level
//! failures become `Network`.

use crate::config::{AuthConfig, ClientConfig};
use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Response, StatusCode};
use ripple_core::{
    ActorId, Badge, Comment, CommentId, CommentPatch, FeedOp, LocalIdentity, Report, ReportId,
    ReportPatch, TransportError,
};
use ripple_engine::FeedTransport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Error body the server sends for application-level rejections.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Serialize)]
struct UpvoteBody {
    upvoted: bool,
}

#[derive(Debug, Serialize)]
struct FlagBody {
    flagged: bool,
}

#[derive(Debug, Serialize)]
struct LikeBody {
    liked: bool,
}

#[derive(Debug, Serialize)]
struct PinBody {
    pinned: bool,
}

#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    auth_headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        let auth_headers = build_auth_headers(&config.auth)?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            auth_headers,
        })
    }

    /// Identity bootstrap. Not part of the feed transport: the engine never
    /// calls it, the session layer does, once, at login.
    pub async fn fetch_identity(&self) -> Result<LocalIdentity, ClientError> {
        let url = format!("{}/api/identity/me", self.base_url);
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers.clone())
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<LocalIdentity>().await?)
        } else {
            let text = response.text().await.unwrap_or_default();
            Err(ClientError::InvalidResponse(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )))
        }
    }

    // ------------------------------------------------------------------------
    // Request helpers
    // ------------------------------------------------------------------------

    async fn get_json<T>(&self, op: FeedOp, path: &str) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(url)
            .headers(self.auth_headers.clone())
            .send()
            .await
            .map_err(|err| network(op, err))?;
        self.parse_response(op, response).await
    }

    async fn post_json<T, B>(&self, op: FeedOp, path: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(url)
            .headers(self.auth_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| network(op, err))?;
        self.parse_response(op, response).await
    }

    async fn patch_json<T, B>(&self, op: FeedOp, path: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .patch(url)
            .headers(self.auth_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| network(op, err))?;
        self.parse_response(op, response).await
    }

    async fn put_json<T, B>(&self, op: FeedOp, path: &str, body: &B) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .put(url)
            .headers(self.auth_headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|err| network(op, err))?;
        self.parse_response(op, response).await
    }

    async fn delete(&self, op: FeedOp, path: &str) -> Result<(), TransportError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(url)
            .headers(self.auth_headers.clone())
            .send()
            .await
            .map_err(|err| network(op, err))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(op, response).await)
        }
    }

    async fn parse_response<T>(&self, op: FeedOp, response: Response) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
    {
        if response.status().is_success() {
            response
                .json::<T>()
                .await
                .map_err(|err| TransportError::Decode {
                    message: format!("{op}: {err}"),
                })
        } else {
            Err(rejection(op, response).await)
        }
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn create_report(&self, report: &Report) -> Result<Report, TransportError> {
        self.post_json(FeedOp::CreateReport, "/api/reports", report)
            .await
    }

    async fn update_report(
        &self,
        id: ReportId,
        patch: &ReportPatch,
    ) -> Result<Report, TransportError> {
        let path = format!("/api/reports/{id}");
        self.patch_json(FeedOp::UpdateReport, &path, patch).await
    }

    async fn delete_report(&self, id: ReportId) -> Result<(), TransportError> {
        let path = format!("/api/reports/{id}");
        self.delete(FeedOp::DeleteReport, &path).await
    }

    async fn set_report_upvote(
        &self,
        id: ReportId,
        upvoted: bool,
    ) -> Result<Report, TransportError> {
        let path = format!("/api/reports/{id}/upvote");
        self.put_json(FeedOp::SetReportUpvote, &path, &UpvoteBody { upvoted })
            .await
    }

    async fn set_report_flag(
        &self,
        id: ReportId,
        flagged: bool,
    ) -> Result<Report, TransportError> {
        let path = format!("/api/reports/{id}/flag");
        self.put_json(FeedOp::SetReportFlag, &path, &FlagBody { flagged })
            .await
    }

    async fn create_comment(&self, comment: &Comment) -> Result<Comment, TransportError> {
        self.post_json(FeedOp::CreateComment, "/api/comments", comment)
            .await
    }

    async fn update_comment(
        &self,
        id: CommentId,
        patch: &CommentPatch,
    ) -> Result<Comment, TransportError> {
        let path = format!("/api/comments/{id}");
        self.patch_json(FeedOp::UpdateComment, &path, patch).await
    }

    async fn delete_comment(&self, id: CommentId) -> Result<(), TransportError> {
        let path = format!("/api/comments/{id}");
        self.delete(FeedOp::DeleteComment, &path).await
    }

    async fn set_comment_like(
        &self,
        id: CommentId,
        liked: bool,
    ) -> Result<Comment, TransportError> {
        let path = format!("/api/comments/{id}/like");
        self.put_json(FeedOp::SetCommentLike, &path, &LikeBody { liked })
            .await
    }

    async fn set_comment_pin(
        &self,
        id: CommentId,
        pinned: bool,
    ) -> Result<Comment, TransportError> {
        let path = format!("/api/comments/{id}/pin");
        self.put_json(FeedOp::SetCommentPin, &path, &PinBody { pinned })
            .await
    }

    async fn fetch_feed(&self) -> Result<Vec<Report>, TransportError> {
        self.get_json(FeedOp::FetchFeed, "/api/feed").await
    }

    async fn fetch_comments(&self, report_id: ReportId) -> Result<Vec<Comment>, TransportError> {
        let path = format!("/api/reports/{report_id}/comments");
        self.get_json(FeedOp::FetchComments, &path).await
    }

    async fn fetch_badges(&self, actor_id: ActorId) -> Result<Vec<Badge>, TransportError> {
        let path = format!("/api/actors/{actor_id}/badges");
        self.get_json(FeedOp::FetchBadges, &path).await
    }
}

fn network(op: FeedOp, err: reqwest::Error) -> TransportError {
    TransportError::Network {
        op,
        message: err.to_string(),
    }
}

/// Map a non-2xx response. The server's own `{ code, message }` body wins;
/// a body in any other shape falls back to a status-derived code.
async fn rejection(op: FeedOp, response: Response) -> TransportError {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return TransportError::Unauthorized {
            op,
            message: format!("HTTP {}", status.as_u16()),
        };
    }
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => TransportError::Rejected {
            op,
            code: body.code,
            message: body.message,
        },
        Err(_) => TransportError::Rejected {
            op,
            code: format!("http_{}", status.as_u16()),
            message: if text.is_empty() {
                status.to_string()
            } else {
                text
            },
        },
    }
}

fn build_auth_headers(auth: &AuthConfig) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    if let Some(api_key) = &auth.api_key {
        headers.insert(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_str(api_key).map_err(|err| {
                ClientError::Config(crate::config::ConfigError::InvalidValue {
                    field: "auth.api_key",
                    reason: err.to_string(),
                })
            })?,
        );
    }
    if let Some(token) = &auth.bearer_token {
        let value = format!("Bearer {token}");
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&value).map_err(|err| {
                ClientError::Config(crate::config::ConfigError::InvalidValue {
                    field: "auth.bearer_token",
                    reason: err.to_string(),
                })
            })?,
        );
    }
    Ok(headers)
}

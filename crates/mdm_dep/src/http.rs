//! HTTP implementation of [`DepClient`].
//!
//! The transport is abstracted via [`HttpClient`]: it owns the authenticated
//! session with Apple and performs one request at a time. This module only
//! builds the JSON bodies and maps responses, including the cursor error
//! bodies, into [`DepError`].

use crate::client::{DepClient, DeviceResponse, ProfileAssignment};
use crate::error::{DepError, DepResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

/// Production DEP endpoint.
pub const DEFAULT_BASE_URL: &str = "https://mdmenrollment.apple.com";

/// HTTP method used by the DEP endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

/// A raw HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Authenticated HTTP transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a JSON request and returns the raw response.
    ///
    /// `Err` means no response was received.
    async fn send(&self, method: Method, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;
}

#[derive(Serialize)]
struct CursorRequest<'a> {
    #[serde(skip_serializing_if = "str::is_empty")]
    cursor: &'a str,
    limit: u32,
}

#[derive(Serialize)]
struct AssignRequest<'a> {
    profile_uuid: &'a str,
    devices: &'a [String],
}

/// DEP client speaking Apple's JSON API.
pub struct HttpDepClient<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpDepClient<C> {
    /// Creates a client against [`DEFAULT_BASE_URL`].
    pub fn new(client: C) -> Self {
        Self::with_base_url(DEFAULT_BASE_URL, client)
    }

    /// Creates a client against another endpoint.
    pub fn with_base_url(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<Req, Res>(&self, method: Method, path: &str, request: &Req) -> DepResult<Res>
    where
        Req: Serialize + Sync,
        Res: DeserializeOwned,
    {
        let body = serde_json::to_vec(request)
            .map_err(|e| DepError::Codec(format!("failed to encode request: {e}")))?;
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .send(method, &url, body)
            .await
            .map_err(DepError::transport_retryable)?;
        debug!(method = method.as_str(), path, status = response.status, "DEP request");

        match response.status {
            200..=299 => serde_json::from_slice(&response.body)
                .map_err(|e| DepError::Codec(format!("failed to decode response: {e}"))),
            400 => Err(classify_bad_request(&response.body)),
            status => Err(DepError::api(status, body_text(&response.body))),
        }
    }
}

fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body)
        .trim()
        .trim_matches('"')
        .to_string()
}

fn classify_bad_request(body: &[u8]) -> DepError {
    let text = body_text(body);
    match text.as_str() {
        "EXHAUSTED_CURSOR" => DepError::CursorExhausted,
        "EXPIRED_CURSOR" => DepError::CursorExpired,
        "INVALID_CURSOR" | "CURSOR_REQUIRED" => DepError::CursorInvalid,
        _ => DepError::api(400, text),
    }
}

#[async_trait]
impl<C: HttpClient> DepClient for HttpDepClient<C> {
    async fn fetch_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse> {
        self.call(Method::Post, "/server/devices", &CursorRequest { cursor, limit })
            .await
    }

    async fn sync_devices(&self, cursor: &str, limit: u32) -> DepResult<DeviceResponse> {
        self.call(Method::Post, "/devices/sync", &CursorRequest { cursor, limit })
            .await
    }

    async fn assign_profile(
        &self,
        profile_uuid: &str,
        serials: &[String],
    ) -> DepResult<ProfileAssignment> {
        let request = AssignRequest {
            profile_uuid,
            devices: serials,
        };
        self.call(Method::Put, "/profile/devices", &request).await
    }
}

impl<C: HttpClient> std::fmt::Debug for HttpDepClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDepClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

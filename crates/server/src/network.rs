//! Plain network access for pass-through and fallback requests.

use crate::error::{ProxyError, ProxyResult};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName};
use axum::http::{Method, Response};
use bytes::Bytes;
use std::time::Duration;
use url::Url;

/// Hop-by-hop headers, never forwarded in either direction.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
    HeaderName::from_static("keep-alive"),
];

/// Added to every forwarded request; carries one opaque id per proxy process.
pub const HOP_HEADER: HeaderName = HeaderName::from_static("x-pantry-hop");

/// A request to send over the network as-is.
#[derive(Clone, Debug)]
pub struct ForwardRequest {
    pub method: Method,
    /// Absolute destination URL.
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Sends requests to their real destination.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    async fn fetch(&self, request: ForwardRequest) -> ProxyResult<Response<Body>>;
}

/// reqwest-backed network. Redirects are returned to the requester rather
/// than followed.
pub struct HttpNetwork {
    http: reqwest::Client,
}

impl HttpNetwork {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProxyError::Upstream(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: ForwardRequest) -> ProxyResult<Response<Body>> {
        let mut headers = request.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .http
            .request(request.method, request.url.clone())
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| ProxyError::Upstream(format!("{}: {e}", request.url)))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

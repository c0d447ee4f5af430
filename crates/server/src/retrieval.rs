//! Retrieval client boundary and the HTTP provider client.
//!
//! The controller consumes retrieval through [`RetrievalClient`]; how a client
//! negotiates, pays or picks transports is its own business. [`GatewayClient`]
//! is the shipped implementation: it asks a provider speaking the gateway
//! path convention (`/ipfs/<cid>/<sub/path>`) and streams the body through a
//! [`TransferQueue`].

use crate::error::{ProxyError, ProxyResult, TransferError};
use crate::transfer::TransferQueue;
use async_trait::async_trait;
use axum::http::header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ETAG, USER_AGENT};
use axum::http::{HeaderMap, HeaderName, StatusCode};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use pantry_core::{ContentId, ContentPath, RetrievalConfig};
use pantry_storage::ContentCache;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Request headers passed on to providers.
const FORWARDED_HEADERS: [HeaderName; 3] = [ACCEPT, ACCEPT_LANGUAGE, USER_AGENT];

/// Provider response headers kept on the proxied response.
const KEPT_RESPONSE_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, ETAG];

/// Per-request retrieval options.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    /// Headers of the intercepted request.
    pub headers: HeaderMap,
    /// Preferred provider for this request, overriding the configured peer.
    pub provider: Option<String>,
}

/// How far a retrieved body can be trusted to match the requested identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provenance {
    /// Hashed against the identifier before the body ends; a mismatch fails
    /// the transfer instead.
    Verified,
    /// Unchecked, but served by the configured peer.
    TrustedPeer,
    /// Unchecked and from a provider named by the request itself.
    Unverified,
}

impl Provenance {
    /// Whether a completed body may be stored under the request's identifier.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Unverified)
    }
}

/// A successful retrieval: status and headers are known, the body is still arriving.
pub struct RetrievalResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub provenance: Provenance,
    pub body: TransferQueue<Bytes, TransferError>,
}

/// Fetches content by path from the peer network.
#[async_trait]
pub trait RetrievalClient: Send + Sync + 'static {
    /// Start a retrieval. Rejection is reported as an error; failures after
    /// the response started arrive through the body queue.
    async fn fetch(
        &self,
        path: &ContentPath,
        options: FetchOptions,
    ) -> Result<RetrievalResponse, TransferError>;

    /// Static identifier for the client type, used for logging.
    fn name(&self) -> &'static str;
}

/// Constructs the retrieval client for a worker generation.
///
/// The client receives the content cache as its block store.
#[async_trait]
pub trait ClientBuilder: Send + Sync + 'static {
    async fn build(
        &self,
        config: &RetrievalConfig,
        cache: ContentCache,
    ) -> ProxyResult<Arc<dyn RetrievalClient>>;
}

/// Builds [`GatewayClient`]s sharing one HTTP connection pool.
pub struct GatewayClientBuilder {
    http: reqwest::Client,
}

impl GatewayClientBuilder {
    pub fn new(timeout: Duration) -> ProxyResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pantry/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProxyError::ClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl ClientBuilder for GatewayClientBuilder {
    async fn build(
        &self,
        config: &RetrievalConfig,
        cache: ContentCache,
    ) -> ProxyResult<Arc<dyn RetrievalClient>> {
        let peer = config
            .peer
            .as_deref()
            .map(parse_provider)
            .transpose()
            .map_err(|e| ProxyError::ClientBuild(e.to_string()))?;

        if peer.is_none() {
            tracing::warn!("No default peer configured; only requests naming a peer can be retrieved");
        }
        if let Some(total) = config.quoted_total() {
            tracing::info!(quoted_total = %total, "Retrieval terms loaded");
        }

        Ok(Arc::new(GatewayClient {
            http: self.http.clone(),
            peer,
            config: config.clone(),
            cache,
        }))
    }
}

/// Retrieval client for HTTP providers.
pub struct GatewayClient {
    http: reqwest::Client,
    peer: Option<Url>,
    config: RetrievalConfig,
    cache: ContentCache,
}

/// Checks applied while a body streams in.
struct TransferPlan {
    size_limit: Option<u64>,
    verify: Option<ContentId>,
}

impl GatewayClient {
    fn plan(&self, path: &ContentPath) -> TransferPlan {
        let is_target = path.is_root() && self.config.cid.as_ref() == Some(path.root());
        TransferPlan {
            size_limit: if is_target { self.config.size } else { None },
            verify: (path.is_root() && path.root().is_raw()).then(|| *path.root()),
        }
    }
}

#[async_trait]
impl RetrievalClient for GatewayClient {
    async fn fetch(
        &self,
        path: &ContentPath,
        options: FetchOptions,
    ) -> Result<RetrievalResponse, TransferError> {
        let (provider, trusted) = match options.provider.as_deref() {
            Some(raw) => {
                let provider = parse_provider(raw)?;
                let trusted = self.peer.as_ref() == Some(&provider);
                (provider, trusted)
            }
            None => (self.peer.clone().ok_or(TransferError::NoProvider)?, true),
        };
        let url = provider
            .join(&path.gateway_path())
            .map_err(|e| TransferError::Provider(e.to_string()))?;

        let mut request = self.http.get(url.clone());
        for name in &FORWARDED_HEADERS {
            if let Some(value) = options.headers.get(name) {
                request = request.header(name, value.clone());
            }
        }

        tracing::debug!(%url, "Requesting content from provider");
        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Provider(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Rejected {
                status: status.as_u16(),
            });
        }

        let mut headers = HeaderMap::new();
        for name in &KEPT_RESPONSE_HEADERS {
            if let Some(value) = response.headers().get(name) {
                headers.insert(name.clone(), value.clone());
            }
        }

        let plan = self.plan(path);
        let provenance = if plan.verify.is_some() {
            Provenance::Verified
        } else if trusted {
            Provenance::TrustedPeer
        } else {
            Provenance::Unverified
        };

        let body = TransferQueue::new();
        tokio::spawn(pump(response, body.clone(), plan, self.cache.clone()));

        Ok(RetrievalResponse {
            status,
            headers,
            provenance,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

/// Forward a provider body into `queue`, then index the completed payload in
/// the block store under its own raw identifier before ending the sequence.
async fn pump(
    response: reqwest::Response,
    queue: TransferQueue<Bytes, TransferError>,
    plan: TransferPlan,
    cache: ContentCache,
) {
    let mut stream = response.bytes_stream();
    let mut payload = BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                queue.fail(TransferError::Provider(e.to_string()));
                return;
            }
        };
        payload.extend_from_slice(&chunk);
        if let Some(limit) = plan.size_limit
            && payload.len() as u64 > limit
        {
            queue.fail(TransferError::SizeExceeded { limit });
            return;
        }
        queue.push(chunk);
    }

    let payload = payload.freeze();
    if let Some(root) = plan.verify
        && !root.verify(&payload)
    {
        tracing::warn!(cid = %root, "Provider returned content that does not match its identifier");
        queue.fail(TransferError::Verification(root.to_string()));
        return;
    }

    let block = ContentId::for_raw_bytes(&payload);
    if let Err(e) = cache.put(&block, payload).await {
        tracing::warn!(cid = %block, error = %e, "Failed to index retrieved block");
    }
    queue.stop();
}

fn parse_provider(raw: &str) -> Result<Url, TransferError> {
    let url = Url::parse(raw)
        .map_err(|e| TransferError::Provider(format!("invalid provider address {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(TransferError::Provider(format!(
            "provider address must be an http(s) URL: {raw}"
        ))),
    }
}

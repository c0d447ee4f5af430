//! Scripted collaborators for controller tests.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, ETAG};
use axum::http::{HeaderMap, HeaderValue, Method, Response, StatusCode};
use bytes::Bytes;
use pantry_core::{ContentPath, RetrievalConfig};
use pantry_server::error::{ProxyError, ProxyResult, TransferError};
use pantry_server::network::{ForwardRequest, Network};
use pantry_server::retrieval::{
    ClientBuilder, FetchOptions, Provenance, RetrievalClient, RetrievalResponse,
};
use pantry_server::transfer::TransferQueue;
use pantry_storage::ContentCache;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What a [`StubClient`] does when asked to fetch.
#[allow(dead_code)]
#[derive(Clone)]
pub enum Script {
    /// Reject the request outright.
    Reject,
    /// Stream these chunks, then end.
    Chunks(Vec<Bytes>),
    /// Stream these chunks, then fail.
    FailAfter(Vec<Bytes>),
}

/// A recorded call to [`StubClient::fetch`].
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct RecordedFetch {
    pub path: String,
    pub provider: Option<String>,
    pub headers: HeaderMap,
}

/// Content type every scripted retrieval is served with.
pub const STUB_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// ETag every scripted retrieval is served with.
pub const STUB_ETAG: &str = "\"stub\"";

/// Retrieval client that follows a script and records its calls.
///
/// Like the gateway client, it trusts its own peer and nothing named by the
/// request.
#[allow(dead_code)]
pub struct StubClient {
    script: Mutex<Script>,
    calls: Mutex<Vec<RecordedFetch>>,
}

#[allow(dead_code)]
impl StubClient {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock() = script;
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<RecordedFetch> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RetrievalClient for StubClient {
    async fn fetch(
        &self,
        path: &ContentPath,
        options: FetchOptions,
    ) -> Result<RetrievalResponse, TransferError> {
        self.calls.lock().push(RecordedFetch {
            path: path.request_path(),
            provider: options.provider.clone(),
            headers: options.headers.clone(),
        });

        let script = self.script.lock().clone();
        let (chunks, fail) = match script {
            Script::Reject => return Err(TransferError::Rejected { status: 404 }),
            Script::Chunks(chunks) => (chunks, false),
            Script::FailAfter(chunks) => (chunks, true),
        };

        let body = TransferQueue::new();
        let producer = body.clone();
        tokio::spawn(async move {
            for chunk in chunks {
                tokio::task::yield_now().await;
                producer.push(chunk);
            }
            tokio::task::yield_now().await;
            if fail {
                producer.fail(TransferError::Provider("peer went away".to_string()));
            } else {
                producer.stop();
            }
        });

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(STUB_CONTENT_TYPE));
        headers.insert(ETAG, HeaderValue::from_static(STUB_ETAG));
        let provenance = if options.provider.is_some() {
            Provenance::Unverified
        } else {
            Provenance::TrustedPeer
        };

        Ok(RetrievalResponse {
            status: StatusCode::OK,
            headers,
            provenance,
            body,
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Hands out one shared [`StubClient`]; can be told to fail the next builds.
#[allow(dead_code)]
pub struct StubBuilder {
    pub client: Arc<StubClient>,
    failures_remaining: AtomicUsize,
    seen: Mutex<Vec<RetrievalConfig>>,
}

#[allow(dead_code)]
impl StubBuilder {
    pub fn new(client: Arc<StubClient>) -> Arc<Self> {
        Arc::new(Self {
            client,
            failures_remaining: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Make the next `n` builds fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    /// Retrieval configurations passed to successful and failed builds.
    pub fn seen(&self) -> Vec<RetrievalConfig> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl ClientBuilder for StubBuilder {
    async fn build(
        &self,
        config: &RetrievalConfig,
        _cache: ContentCache,
    ) -> ProxyResult<Arc<dyn RetrievalClient>> {
        self.seen.lock().push(config.clone());
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(ProxyError::ClientBuild("scripted failure".to_string()));
        }
        Ok(self.client.clone())
    }
}

/// A request seen by [`RecordingNetwork`].
#[allow(dead_code)]
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Network that answers every request with `network <METHOD> <url>`.
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingNetwork {
    requests: Mutex<Vec<RecordedRequest>>,
}

#[allow(dead_code)]
impl RecordingNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// The body this network returns for a request.
    pub fn expected_body(method: &Method, url: &str) -> String {
        format!("network {method} {url}")
    }
}

#[async_trait]
impl Network for RecordingNetwork {
    async fn fetch(&self, request: ForwardRequest) -> ProxyResult<Response<Body>> {
        let body = Self::expected_body(&request.method, request.url.as_str());
        self.requests.lock().push(RecordedRequest {
            method: request.method,
            url: request.url.to_string(),
            headers: request.headers,
            body: request.body,
        });

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::IM_A_TEAPOT;
        Ok(response)
    }
}

//! Interception controller.
//!
//! Owns the worker lifecycle and decides, per request, between the content
//! cache, the retrieval client and the plain network.

use crate::error::{ProxyError, ProxyResult, TransferError};
use crate::lifecycle::{Lifecycle, LifecycleEvent, WorkerLifecycleState};
use crate::metrics;
use crate::network::{ForwardRequest, HOP_HEADER, Network};
use crate::retrieval::{ClientBuilder, FetchOptions, RetrievalResponse};
use crate::state::WorkerContext;
use crate::transfer::TransferQueue;
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, HOST};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{Bytes, BytesMut};
use pantry_core::config::ServerConfig;
use pantry_core::{ContentId, ContentPath, EntryMeta, RetrievalConfig};
use pantry_storage::{ConfigSlot, ContentCache, Datastore};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::instrument;
use url::{Origin, Url};
use uuid::Uuid;

/// Snapshot of the controller for the status endpoint.
#[derive(Debug, Serialize)]
pub struct ControllerStatus {
    pub state: WorkerLifecycleState,
    /// Generation serving traffic, if any.
    pub generation: Option<u64>,
    /// Generation installed and waiting for activation, if any.
    pub staged_generation: Option<u64>,
    /// Retrieval parameters of the serving generation.
    pub retrieval: Option<RetrievalConfig>,
}

pub struct Controller {
    origin: Url,
    local: Vec<Origin>,
    /// Marks requests this process forwarded, so one that comes back is refused.
    hop_id: HeaderValue,
    upstream: Option<Url>,
    cache: ContentCache,
    slot: ConfigSlot,
    builder: Arc<dyn ClientBuilder>,
    network: Arc<dyn Network>,
    lifecycle: Lifecycle,
    staged: Mutex<Option<Arc<WorkerContext>>>,
    active: RwLock<Option<Arc<WorkerContext>>>,
    generations: AtomicU64,
}

impl Controller {
    /// Create a controller over a (possibly unopened) datastore.
    pub fn new(
        server: &ServerConfig,
        datastore: Arc<dyn Datastore>,
        builder: Arc<dyn ClientBuilder>,
        network: Arc<dyn Network>,
    ) -> ProxyResult<Self> {
        Ok(Self {
            origin: server.origin_url()?,
            local: server.local_origins()?,
            hop_id: HeaderValue::from_str(&Uuid::new_v4().to_string())
                .map_err(|e| ProxyError::InvalidRequest(e.to_string()))?,
            upstream: server.upstream_url()?,
            cache: ContentCache::new(datastore.clone()),
            slot: ConfigSlot::new(datastore),
            builder,
            network,
            lifecycle: Lifecycle::new(),
            staged: Mutex::new(None),
            active: RwLock::new(None),
            generations: AtomicU64::new(0),
        })
    }

    /// The content cache shared by every generation.
    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// The reserved configuration slot.
    pub fn config_slot(&self) -> &ConfigSlot {
        &self.slot
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn state(&self) -> WorkerLifecycleState {
        self.lifecycle.state()
    }

    /// Register the install and activate handlers. Returns `false` when both
    /// were already registered.
    pub fn register(&self) -> bool {
        let install = self.lifecycle.register(LifecycleEvent::Install);
        let activate = self.lifecycle.register(LifecycleEvent::Activate);
        install || activate
    }

    /// Load the persisted retrieval configuration, build a client and stage a
    /// new generation. On failure the previous state is restored and the
    /// serving generation, if any, is untouched.
    #[instrument(skip(self))]
    pub async fn install(&self) -> ProxyResult<u64> {
        let previous = self.lifecycle.begin_install()?;
        match self.prepare().await {
            Ok(context) => {
                let generation = context.generation;
                *self.staged.lock() = Some(context);
                self.lifecycle.finish_install();
                tracing::info!(generation, "Worker installed");
                Ok(generation)
            }
            Err(e) => {
                self.lifecycle.abort_install(previous);
                metrics::INSTALL_FAILURES.inc();
                tracing::error!(error = %e, "Worker install failed");
                Err(e)
            }
        }
    }

    async fn prepare(&self) -> ProxyResult<Arc<WorkerContext>> {
        self.cache
            .open()
            .await
            .map_err(|e| ProxyError::ConfigLoadFailed(format!("opening datastore: {e}")))?;

        let retrieval = self
            .slot
            .load()
            .await
            .map_err(|e| ProxyError::ConfigLoadFailed(e.to_string()))?
            .unwrap_or_default();
        retrieval.validate().map_err(ProxyError::ConfigLoadFailed)?;

        let client = self.builder.build(&retrieval, self.cache.clone()).await?;
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, client = client.name(), "Retrieval client built");

        Ok(Arc::new(WorkerContext {
            generation,
            retrieval,
            client,
            cache: self.cache.clone(),
        }))
    }

    /// Promote the staged generation and start intercepting traffic.
    /// Requests already in flight finish on the generation they started with.
    #[instrument(skip(self))]
    pub async fn activate(&self) -> ProxyResult<u64> {
        let staged = self.staged.lock().take();
        let Some(context) = staged else {
            return Err(ProxyError::Lifecycle(format!(
                "cannot activate from {}",
                self.lifecycle.state()
            )));
        };
        if let Err(e) = self.lifecycle.activate() {
            *self.staged.lock() = Some(context);
            return Err(e);
        }

        let generation = context.generation;
        *self.active.write().await = Some(context);
        metrics::WORKER_GENERATION.set(generation as i64);
        tracing::info!(generation, "Worker activated");
        Ok(generation)
    }

    /// The generation currently serving traffic.
    pub async fn active_context(&self) -> Option<Arc<WorkerContext>> {
        self.active.read().await.clone()
    }

    pub async fn status(&self) -> ControllerStatus {
        let active = self.active_context().await;
        let staged_generation = self.staged.lock().as_ref().map(|c| c.generation);
        ControllerStatus {
            state: self.lifecycle.state(),
            generation: active.as_ref().map(|c| c.generation),
            staged_generation,
            retrieval: active.map(|c| c.retrieval.clone()),
        }
    }

    /// Answer one intercepted request. Always produces exactly one response.
    #[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
    pub async fn handle(&self, request: Request<Bytes>) -> Response<Body> {
        let Some(context) = self.active_context().await else {
            metrics::record_passthrough("inactive");
            return self.network_fetch(request).await;
        };

        if let Some(target) = self.cross_origin_target(&request) {
            metrics::record_passthrough("cross_origin");
            return self.forward(target, request).await;
        }

        if request.method() != Method::GET {
            metrics::record_passthrough("method");
            return self.network_fetch(request).await;
        }

        let path = match ContentPath::parse(request.uri().path(), request.uri().query()) {
            Ok(path) => path,
            Err(_) => {
                metrics::record_passthrough("not_content");
                return self.network_fetch(request).await;
            }
        };

        let id = path.cache_id();
        match context.cache.get(&id).await {
            Ok(bytes) => {
                metrics::CACHE_HITS.inc();
                metrics::BYTES_SERVED_FROM_CACHE.inc_by(bytes.len() as u64);
                tracing::debug!(%path, cid = %id, "Cache hit");
                let meta = match context.cache.meta(&id).await {
                    Ok(meta) => meta.unwrap_or_default(),
                    Err(e) => {
                        tracing::warn!(%path, error = %e, "Cached headers unreadable, serving without them");
                        EntryMeta::default()
                    }
                };
                return cached_response(bytes, &meta);
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                tracing::warn!(%path, error = %e, "Cache read failed, retrieving instead");
            }
        }
        metrics::CACHE_MISSES.inc();

        let options = FetchOptions {
            headers: request.headers().clone(),
            provider: path.provider().map(str::to_owned),
        };
        let retrieval = match context.client.fetch(&path, options).await {
            Ok(retrieval) => retrieval,
            Err(e) => {
                tracing::info!(%path, error = %e, "Retrieval rejected, falling back to network");
                metrics::record_fallback("rejected");
                return self.network_fetch(request).await;
            }
        };

        // Nothing has been sent yet, so a failure here can still fall back.
        let first = match retrieval.body.next().await {
            Some(Ok(chunk)) => Some(chunk),
            None => None,
            Some(Err(e)) => {
                tracing::info!(%path, error = %e, "Retrieval failed before first chunk, falling back to network");
                metrics::record_fallback("failed_before_body");
                return self.network_fetch(request).await;
            }
        };

        tracing::debug!(%path, cid = %id, "Streaming retrieval");
        stream_retrieval(context.cache.clone(), id, retrieval, first)
    }

    /// Destination of a request aimed at another origin, if it is one.
    ///
    /// Absolute-form targets win over the `Host` header. A request with
    /// neither is treated as same-origin, as is any name of the proxy's own
    /// listener.
    fn cross_origin_target(&self, request: &Request<Bytes>) -> Option<Url> {
        let uri = request.uri();
        let target = if uri.scheme().is_some() && uri.authority().is_some() {
            Url::parse(&uri.to_string()).ok()?
        } else {
            let host = request.headers().get(HOST)?.to_str().ok()?;
            let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
            Url::parse(&format!("{}://{host}{path_and_query}", self.origin.scheme())).ok()?
        };
        (!self.local.contains(&target.origin())).then_some(target)
    }

    /// Issue the original request over the plain network: to its own origin
    /// when cross-origin, otherwise to the upstream.
    async fn network_fetch(&self, request: Request<Bytes>) -> Response<Body> {
        if let Some(target) = self.cross_origin_target(&request) {
            return self.forward(target, request).await;
        }

        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|p| p.as_str())
            .unwrap_or("/");
        let target = match &self.upstream {
            Some(upstream) => upstream.join(path_and_query),
            None => return ProxyError::NoUpstream(path_and_query.to_string()).into_response(),
        };
        match target {
            Ok(target) => self.forward(target, request).await,
            Err(e) => ProxyError::InvalidRequest(e.to_string()).into_response(),
        }
    }

    async fn forward(&self, url: Url, request: Request<Bytes>) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let mut headers = parts.headers;
        if headers.get_all(HOP_HEADER).iter().any(|v| *v == self.hop_id) {
            tracing::warn!(%url, "Request came back to this proxy, refusing to forward again");
            return ProxyError::LoopDetected(url.to_string()).into_response();
        }
        headers.append(HOP_HEADER, self.hop_id.clone());

        let forward = ForwardRequest {
            method: parts.method,
            url,
            headers,
            body,
        };
        match self.network.fetch(forward).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Network request failed");
                e.into_response()
            }
        }
    }
}

/// Replay a stored entry with the headers it was first served with.
fn cached_response(bytes: Bytes, meta: &EntryMeta) -> Response<Body> {
    let length = bytes.len();
    let mut response = Response::new(Body::from(bytes));
    let headers = response.headers_mut();
    for (name, value) in &meta.headers {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    response
}

fn entry_meta(headers: &HeaderMap) -> EntryMeta {
    EntryMeta {
        headers: headers
            .iter()
            .filter(|(name, _)| **name != CONTENT_LENGTH)
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect(),
    }
}

/// Build the streamed response for a retrieval whose first chunk (if any) has
/// already been pulled, and spawn the task that feeds it.
fn stream_retrieval(
    cache: ContentCache,
    id: ContentId,
    retrieval: RetrievalResponse,
    first: Option<Bytes>,
) -> Response<Body> {
    let RetrievalResponse {
        status,
        headers,
        provenance,
        body: source,
    } = retrieval;

    // Only bodies that can be trusted to match `id` are stored under it.
    let sink = provenance.is_cacheable().then(|| CacheSink {
        cache,
        id,
        meta: entry_meta(&headers),
    });
    if sink.is_none() {
        tracing::debug!(cid = %id, "Unverified provider, streaming without caching");
    }

    let out = TransferQueue::new();
    let mut payload = BytesMut::new();
    if let Some(first) = first {
        payload.extend_from_slice(&first);
        out.push(first);
    }
    tokio::spawn(tee(source, out.clone(), payload, sink));

    let mut response = Response::new(Body::from_stream(out.into_stream()));
    *response.status_mut() = if status.is_success() {
        status
    } else {
        StatusCode::OK
    };
    *response.headers_mut() = headers;
    response
}

/// Where a completed retrieval is stored.
struct CacheSink {
    cache: ContentCache,
    id: ContentId,
    meta: EntryMeta,
}

impl CacheSink {
    /// Metadata goes first so a hit never finds the payload without it.
    async fn store(self, payload: Bytes) {
        if !self.meta.is_empty()
            && let Err(e) = self.cache.put_meta(&self.id, &self.meta).await
        {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::warn!(cid = %self.id, error = %e, "Failed to cache response headers");
            return;
        }
        if let Err(e) = self.cache.put(&self.id, payload).await {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::warn!(cid = %self.id, error = %e, "Failed to cache retrieved content");
        }
    }
}

/// Forward chunks to the response in order, then store the complete payload
/// (when there is a sink) before ending the response. Keeps going if the
/// requester disconnects so the cache is still populated.
async fn tee(
    source: TransferQueue<Bytes, TransferError>,
    out: TransferQueue<Bytes, TransferError>,
    mut payload: BytesMut,
    sink: Option<CacheSink>,
) {
    loop {
        match source.next().await {
            Some(Ok(chunk)) => {
                payload.extend_from_slice(&chunk);
                out.push(chunk);
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "Retrieval failed mid-stream");
                out.fail(e);
                return;
            }
            None => break,
        }
    }

    let payload = payload.freeze();
    metrics::BYTES_RETRIEVED.inc_by(payload.len() as u64);
    if let Some(sink) = sink {
        sink.store(payload).await;
    }
    metrics::RETRIEVALS_COMPLETED.inc();
    out.stop();
}

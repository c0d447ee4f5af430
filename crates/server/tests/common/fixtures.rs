//! Request and payload fixtures.

use axum::body::Body;
use axum::http::header::HOST;
use axum::http::{Request, Response};
use bytes::Bytes;
use std::net::TcpListener;

/// Root identifier used by most tests.
pub const ROOT: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

/// Origin the test controller intercepts for.
pub const ORIGIN_HOST: &str = "pantry.test";

/// Upstream receiving same-origin fallbacks.
pub const UPSTREAM: &str = "http://upstream.test";

/// A same-origin GET for `path`.
#[allow(dead_code)]
pub fn same_origin_get(path: &str) -> Request<Bytes> {
    Request::builder()
        .uri(path)
        .header(HOST, ORIGIN_HOST)
        .body(Bytes::new())
        .unwrap()
}

/// Read a whole response body.
#[allow(dead_code)]
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

#[allow(dead_code)]
pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

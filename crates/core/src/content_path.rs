//! Retrieval parameters derived from an intercepted request path.

use crate::content_id::ContentId;
use std::fmt;

/// Query parameter naming a preferred provider for one request.
pub const PEER_QUERY_PARAM: &str = "peer";

/// Optional gateway-style prefix accepted in front of the root identifier.
const IPFS_PREFIX: &str = "ipfs";

/// A request for content under a root identifier.
///
/// Accepts `/<cid>[/sub/path]` and `/ipfs/<cid>[/sub/path]`.
#[derive(Clone, PartialEq, Eq)]
pub struct ContentPath {
    root: ContentId,
    segments: Vec<String>,
    provider: Option<String>,
}

impl ContentPath {
    /// Parse a request path and optional raw query string.
    pub fn parse(path: &str, query: Option<&str>) -> crate::Result<Self> {
        let mut parts = path.split('/').filter(|s| !s.is_empty()).peekable();

        if parts.peek() == Some(&IPFS_PREFIX) {
            parts.next();
        }

        let root = parts
            .next()
            .ok_or_else(|| crate::Error::InvalidPath(format!("no root identifier: {path}")))?;
        let root = ContentId::parse(root)
            .map_err(|e| crate::Error::InvalidPath(format!("{path}: {e}")))?;

        let mut segments = Vec::new();
        for segment in parts {
            if segment == "." || segment == ".." {
                return Err(crate::Error::InvalidPath(format!(
                    "relative segment not allowed: {path}"
                )));
            }
            segments.push(segment.to_string());
        }

        let provider = query.and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(key, _)| key == PEER_QUERY_PARAM)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
        });

        Ok(Self {
            root,
            segments,
            provider,
        })
    }

    /// The root identifier.
    pub fn root(&self) -> &ContentId {
        &self.root
    }

    /// Preferred provider from the `peer` query parameter.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Whether the request addresses the root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// The path handed to the retrieval client: `/<root>[/sub/path]`.
    pub fn request_path(&self) -> String {
        let mut path = format!("/{}", self.root);
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// Canonical gateway form: `/ipfs/<root>[/sub/path]`.
    pub fn gateway_path(&self) -> String {
        format!("/{IPFS_PREFIX}{}", self.request_path())
    }

    /// Identifier the response is cached under.
    ///
    /// Bare roots use the root identifier. Sub-paths resolve to exactly one
    /// payload under an immutable root, so they are keyed by the raw-codec
    /// identifier of their canonical gateway path.
    pub fn cache_id(&self) -> ContentId {
        if self.is_root() {
            self.root
        } else {
            ContentId::for_raw_bytes(self.gateway_path().as_bytes())
        }
    }
}

impl fmt::Debug for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentPath")
            .field("path", &self.request_path())
            .field("provider", &self.provider)
            .finish()
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.request_path())
    }
}

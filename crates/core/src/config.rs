//! Configuration types shared across crates.

use crate::content_id::ContentId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::{Host, Origin, Url};

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8480").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// The proxy's own origin. Requests addressed to any other origin pass
    /// through untouched. Defaults to `http://<bind>`.
    #[serde(default)]
    pub origin: Option<String>,
    /// Extra `host[:port]` authorities that reach this proxy, for example a
    /// LAN address when bound to `0.0.0.0`. Requests naming any of them are
    /// treated as same-origin.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Origin that same-origin network fallbacks are sent to.
    /// Without one, a failed retrieval answers 502.
    #[serde(default)]
    pub upstream: Option<String>,
    /// Timeout for outbound network and provider requests, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8480".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            origin: None,
            aliases: Vec::new(),
            upstream: None,
            request_timeout_secs: default_request_timeout_secs(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

impl ServerConfig {
    /// The origin this proxy intercepts for.
    pub fn origin_url(&self) -> crate::Result<Url> {
        let raw = self
            .origin
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind));
        parse_origin(&raw, "origin")
    }

    /// The upstream origin for same-origin fallbacks, if configured.
    pub fn upstream_url(&self) -> crate::Result<Option<Url>> {
        self.upstream
            .as_deref()
            .map(|raw| parse_origin(raw, "upstream"))
            .transpose()
    }

    /// Every origin that addresses this proxy.
    ///
    /// Includes the configured origin, the bind address and each alias. A
    /// loopback or unspecified host also brings in the loopback names
    /// (`localhost`, `127.0.0.1`, `[::1]`) on the same port.
    pub fn local_origins(&self) -> crate::Result<Vec<Origin>> {
        let origin = self.origin_url()?;
        let scheme = origin.scheme();
        let mut urls = vec![
            origin.clone(),
            parse_origin(&format!("{scheme}://{}", self.bind), "bind")?,
        ];
        for alias in &self.aliases {
            urls.push(parse_origin(&format!("{scheme}://{alias}"), "alias")?);
        }

        let mut origins = Vec::new();
        for url in &urls {
            push_unique(&mut origins, url.origin());
            if url.host().is_some_and(|host| is_local_host(&host)) {
                for name in LOOPBACK_NAMES {
                    let mut alias = url.clone();
                    if alias.set_host(Some(name)).is_ok() {
                        push_unique(&mut origins, alias.origin());
                    }
                }
            }
        }
        Ok(origins)
    }

    /// Get the outbound request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Validate server configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let local = self.local_origins().map_err(|e| e.to_string())?;
        if let Some(upstream) = self.upstream_url().map_err(|e| e.to_string())?
            && local.contains(&upstream.origin())
        {
            return Err("upstream must be a different origin than the proxy itself".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Host names every loopback listener answers to.
const LOOPBACK_NAMES: [&str; 3] = ["localhost", "127.0.0.1", "[::1]"];

fn is_local_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(ip) => ip.is_loopback() || ip.is_unspecified(),
        Host::Ipv6(ip) => ip.is_loopback() || ip.is_unspecified(),
    }
}

fn push_unique(origins: &mut Vec<Origin>, origin: Origin) {
    if !origins.contains(&origin) {
        origins.push(origin);
    }
}

fn parse_origin(raw: &str, field: &str) -> crate::Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| crate::Error::InvalidConfig(format!("{field} {raw:?}: {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(crate::Error::InvalidConfig(format!(
                "{field} must be http or https, got {other}"
            )));
        }
    }
    if url.host_str().is_none() {
        return Err(crate::Error::InvalidConfig(format!("{field} has no host: {raw}")));
    }
    Ok(url)
}

/// Cache storage backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
        /// Namespace directory under the root.
        #[serde(default = "default_namespace")]
        namespace: String,
    },
    /// Process-local storage, lost on exit.
    Memory,
}

fn default_namespace() -> String {
    "pantry".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/cache"),
            namespace: default_namespace(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { namespace, .. } => {
                if namespace.is_empty()
                    || !namespace
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
                {
                    return Err(format!(
                        "storage namespace must be a non-empty [A-Za-z0-9_-] name, got {namespace:?}"
                    ));
                }
                Ok(())
            }
            StorageConfig::Memory => Ok(()),
        }
    }
}

/// Worker lifecycle configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How many times installation is attempted before giving up.
    #[serde(default = "default_install_attempts")]
    pub install_attempts: u32,
    /// Delay between installation attempts, in milliseconds.
    #[serde(default = "default_install_retry_delay_ms")]
    pub install_retry_delay_ms: u64,
}

fn default_install_attempts() -> u32 {
    3
}

fn default_install_retry_delay_ms() -> u64 {
    1000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            install_attempts: default_install_attempts(),
            install_retry_delay_ms: default_install_retry_delay_ms(),
        }
    }
}

impl WorkerConfig {
    /// Get the retry delay as a Duration.
    pub fn install_retry_delay(&self) -> Duration {
        Duration::from_millis(self.install_retry_delay_ms)
    }

    /// Validate worker configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.install_attempts == 0 {
            return Err("install_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Retrieval parameters persisted in the reserved config slot.
///
/// Read once when the worker installs and immutable afterwards. Every field is
/// optional; the empty record is the default when nothing was persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default provider address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
    /// Target content identifier the terms below were negotiated for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<ContentId>,
    /// Expected size of the target content in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Price per byte, in the provider's smallest currency unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_byte: Option<u64>,
    /// Bytes transferred between payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_interval: Option<u64>,
    /// Growth of the payment interval after each payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_interval_increase: Option<u64>,
}

impl RetrievalConfig {
    /// Whether nothing has been configured.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Decode from the persisted JSON form.
    pub fn from_json(bytes: &[u8]) -> crate::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Encode to the persisted JSON form.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::Error::Serialization(e.to_string()))
    }

    /// Quoted price for the expected size, when both terms are known.
    pub fn quoted_total(&self) -> Option<u128> {
        match (self.price_per_byte, self.size) {
            (Some(price), Some(size)) => Some(u128::from(price) * u128::from(size)),
            _ => None,
        }
    }

    /// Validate retrieval configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(peer) = &self.peer
            && peer.trim().is_empty()
        {
            return Err("retrieval peer must not be blank".to_string());
        }
        if self.payment_interval == Some(0) {
            return Err("payment_interval must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Cache storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Worker lifecycle configuration.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Retrieval parameters to persist into the config slot before install (optional).
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,
}

impl AppConfig {
    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Uses in-memory storage and no upstream.
    pub fn for_testing() -> Self {
        Self {
            server: ServerConfig {
                origin: Some("http://pantry.test".to_string()),
                ..Default::default()
            },
            storage: StorageConfig::Memory,
            worker: WorkerConfig {
                install_attempts: 1,
                install_retry_delay_ms: 0,
            },
            retrieval: None,
        }
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate()?;
        self.storage.validate()?;
        self.worker.validate()?;
        if let Some(retrieval) = &self.retrieval {
            retrieval.validate()?;
        }
        Ok(())
    }
}

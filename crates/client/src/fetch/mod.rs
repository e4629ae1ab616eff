//! Network layer for the offline worker.
//!
//! ### Network trait
//! The worker only talks to the network through [`Network`], so tests and
//! alternative transports can stand in for the real HTTP client.
//!
//! ### Response classification
//! - `basic`: final URL shares the scope origin
//! - `cors`: cross-origin with an `access-control-allow-origin` header
//! - `opaque`: any other cross-origin response
//!
//! HTTP error statuses come back as responses; only transport failures are
//! errors.

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use self::url::{UrlError, canonicalize, parse_scope, resolve, same_origin};

use vrcache_core::{AppConfig, Error, Request, Response, ResponseType};

/// Anything able to turn a request into a response.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Origin used to classify responses as same-origin.
    pub scope: ::url::Url,

    /// User agent string (default: "vrcache/0.1")
    pub user_agent: String,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl FetchConfig {
    /// Derive client settings from the application config.
    pub fn from_app(config: &AppConfig) -> Result<Self, Error> {
        let scope = parse_scope(&config.scope_url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            scope,
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
        })
    }
}

/// Decide how a response relates to the scope origin.
pub fn classify(scope: &::url::Url, final_url: &::url::Url, headers: &header::HeaderMap) -> ResponseType {
    if same_origin(scope, final_url) {
        ResponseType::Basic
    } else if headers.contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN) {
        ResponseType::Cors
    } else {
        ResponseType::Opaque
    }
}

/// HTTP client backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let start = Instant::now();
        let url = canonicalize(&request.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| Error::InvalidInput(format!("invalid method: {}", request.method)))?;

        let response = self
            .http
            .request(method, url.as_str())
            .send()
            .await
            .map_err(|e| Error::Network(format!("{url}: {e}")))?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response.headers().clone();
        let response_type = classify(&self.config.scope, &final_url, &headers);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        let mut out = Response::new(status.as_u16(), final_url.as_str(), bytes)
            .with_status_text(status.canonical_reason().unwrap_or_default())
            .with_type(response_type);
        out.headers = headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        tracing::debug!(
            request = %request,
            status = status.as_u16(),
            response_type = response_type.as_str(),
            fetch_ms = start.elapsed().as_millis() as u64,
            bytes = out.body_len(),
            "fetched from network"
        );

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ::url::Url {
        ::url::Url::parse("http://localhost:8080/video-reverser/").unwrap()
    }

    #[test]
    fn test_fetch_config_from_app() {
        let config = FetchConfig::from_app(&AppConfig::default()).unwrap();
        assert_eq!(config.user_agent, "vrcache/0.1");
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
        assert_eq!(config.scope.as_str(), "http://localhost:8080/video-reverser/");
    }

    #[test]
    fn test_fetch_config_bad_scope() {
        let app = AppConfig { scope_url: "ftp://x/".into(), ..Default::default() };
        assert!(matches!(FetchConfig::from_app(&app), Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_classify_same_origin() {
        let final_url = ::url::Url::parse("http://localhost:8080/other/path.js").unwrap();
        assert_eq!(classify(&scope(), &final_url, &header::HeaderMap::new()), ResponseType::Basic);
    }

    #[test]
    fn test_classify_cross_origin() {
        let final_url = ::url::Url::parse("https://cdn.example.com/lib.js").unwrap();
        assert_eq!(classify(&scope(), &final_url, &header::HeaderMap::new()), ResponseType::Opaque);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, header::HeaderValue::from_static("*"));
        assert_eq!(classify(&scope(), &final_url, &headers), ResponseType::Cors);
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let config = FetchConfig::from_app(&AppConfig::default()).unwrap();
        let client = FetchClient::new(config);
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_fetch_rejects_invalid_url() {
        let client = FetchClient::new(FetchConfig::from_app(&AppConfig::default()).unwrap()).unwrap();
        let result = client.fetch(&Request::get("not a url")).await;
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }
}

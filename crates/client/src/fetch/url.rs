//! URL resolution and origin checks for intercepted requests.

use url::Url;

/// Error type for URL handling failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Parse the worker scope. Must be an absolute http(s) URL.
pub fn parse_scope(scope: &str) -> Result<Url, UrlError> {
    canonicalize(scope)
}

/// Resolve a request target against the worker scope.
///
/// Relative paths (`./index.html`, `icons/a.png`, `/root.css`) resolve like a
/// browser would; absolute URLs are kept. The result is canonicalized.
pub fn resolve(scope: &Url, target: &str) -> Result<Url, UrlError> {
    let trimmed = target.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let joined = scope.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    canonicalize(joined.as_str())
}

/// Canonicalize an absolute URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Reject non-http(s) schemes
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| UrlError::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Scheme, host and port all match.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

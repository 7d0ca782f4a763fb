//! Backend base URL.

use url::{Host, Url};

use crate::error::ConfigError;

/// The backend every relative request path is resolved against.
///
/// Only HTTPS is accepted, except for loopback hosts during development.
/// Absolute request URLs are allowed too; [`is_backend`](Self::is_backend)
/// tells whether one still points at this backend, which decides whether
/// the session token may be sent with it.
///
/// # Example
///
/// ```
/// use kidquest::BaseUrl;
///
/// let base = BaseUrl::new("https://api.kidquest.app/v1/").unwrap();
/// assert_eq!(base.endpoint("/missions"), "https://api.kidquest.app/v1/missions");
/// assert!(base.is_backend("https://api.kidquest.app/v1/rewards"));
/// assert!(!base.is_backend("https://cdn.example.com/a.png"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BaseUrl(Url);

impl BaseUrl {
    /// # Errors
    ///
    /// Returns [`ConfigError::BaseUrl`] for anything that is not an absolute
    /// `https://` URL (or `http://` on a loopback host).
    pub fn new(raw: impl AsRef<str>) -> Result<Self, ConfigError> {
        let raw = raw.as_ref();
        let rejected = |reason: &str| ConfigError::BaseUrl {
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(raw).map_err(|e| rejected(&e.to_string()))?;
        if url.cannot_be_a_base() || url.host().is_none() {
            return Err(rejected("must be an absolute URL with a host"));
        }

        match url.scheme() {
            "https" => Ok(Self(url)),
            "http" if is_loopback(&url) => Ok(Self(url)),
            _ => Err(rejected("must use HTTPS (HTTP allowed only for localhost)")),
        }
    }

    /// Absolute URL for a request path. Absolute `http(s)://` paths are
    /// used as given.
    pub fn endpoint(&self, path: &str) -> String {
        if is_absolute(path) {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.0.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Whether `path` resolves to this backend: any relative path, or an
    /// absolute URL with the same scheme, host and port.
    pub fn is_backend(&self, path: &str) -> bool {
        if !is_absolute(path) {
            return true;
        }
        Url::parse(path).is_ok_and(|url| url.origin() == self.0.origin())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }

    /// Explicit port, or the scheme default.
    pub fn port_or_default(&self) -> Option<u16> {
        self.0.port_or_known_default()
    }
}

fn is_absolute(path: &str) -> bool {
    path.starts_with("http://") || path.starts_with("https://")
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_https_and_loopback_http() {
        let base = BaseUrl::new("https://api.kidquest.app").unwrap();
        assert_eq!(base.port_or_default(), Some(443));

        for raw in ["http://localhost:3000", "http://127.0.0.1:8080", "http://[::1]:9000"] {
            assert!(BaseUrl::new(raw).is_ok(), "{} rejected", raw);
        }
    }

    #[test]
    fn rejects_insecure_or_relative() {
        for raw in ["http://api.kidquest.app", "ftp://api.kidquest.app", "/missions", "mailto:a@b.c"] {
            assert!(
                matches!(BaseUrl::new(raw), Err(ConfigError::BaseUrl { .. })),
                "{} accepted",
                raw
            );
        }
    }

    #[test]
    fn endpoint_joins_under_the_base_path() {
        let base = BaseUrl::new("https://api.kidquest.app/api/v2/").unwrap();
        assert_eq!(base.endpoint("/missions"), "https://api.kidquest.app/api/v2/missions");
        assert_eq!(base.endpoint("auth/refresh"), "https://api.kidquest.app/api/v2/auth/refresh");
        assert_eq!(
            base.endpoint("https://cdn.kidquest.app/a.png"),
            "https://cdn.kidquest.app/a.png"
        );
    }

    #[test]
    fn backend_means_same_origin() {
        let base = BaseUrl::new("http://localhost:3000/api").unwrap();

        assert!(base.is_backend("/missions"));
        assert!(base.is_backend("//evil.example/x"));
        assert!(base.is_backend("http://localhost:3000/other"));

        assert!(!base.is_backend("http://localhost:3001/api/missions"));
        assert!(!base.is_backend("https://localhost:3000/api/missions"));
        assert!(!base.is_backend("http://127.0.0.1:3000/api/missions"));
        assert!(!base.is_backend("http://cdn.example.com/img.png"));
        assert!(!base.is_backend("http://[not a url"));
    }
}

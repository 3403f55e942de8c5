//! Short-link resolution

use super::EvidenceError;
use crate::config::UrlResolutionConfig;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, COOKIE, USER_AGENT};
use reqwest::redirect::Policy;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a request ended up after redirects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub final_url: String,
    pub status: u16,
}

/// Issues a redirect-following HEAD request
pub trait HttpFetcher: Send + Sync {
    fn head(&self, url: &str, cookie_header: Option<&str>) -> Result<FetchResponse, EvidenceError>;
}

pub struct ReqwestFetcher {
    client: Client,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration, max_redirects: usize) -> Result<Self, EvidenceError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("ticketscope"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,*/*;q=0.8"),
        );

        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(max_redirects))
            .default_headers(headers)
            .build()
            .map_err(|e| EvidenceError::Http {
                url: String::new(),
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }

    pub fn from_config(config: &UrlResolutionConfig) -> Result<Self, EvidenceError> {
        Self::new(
            Duration::from_secs(config.timeout_secs),
            config.max_redirects,
        )
    }
}

impl HttpFetcher for ReqwestFetcher {
    fn head(&self, url: &str, cookie_header: Option<&str>) -> Result<FetchResponse, EvidenceError> {
        let mut request = self.client.head(url);
        if let Some(cookies) = cookie_header {
            request = request.header(COOKIE, cookies);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                EvidenceError::Timeout {
                    url: url.to_string(),
                }
            } else {
                EvidenceError::Http {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        Ok(FetchResponse {
            final_url: response.url().to_string(),
            status: response.status().as_u16(),
        })
    }
}

/// Render a cookie map as a `Cookie` header value
pub fn cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Expands short log-search links into full search URLs
pub struct UrlResolver {
    fetcher: Box<dyn HttpFetcher>,
    destination_path: String,
    login_markers: Vec<String>,
}

impl UrlResolver {
    pub fn new(
        fetcher: Box<dyn HttpFetcher>,
        destination_path: impl Into<String>,
        login_markers: Vec<String>,
    ) -> Self {
        Self {
            fetcher,
            destination_path: destination_path.into(),
            login_markers: login_markers
                .into_iter()
                .map(|m| m.to_lowercase())
                .collect(),
        }
    }

    pub fn from_config(config: &UrlResolutionConfig) -> Result<Self, EvidenceError> {
        let fetcher = ReqwestFetcher::from_config(config)?;
        Ok(Self::new(
            Box::new(fetcher),
            config.destination_path.clone(),
            config.login_markers.clone(),
        ))
    }

    /// Follow `short_url` to its destination.
    ///
    /// The first attempt is anonymous. Cookies are sent only when that attempt lands on
    /// a login page. `Ok(None)` means authentication failed or the link does not lead to
    /// a search page.
    pub fn resolve_short_url(
        &self,
        short_url: &str,
        cookies: &BTreeMap<String, String>,
    ) -> Result<Option<String>, EvidenceError> {
        let mut response = self.fetcher.head(short_url, None)?;
        debug!("{} -> {} ({})", short_url, response.final_url, response.status);

        if self.is_login_page(&response.final_url) {
            let Some(header) = cookie_header(cookies) else {
                warn!("{} requires authentication and no cookies are configured", short_url);
                return Ok(None);
            };

            info!("Anonymous resolution hit a login page, retrying with cookies");
            response = self.fetcher.head(short_url, Some(&header))?;

            if self.is_login_page(&response.final_url) {
                warn!(
                    "Authentication required for {}: configured cookies may be expired",
                    short_url
                );
                return Ok(None);
            }
        }

        if !self.is_destination(&response.final_url) {
            warn!(
                "{} resolved to {}, which is not a search page",
                short_url, response.final_url
            );
            return Ok(None);
        }

        Ok(Some(response.final_url))
    }

    fn is_login_page(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.login_markers.iter().any(|marker| lower.contains(marker))
    }

    fn is_destination(&self, url: &str) -> bool {
        match url::Url::parse(url) {
            Ok(parsed) => parsed.path().contains(&self.destination_path),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    const SHORT: &str = "https://logs.haystack.es/goto/fcfcf7992bf3d65a6708060150547f37";
    const DISCOVER: &str = "https://logs.haystack.es/app/discover#/?_g=(time:(from:now-15m,to:now))";
    const LOGIN: &str = "https://accounts.google.com/o/oauth2/auth?continue=x";

    type Calls = Arc<Mutex<Vec<Option<String>>>>;

    /// Answers anonymous and authenticated requests with fixed URLs
    struct ScriptedFetcher {
        anonymous: String,
        authenticated: String,
        calls: Calls,
    }

    impl HttpFetcher for ScriptedFetcher {
        fn head(
            &self,
            _url: &str,
            cookie_header: Option<&str>,
        ) -> Result<FetchResponse, EvidenceError> {
            self.calls
                .lock()
                .unwrap()
                .push(cookie_header.map(str::to_string));
            let final_url = if cookie_header.is_some() {
                &self.authenticated
            } else {
                &self.anonymous
            };
            Ok(FetchResponse {
                final_url: final_url.clone(),
                status: 200,
            })
        }
    }

    fn resolver(anonymous: &str, authenticated: &str) -> (UrlResolver, Calls) {
        let calls = Calls::default();
        let fetcher = ScriptedFetcher {
            anonymous: anonymous.to_string(),
            authenticated: authenticated.to_string(),
            calls: Arc::clone(&calls),
        };
        let config = UrlResolutionConfig::default();
        let resolver = UrlResolver::new(
            Box::new(fetcher),
            config.destination_path,
            config.login_markers,
        );
        (resolver, calls)
    }

    fn cookies() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("HAYSAuthSessionID-0".to_string(), "abc".to_string()),
            ("userEmail".to_string(), "ops@example.com".to_string()),
        ])
    }

    #[test]
    fn test_public_link_resolves_without_cookies() {
        let (resolver, calls) = resolver(DISCOVER, LOGIN);
        let resolved = resolver.resolve_short_url(SHORT, &cookies()).unwrap();
        assert_eq!(resolved.as_deref(), Some(DISCOVER));
        assert_eq!(*calls.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_login_retries_with_cookies() {
        let (resolver, calls) = resolver(LOGIN, DISCOVER);
        let resolved = resolver.resolve_short_url(SHORT, &cookies()).unwrap();
        assert_eq!(resolved.as_deref(), Some(DISCOVER));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                None,
                Some("HAYSAuthSessionID-0=abc; userEmail=ops@example.com".to_string())
            ]
        );
    }

    #[test]
    fn test_login_after_both_attempts() {
        let (resolver, calls) = resolver(LOGIN, LOGIN);
        assert_eq!(resolver.resolve_short_url(SHORT, &cookies()).unwrap(), None);
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_login_without_cookies_configured() {
        let (resolver, calls) = resolver(LOGIN, DISCOVER);
        assert_eq!(resolver.resolve_short_url(SHORT, &BTreeMap::new()).unwrap(), None);
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_non_search_destination() {
        let (resolver, _) = resolver("https://logs.haystack.es/app/home", LOGIN);
        assert_eq!(resolver.resolve_short_url(SHORT, &cookies()).unwrap(), None);
    }

    #[test]
    fn test_cookie_header() {
        assert_eq!(cookie_header(&BTreeMap::new()), None);
        assert_eq!(
            cookie_header(&cookies()).unwrap(),
            "HAYSAuthSessionID-0=abc; userEmail=ops@example.com"
        );
    }
}

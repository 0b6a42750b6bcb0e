use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context as _;
use reqwest::Method;
use serde::Serialize;
use url::Url;

const DEFAULT_USER_AGENT: &str = concat!("formlinks/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
}

/// Outcome of checking one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    pub is_live: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Method of the final attempt; `None` when no request was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<ProbeMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    fn unreachable(error: impl Into<String>) -> Self {
        Self {
            is_live: false,
            status: None,
            method: None,
            error: Some(error.into()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Liveness check for a link target.
pub trait LinkProbe {
    fn probe(&mut self, url: &str) -> ProbeResult;
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout: Duration,
    /// Base for relative hrefs; relative hrefs are malformed without one.
    pub base_url: Option<Url>,
    pub user_agent: String,
}

impl ProbeConfig {
    pub fn from_env(timeout: Duration, base_url: Option<Url>) -> Self {
        let user_agent = std::env::var("FORMLINKS_USER_AGENT")
            .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_owned());
        Self {
            timeout,
            base_url,
            user_agent,
        }
    }
}

/// HTTP prober with a per-run cache keyed by the exact URL string.
///
/// Each uncached URL costs at most two requests: `HEAD`, then `GET` if the
/// `HEAD` did not come back live. The `GET` response body is never read.
pub struct HttpProber {
    client: reqwest::blocking::Client,
    base_url: Option<Url>,
    cache: HashMap<String, ProbeResult>,
    requests_sent: usize,
}

impl HttpProber {
    pub fn new(config: ProbeConfig) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(config.user_agent)
            .build()
            .context("build link probe http client")?;

        Ok(Self {
            client,
            base_url: config.base_url,
            cache: HashMap::new(),
            requests_sent: 0,
        })
    }

    /// Number of HTTP requests issued so far.
    pub fn requests_sent(&self) -> usize {
        self.requests_sent
    }

    pub fn cached_urls(&self) -> usize {
        self.cache.len()
    }

    fn probe_uncached(&mut self, url: &str) -> ProbeResult {
        let url = url.trim();
        if url.is_empty() {
            return ProbeResult::unreachable("empty URL");
        }

        let target = match resolve_target(url, self.base_url.as_ref()) {
            Ok(target) => target,
            Err(err) => return ProbeResult::unreachable(err),
        };

        let head = self.attempt(Method::HEAD, &target);
        if head.is_live {
            return head;
        }
        tracing::debug!(
            url = %target,
            status = ?head.status,
            error = ?head.error,
            "HEAD not live; retrying with GET"
        );
        self.attempt(Method::GET, &target)
    }

    fn attempt(&mut self, method: Method, target: &Url) -> ProbeResult {
        let probe_method = if method == Method::HEAD {
            ProbeMethod::Head
        } else {
            ProbeMethod::Get
        };
        self.requests_sent += 1;

        match self.client.request(method, target.clone()).send() {
            Ok(response) => {
                let status = response.status();
                tracing::debug!(url = %target, method = ?probe_method, %status, "probe");
                ProbeResult {
                    is_live: status.is_success() || status.is_redirection(),
                    status: Some(status.as_u16()),
                    method: Some(probe_method),
                    error: None,
                }
            }
            Err(err) => {
                tracing::debug!(url = %target, method = ?probe_method, %err, "probe failed");
                ProbeResult {
                    is_live: false,
                    status: err.status().map(|status| status.as_u16()),
                    method: Some(probe_method),
                    error: Some(err.to_string()),
                }
            }
        }
    }
}

impl LinkProbe for HttpProber {
    fn probe(&mut self, url: &str) -> ProbeResult {
        if let Some(cached) = self.cache.get(url) {
            return cached.clone();
        }
        let result = self.probe_uncached(url);
        self.cache.insert(url.to_owned(), result.clone());
        result
    }
}

/// Turns an `href` attribute value into an absolute http(s) URL.
pub fn resolve_target(href: &str, base_url: Option<&Url>) -> Result<Url, String> {
    let decoded = href.trim().replace("&amp;", "&");
    let url = match Url::parse(&decoded) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = base_url.ok_or_else(|| format!("relative URL without base: {decoded}"))?;
            base.join(&decoded)
                .map_err(|err| format!("malformed URL {decoded}: {err}"))?
        }
        Err(err) => return Err(format!("malformed URL {decoded}: {err}")),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("unsupported URL scheme: {}", url.scheme()));
    }
    Ok(url)
}

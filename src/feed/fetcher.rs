//! HTTP fetcher for feeds and web pages.
//!
//! Every request is checked against SSRF rules, follows a bounded number of
//! redirects, is subject to connect/read/total timeouts and has its body
//! size capped. Failures are reported as [`FetchError`]; this layer never
//! retries.

use std::net::IpAddr;
use std::time::Duration;

use reqwest::redirect::Policy;
use reqwest::{header, Client, Response};
use tracing::debug;

use crate::config::FetchConfig;
use crate::error::{FeedsyncError, FetchError, Result};

/// A successfully retrieved response body.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL the body was served from, after redirects.
    pub url: String,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// Raw body bytes.
    pub bytes: Vec<u8>,
    /// Whether the body was cut short by a prefix read.
    pub truncated: bool,
}

/// HTTP fetcher with security measures. Cheap to clone.
#[derive(Debug, Clone)]
pub struct FeedFetcher {
    client: Client,
    max_body_bytes: u64,
    allow_private_hosts: bool,
}

impl FeedFetcher {
    /// Create a fetcher from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Self::from_builder(Client::builder(), config)
    }

    fn from_builder(builder: reqwest::ClientBuilder, config: &FetchConfig) -> Result<Self> {
        let client = builder
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(redirect_policy(
                config.max_redirects,
                config.allow_private_hosts,
            ))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FeedsyncError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_feed_size_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    /// Fetch the full body at `url`.
    ///
    /// Fails with [`FetchError::TooLarge`] if the body exceeds the configured
    /// maximum feed size.
    pub async fn fetch(&self, url: &str) -> std::result::Result<FetchedBody, FetchError> {
        let response = self.send(url).await?;

        if let Some(length) = response.content_length() {
            if length > self.max_body_bytes {
                return Err(FetchError::TooLarge {
                    size: length,
                    max: self.max_body_bytes,
                });
            }
        }

        read_body(response, self.max_body_bytes, false).await
    }

    /// Fetch at most `limit` bytes from `url`.
    ///
    /// Larger bodies are truncated rather than rejected. Used to scan HTML
    /// pages where only the `<head>` matters.
    pub async fn fetch_prefix(
        &self,
        url: &str,
        limit: u64,
    ) -> std::result::Result<FetchedBody, FetchError> {
        let response = self.send(url).await?;
        read_body(response, limit, true).await
    }

    async fn send(&self, url: &str) -> std::result::Result<Response, FetchError> {
        let parsed = validate_url(url, self.allow_private_hosts)?;

        debug!(url = %parsed, "fetching");
        let response = self
            .client
            .get(parsed)
            .header(
                header::ACCEPT,
                "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/html;q=0.8, */*;q=0.5",
            )
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        Ok(response)
    }
}

/// Read a response body up to `limit` bytes.
///
/// With `truncate` set, reading stops at the limit; otherwise exceeding it
/// is an error.
async fn read_body(
    mut response: Response,
    limit: u64,
    truncate: bool,
) -> std::result::Result<FetchedBody, FetchError> {
    let url = response.url().to_string();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let mut bytes: Vec<u8> = Vec::new();
    let mut truncated = false;

    while let Some(chunk) = response.chunk().await.map_err(classify_error)? {
        let remaining = limit.saturating_sub(bytes.len() as u64) as usize;
        if chunk.len() > remaining {
            if !truncate {
                return Err(FetchError::TooLarge {
                    size: (bytes.len() + chunk.len()) as u64,
                    max: limit,
                });
            }
            bytes.extend_from_slice(&chunk[..remaining]);
            truncated = true;
            break;
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(FetchedBody {
        url,
        content_type,
        bytes,
        truncated,
    })
}

/// Redirect policy that bounds the chain and re-validates every hop.
///
/// A redirect to a forbidden host fails the request the same way a direct
/// request to it would.
fn redirect_policy(max_redirects: usize, allow_private_hosts: bool) -> Policy {
    Policy::custom(move |attempt| {
        // The first entry of `previous` is the original URL.
        if attempt.previous().len() > max_redirects {
            return attempt.error(FetchError::TooManyRedirects);
        }
        let checked = validate_url(attempt.url().as_str(), allow_private_hosts);
        match checked {
            Ok(_) => attempt.follow(),
            Err(e) => {
                debug!(url = %attempt.url(), error = %e, "refusing redirect");
                attempt.error(e)
            }
        }
    })
}

/// Map a transport error onto the fetch error taxonomy.
fn classify_error(e: reqwest::Error) -> FetchError {
    // Errors raised by the redirect policy travel as the error source.
    let mut source = std::error::Error::source(&e);
    while let Some(inner) = source {
        if let Some(fetch_error) = inner.downcast_ref::<FetchError>() {
            return fetch_error.clone();
        }
        source = inner.source();
    }

    if e.is_timeout() {
        FetchError::Timeout
    } else if e.is_redirect() {
        FetchError::TooManyRedirects
    } else if e.is_builder() {
        FetchError::InvalidUrl(e.to_string())
    } else {
        FetchError::Unreachable(e.to_string())
    }
}

/// Validate a URL before fetching it.
///
/// Checks that the URL parses, uses http or https, and (unless
/// `allow_private_hosts` is set) that the host is neither a private or
/// loopback address nor a local-only hostname.
pub fn validate_url(
    url: &str,
    allow_private_hosts: bool,
) -> std::result::Result<url::Url, FetchError> {
    let parsed = url::Url::parse(url).map_err(|e| FetchError::InvalidUrl(format!("{url}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(FetchError::UnsupportedScheme(scheme.to_string())),
    }

    let host = parsed
        .host()
        .ok_or_else(|| FetchError::InvalidUrl(format!("{url}: missing host")))?;

    if allow_private_hosts {
        return Ok(parsed);
    }

    let forbidden = match host {
        url::Host::Domain(domain) => is_forbidden_hostname(domain),
        url::Host::Ipv4(ip) => is_private_ip(&IpAddr::V4(ip)),
        url::Host::Ipv6(ip) => is_private_ip(&IpAddr::V6(ip)),
    };
    if forbidden {
        return Err(FetchError::ForbiddenHost(host.to_string()));
    }

    Ok(parsed)
}

/// Hostnames that only make sense on a local network.
fn is_forbidden_hostname(host: &str) -> bool {
    const LOCAL_SUFFIXES: [&str; 7] = [
        ".local",
        ".localhost",
        ".internal",
        ".intranet",
        ".corp",
        ".home",
        ".lan",
    ];

    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == "localhost" || LOCAL_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
}

/// Loopback, private, link-local and otherwise non-routable addresses.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, c, _] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // carrier-grade NAT, 100.64.0.0/10
                || (a == 100 && (64..128).contains(&b))
                // documentation ranges
                || (a == 192 && b == 0 && c == 2)
                || (a == 198 && b == 51 && c == 100)
                || (a == 203 && b == 0 && c == 113)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // unique local, fc00::/7
                || (first & 0xfe00) == 0xfc00
                // link-local, fe80::/10
                || (first & 0xffc0) == 0xfe80
        }
    }
}

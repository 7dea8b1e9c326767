//! Error types for feedsync.
//!
//! `FeedsyncError` is the crate-wide error. The network, parsing and
//! discovery layers each have a typed error of their own so callers can
//! branch on the failure without string matching.

use thiserror::Error;

/// Common error type for feedsync.
#[derive(Error, Debug)]
pub enum FeedsyncError {
    /// Database error.
    ///
    /// Database errors from sqlx are automatically converted.
    #[error("database error: {0}")]
    Database(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// A caller tried to touch data owned by another user.
    ///
    /// This is a programming error in the caller, never a user-facing one.
    #[error("authorization violation: {0}")]
    Unauthorized(String),

    /// Feed fetch error.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Feed parse error.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Feed discovery error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A background task panicked or was aborted.
    #[error("background task error: {0}")]
    Task(String),
}

impl From<sqlx::Error> for FeedsyncError {
    fn from(e: sqlx::Error) -> Self {
        FeedsyncError::Database(e.to_string())
    }
}

impl From<tokio::task::JoinError> for FeedsyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        FeedsyncError::Task(e.to_string())
    }
}

/// Result type alias for feedsync operations.
pub type Result<T> = std::result::Result<T, FeedsyncError>;

/// Failure while retrieving a feed or page over HTTP.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The URL could not be parsed.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Only http and https are accepted.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The host resolves to a private, loopback or local-only address.
    #[error("forbidden host: {0}")]
    ForbiddenHost(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The host could not be reached (DNS, connect or transport failure).
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The redirect chain exceeded the configured bound.
    #[error("too many redirects")]
    TooManyRedirects,

    /// The response body exceeded the configured size limit.
    #[error("response too large: {size} bytes (max {max} bytes)")]
    TooLarge { size: u64, max: u64 },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Timeouts, connection failures and 5xx responses qualify. 4xx
    /// responses never do.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Unreachable(_) => true,
            FetchError::HttpStatus(code) => (500..600).contains(code),
            _ => false,
        }
    }
}

/// Failure while turning a payload into a feed document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The payload is not well-formed XML, or is structurally broken.
    #[error("malformed feed: {0}")]
    Malformed(String),

    /// The payload is well-formed but is neither RSS nor Atom.
    #[error("unsupported feed format: {0}")]
    UnsupportedFormat(String),
}

/// Failure while discovering feeds for a site.
///
/// Only the root page failing to load is an error. Finding no feed is an
/// empty result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("could not load {url}: {source}")]
    RootPage {
        url: String,
        #[source]
        source: FetchError,
    },
}

/// The phase of a sync in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Fetch,
    Parse,
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Fetch => write!(f, "fetch"),
            SyncPhase::Parse => write!(f, "parse"),
        }
    }
}

/// A sync that failed before the read-state store was touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("fetch phase failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse phase failed: {0}")]
    Parse(#[from] ParseError),
}

impl SyncError {
    /// The phase that failed, kept for diagnostics.
    pub fn phase(&self) -> SyncPhase {
        match self {
            SyncError::Fetch(_) => SyncPhase::Fetch,
            SyncError::Parse(_) => SyncPhase::Parse,
        }
    }

    /// Short message suitable for showing to the reader.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::Fetch(FetchError::Timeout) => "The feed took too long to respond.",
            SyncError::Fetch(FetchError::HttpStatus(404)) => "The feed could not be found.",
            SyncError::Fetch(FetchError::HttpStatus(_)) => "The feed's server returned an error.",
            SyncError::Fetch(_) => "The feed could not be reached.",
            SyncError::Parse(_) => "The feed could not be read.",
        }
    }
}

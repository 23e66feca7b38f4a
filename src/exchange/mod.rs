//! # Owlivion Mail - Exchange Module
//!
//! Exchange Autodiscover: locating the Exchange Web Services endpoint
//! (`ASUrl`) for an email address.

pub mod autodiscover;
pub mod buffer;
pub mod config;
pub mod session;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use autodiscover::{
    autodiscover_async, build_request_body, candidate_urls, extract_as_url, fetch_autodiscover,
    resolve_host, AttemptOutcome, AttemptRecord, AutodiscoverReport, CandidateKind, CandidateUrl,
};
pub use buffer::{BufferLease, ResponseBuffer};
pub use config::{ConnectionSettings, Credentials, DiscoveryRequest, TransportConfig};
pub use session::ExchangeSession;
pub use transport::{
    redirect_verdict, HttpRequest, HttpTransport, RedirectRule, RedirectVerdict, RequestOptions,
    ScopedOptions, Transport, TransportError,
};

/// Result type alias for Exchange operations
pub type ExchangeResult<T> = Result<T, ExchangeError>;

/// Unified error type for Exchange operations
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Autodiscover service unavailable")]
    AutodiscoverUnavailable,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

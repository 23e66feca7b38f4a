//! # Owlivion Exchange
//!
//! Exchange Autodiscover client for Owlivion Mail: finds the Exchange Web
//! Services endpoint for an account from its email address.
//!
//! ```no_run
//! use owlivion_exchange::{Credentials, DiscoveryRequest, ExchangeSession, TransportConfig};
//!
//! let mut session = ExchangeSession::new(TransportConfig::from_env());
//! let request = DiscoveryRequest::new("alice@example.com")
//!     .with_credentials(Credentials::new("alice", "secret").with_domain("CORP"));
//! let ews_url = session.autodiscover(&request)?;
//! # Ok::<(), owlivion_exchange::ExchangeError>(())
//! ```

pub mod exchange;

pub use exchange::{
    autodiscover_async, fetch_autodiscover, AttemptOutcome, AutodiscoverReport, ConnectionSettings,
    Credentials, DiscoveryRequest, ExchangeError, ExchangeResult, ExchangeSession, HttpTransport,
    Transport, TransportConfig, TransportError,
};

/// Load `.env` and install the `env_logger` backend (default level `info`)
///
/// Safe to call more than once; later calls leave the existing logger alone.
pub fn init_logging() {
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

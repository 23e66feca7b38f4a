//! Exchange Connection Configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const ENV_TIMEOUT_SECS: &str = "OWLIVION_EXCH_TIMEOUT_SECS";
const ENV_CONNECT_TIMEOUT_SECS: &str = "OWLIVION_EXCH_CONNECT_TIMEOUT_SECS";
const ENV_USER_AGENT: &str = "OWLIVION_EXCH_USER_AGENT";

/// Identity used to authenticate against the Exchange server.
///
/// The password is wiped from memory when the value is dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Windows domain, sent as `DOMAIN\username`
    pub domain: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// No username means requests go out unauthenticated
    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty()
    }

    /// Login name as presented to the server
    pub fn identity(&self) -> String {
        match self.domain.as_deref() {
            Some(domain) if !domain.is_empty() => format!("{}\\{}", domain, self.username),
            _ => self.username.clone(),
        }
    }
}

// SECURITY: never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

/// Input of a single autodiscover call
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    pub email_address: String,
    /// Overrides the host derived from the email address
    pub host: Option<String>,
    pub credentials: Credentials,
}

impl DiscoveryRequest {
    pub fn new(email_address: impl Into<String>) -> Self {
        Self {
            email_address: email_address.into(),
            host: None,
            credentials: Credentials::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }
}

/// Connection settings discovered for an Exchange account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSettings {
    /// Exchange Web Services endpoint
    pub as_url: Option<String>,
}

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Whole-request timeout (in seconds)
    pub timeout_secs: u64,

    /// TCP/TLS connect timeout (in seconds)
    pub connect_timeout_secs: u64,

    pub user_agent: String,

    #[serde(default)]
    pub accept_invalid_certs: bool,

    /// Honour HTTP(S)_PROXY / NO_PROXY from the environment
    #[serde(default = "default_true")]
    pub use_system_proxy: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            user_agent: format!("owlivion-exchange/{}", env!("CARGO_PKG_VERSION")),
            accept_invalid_certs: false, // Secure by default
            use_system_proxy: true,
        }
    }
}

impl TransportConfig {
    /// Read overrides from the process environment (`.env` is loaded by the caller)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(secs) = parse_secs(&lookup, ENV_TIMEOUT_SECS) {
            config.timeout_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_CONNECT_TIMEOUT_SECS) {
            config.connect_timeout_secs = secs;
        }
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            config.user_agent = agent;
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn parse_secs<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            log::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

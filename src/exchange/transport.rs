//! HTTP transport for Exchange requests
//!
//! Request policy (content type, redirect handling) travels with every
//! request as a [`RequestOptions`] value instead of being set on a shared
//! handle. The session keeps a resting policy that [`ScopedOptions`]
//! swaps out for the duration of one operation.

use super::buffer::ResponseBuffer;
use super::config::{Credentials, TransportConfig};
use mime::Mime;
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Deref;
use url::Url;

/// Redirect hop limit for autodiscover requests
pub const MAX_REDIRECTS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Redirect refused: {0}")]
    RedirectRefused(String),

    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Invalid credentials: {0}")]
    Credentials(String),
}

/// How 3xx responses are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RedirectRule {
    /// Hand the 3xx response back to the caller
    #[default]
    None,
    /// Follow automatically, HTTPS targets only
    HttpsOnly { max_hops: usize },
}

/// Per-request policy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub content_type: Option<Mime>,
    pub redirects: RedirectRule,
}

impl RequestOptions {
    /// Policy for autodiscover POSTs.
    ///
    /// Credentials are attached as an `Authorization` header, which reqwest
    /// strips whenever a redirect leaves the original host, so they never
    /// follow the request to a different server.
    pub fn autodiscover() -> Self {
        Self {
            content_type: Some(mime::TEXT_XML),
            redirects: RedirectRule::HttpsOnly {
                max_hops: MAX_REDIRECTS,
            },
        }
    }
}

/// Installs a policy into a slot and puts the previous one back on drop
#[derive(Debug)]
pub struct ScopedOptions<'a> {
    slot: &'a mut RequestOptions,
    previous: RequestOptions,
}

impl<'a> ScopedOptions<'a> {
    pub fn apply(slot: &'a mut RequestOptions, options: RequestOptions) -> Self {
        let previous = std::mem::replace(slot, options);
        Self { slot, previous }
    }
}

impl Deref for ScopedOptions<'_> {
    type Target = RequestOptions;

    fn deref(&self) -> &RequestOptions {
        &*self.slot
    }
}

impl Drop for ScopedOptions<'_> {
    fn drop(&mut self) {
        *self.slot = std::mem::take(&mut self.previous);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectVerdict {
    Follow,
    /// Return the 3xx response as is
    Stop,
    RefuseScheme,
    TooManyHops,
}

/// Decide whether redirect number `hop` (1-based) to `next` may be followed
pub fn redirect_verdict(next: &Url, hop: usize, rule: RedirectRule) -> RedirectVerdict {
    match rule {
        RedirectRule::None => RedirectVerdict::Stop,
        RedirectRule::HttpsOnly { max_hops } => {
            if next.scheme() != "https" {
                RedirectVerdict::RefuseScheme
            } else if hop > max_hops {
                RedirectVerdict::TooManyHops
            } else {
                RedirectVerdict::Follow
            }
        }
    }
}

/// One outgoing POST
#[derive(Debug)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub body: &'a [u8],
    pub options: &'a RequestOptions,
    pub credentials: Option<&'a Credentials>,
}

/// Blocking HTTP transport used by an Exchange session
pub trait Transport {
    /// Get ready to authenticate as `credentials`
    fn prepare(&mut self, credentials: &Credentials) -> Result<(), TransportError>;

    /// Send the request, append the response body to `response` and return the status code
    fn perform(
        &mut self,
        request: &HttpRequest<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<u16, TransportError>;
}

/// [`Transport`] backed by `reqwest::blocking`
///
/// reqwest fixes the redirect policy when a client is built, so one client is
/// kept per [`RedirectRule`].
pub struct HttpTransport {
    config: TransportConfig,
    clients: HashMap<RedirectRule, Client>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            clients: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    fn client_for(&mut self, rule: RedirectRule) -> Result<&Client, TransportError> {
        match self.clients.entry(rule) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => Ok(entry.insert(build_client(&self.config, rule)?)),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl Transport for HttpTransport {
    fn prepare(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
        if credentials.is_anonymous() && !credentials.password.is_empty() {
            return Err(TransportError::Credentials(
                "password given without a username".to_string(),
            ));
        }

        // Fresh connection pools for a new identity, built on first use
        self.clients.clear();

        if credentials.is_anonymous() {
            log::debug!("HTTP transport prepared without credentials");
        } else {
            log::debug!("HTTP transport prepared for {}", credentials.identity());
        }
        Ok(())
    }

    fn perform(
        &mut self,
        request: &HttpRequest<'_>,
        response: &mut ResponseBuffer,
    ) -> Result<u16, TransportError> {
        let client = self.client_for(request.options.redirects)?;

        let mut builder = client.post(request.url).body(request.body.to_vec());
        if let Some(content_type) = &request.options.content_type {
            builder = builder.header(CONTENT_TYPE, content_type.as_ref());
        }
        if let Some(creds) = request.credentials.filter(|c| !c.is_anonymous()) {
            builder = builder.basic_auth(creds.identity(), Some(&creds.password));
        }

        let mut reply = builder.send().map_err(classify_error)?;
        let status = reply.status().as_u16();
        log::debug!("POST {} -> {}", request.url, status);

        reply.copy_to(response).map_err(TransportError::Request)?;
        Ok(status)
    }
}

fn build_client(config: &TransportConfig, rule: RedirectRule) -> Result<Client, TransportError> {
    let policy = match rule {
        RedirectRule::None => Policy::none(),
        RedirectRule::HttpsOnly { max_hops } => Policy::custom(move |attempt| {
            let hop = attempt.previous().len();
            match redirect_verdict(attempt.url(), hop, rule) {
                RedirectVerdict::Follow => attempt.follow(),
                RedirectVerdict::Stop => attempt.stop(),
                RedirectVerdict::RefuseScheme => {
                    let message = format!("non-HTTPS redirect target {}", attempt.url());
                    log::warn!("Refusing {}", message);
                    attempt.error(message)
                }
                RedirectVerdict::TooManyHops => {
                    let message = format!("more than {} redirects", max_hops);
                    attempt.error(message)
                }
            }
        }),
    };

    let mut builder = Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .user_agent(config.user_agent.as_str())
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .redirect(policy);
    if !config.use_system_proxy {
        builder = builder.no_proxy();
    }

    builder.build().map_err(TransportError::Client)
}

fn classify_error(e: reqwest::Error) -> TransportError {
    if e.is_redirect() {
        TransportError::RedirectRefused(e.to_string())
    } else if e.is_connect() || e.is_timeout() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Request(e)
    }
}

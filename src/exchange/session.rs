//! Exchange session: transport, identity, response buffer and discovered settings

use super::buffer::ResponseBuffer;
use super::config::{ConnectionSettings, Credentials, TransportConfig};
use super::transport::{HttpTransport, RequestOptions, Transport};
use super::ExchangeResult;

/// Exchange session
///
/// Operations take `&mut self`: a session serves one request at a time.
pub struct ExchangeSession<T: Transport = HttpTransport> {
    pub(crate) transport: T,
    /// Resting request policy; operations override it through `ScopedOptions`
    pub(crate) options: RequestOptions,
    pub(crate) response: ResponseBuffer,
    pub(crate) settings: ConnectionSettings,
    pub(crate) credentials: Option<Credentials>,
}

impl ExchangeSession<HttpTransport> {
    /// Create a session backed by the reqwest transport
    pub fn new(config: TransportConfig) -> Self {
        Self::with_transport(HttpTransport::new(config))
    }
}

impl Default for ExchangeSession<HttpTransport> {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

impl<T: Transport> ExchangeSession<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            options: RequestOptions::default(),
            response: ResponseBuffer::new(),
            settings: ConnectionSettings::default(),
            credentials: None,
        }
    }

    /// Configure the transport for `credentials`; later requests authenticate as them
    pub fn prepare_transport(&mut self, credentials: &Credentials) -> ExchangeResult<()> {
        self.transport.prepare(credentials)?;
        self.credentials = if credentials.is_anonymous() {
            None
        } else {
            Some(credentials.clone())
        };
        Ok(())
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn response_buffer(&self) -> &ResponseBuffer {
        &self.response
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_settings(self) -> ConnectionSettings {
        self.settings
    }
}

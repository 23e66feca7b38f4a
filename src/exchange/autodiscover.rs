//! Exchange Autodiscover (Outlook POX protocol)
//!
//! Finds the Exchange Web Services endpoint for an email address by POSTing
//! an autodiscover request to two well-known URLs derived from the address'
//! domain, in order:
//!
//! 1. `https://{host}/autodiscover/autodiscover.xml`
//! 2. `https://autodiscover.{host}/autodiscover/autodiscover.xml`
//!
//! The first HTTP 200 response carrying an `<ASUrl>` element wins.

use super::buffer::ResponseBuffer;
use super::config::{ConnectionSettings, Credentials, DiscoveryRequest};
use super::session::ExchangeSession;
use super::transport::{HttpRequest, RequestOptions, ScopedOptions, Transport};
use super::{ExchangeError, ExchangeResult};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::Serialize;
use std::time::Instant;

const REQUEST_SCHEMA: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/requestschema/2006";
const RESPONSE_SCHEMA: &str =
    "http://schemas.microsoft.com/exchange/autodiscover/outlook/responseschema/2006a";
const AUTODISCOVER_PATH: &str = "/autodiscover/autodiscover.xml";

/// Initial response buffer reservation
pub const MIN_RESPONSE_BUFFER_LEN: usize = 3000;

const AS_URL_OPEN: &[u8] = b"<ASUrl>";
const AS_URL_CLOSE: &[u8] = b"</ASUrl>";

// ============================================================================
// Request preparation
// ============================================================================

/// Host to query: the explicit override, or everything after the first `@`
///
/// The derived host is used verbatim and not validated as a domain name.
pub fn resolve_host(request: &DiscoveryRequest) -> ExchangeResult<&str> {
    if let Some(host) = request.host.as_deref() {
        return Ok(host);
    }

    let (_, domain) = request.email_address.split_once('@').ok_or_else(|| {
        ExchangeError::InvalidParameter("email address has no '@'".to_string())
    })?;
    if domain.is_empty() {
        return Err(ExchangeError::InvalidParameter(
            "email address has no domain after '@'".to_string(),
        ));
    }
    Ok(domain)
}

/// Serialize the autodiscover request for `email_address`
pub fn build_request_body(email_address: &str) -> ExchangeResult<Vec<u8>> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);

    let events = [
        Event::Start(BytesStart::new("Autodiscover").with_attributes([("xmlns", REQUEST_SCHEMA)])),
        Event::Start(BytesStart::new("Request")),
        Event::Start(BytesStart::new("EMailAddress")),
        Event::Text(BytesText::new(email_address)),
        Event::End(BytesEnd::new("EMailAddress")),
        Event::Start(BytesStart::new("AcceptableResponseSchema")),
        Event::Text(BytesText::new(RESPONSE_SCHEMA)),
        Event::End(BytesEnd::new("AcceptableResponseSchema")),
        Event::End(BytesEnd::new("Request")),
        Event::End(BytesEnd::new("Autodiscover")),
    ];
    for event in events {
        writer
            .write_event(event)
            .map_err(|e| ExchangeError::Internal(format!("cannot build request: {}", e)))?;
    }

    Ok(writer.into_inner())
}

// ============================================================================
// Candidates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateUrl {
    pub kind: CandidateKind,
    pub url: String,
}

/// Autodiscover URLs for `host`, in the order they must be tried
pub fn candidate_urls(host: &str) -> [CandidateUrl; 2] {
    [
        CandidateUrl {
            kind: CandidateKind::Primary,
            url: format!("https://{}{}", host, AUTODISCOVER_PATH),
        },
        CandidateUrl {
            kind: CandidateKind::Fallback,
            url: format!("https://autodiscover.{}{}", host, AUTODISCOVER_PATH),
        },
    ]
}

// ============================================================================
// Attempts
// ============================================================================

/// Result of POSTing to one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptOutcome {
    Success(String),
    /// HTTP 200 without an `ASUrl`
    ServiceUnavailable,
    /// Transport failure or non-200 status
    ConnectError(String),
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "SUCCESS",
            AttemptOutcome::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            AttemptOutcome::ConnectError(_) => "CONNECT_ERROR",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub kind: CandidateKind,
    pub url: String,
    pub status: Option<u16>,
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

/// Text between the first `<ASUrl>` and the next `</ASUrl>`, byte for byte.
///
/// This is a literal scan, not an XML parse: entities are not decoded,
/// whitespace is kept, prefixed tags (`<a:ASUrl>`) are not recognised, and
/// an `<ASUrl>` inside a comment or a foreign element would match.
pub fn extract_as_url(body: &[u8]) -> Option<String> {
    let start = find(body, AS_URL_OPEN)? + AS_URL_OPEN.len();
    let len = find(&body[start..], AS_URL_CLOSE)?;
    Some(String::from_utf8_lossy(&body[start..start + len]).into_owned())
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn try_candidate<T: Transport>(
    transport: &mut T,
    candidate: &CandidateUrl,
    body: &[u8],
    options: &RequestOptions,
    credentials: Option<&Credentials>,
    buffer: &mut ResponseBuffer,
) -> AttemptRecord {
    let started = Instant::now();
    buffer.clear();

    let request = HttpRequest {
        url: &candidate.url,
        body,
        options,
        credentials,
    };

    let (status, outcome) = match transport.perform(&request, buffer) {
        Err(e) => (None, AttemptOutcome::ConnectError(e.to_string())),
        Ok(200) => {
            let outcome = match extract_as_url(buffer.as_bytes()) {
                Some(as_url) => AttemptOutcome::Success(as_url),
                None => AttemptOutcome::ServiceUnavailable,
            };
            (Some(200), outcome)
        }
        Ok(status) => (
            Some(status),
            AttemptOutcome::ConnectError(format!("HTTP status {}", status)),
        ),
    };

    log::debug!(
        "Autodiscover {:?} {} -> {}",
        candidate.kind,
        candidate.url,
        outcome.label()
    );

    AttemptRecord {
        kind: candidate.kind,
        url: candidate.url.clone(),
        status,
        outcome,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}

// ============================================================================
// Orchestration
// ============================================================================

/// Step-by-step trace of one autodiscover call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutodiscoverReport {
    pub host: String,
    pub attempts: Vec<AttemptRecord>,
    pub as_url: Option<String>,
    pub total_duration_ms: u64,
}

impl<T: Transport> ExchangeSession<T> {
    /// Discover the EWS endpoint for `request` and store it in the session settings
    pub fn autodiscover(&mut self, request: &DiscoveryRequest) -> ExchangeResult<String> {
        self.autodiscover_with_report(request)?
            .as_url
            .ok_or(ExchangeError::AutodiscoverUnavailable)
    }

    /// Like [`autodiscover`](Self::autodiscover), but returns every attempt.
    ///
    /// Exhausting both candidates is not an error here; `as_url` is `None`.
    pub fn autodiscover_with_report(
        &mut self,
        request: &DiscoveryRequest,
    ) -> ExchangeResult<AutodiscoverReport> {
        let started = Instant::now();
        let host = resolve_host(request)?.to_string();
        log::info!(
            "Autodiscover for {} via host {}",
            request.email_address,
            host
        );

        self.prepare_transport(&request.credentials)?;

        let Self {
            transport,
            options,
            response,
            settings,
            credentials,
        } = self;

        // Both guards undo their change on every exit path below
        let policy = ScopedOptions::apply(options, RequestOptions::autodiscover());
        let body = build_request_body(&request.email_address)?;
        let mut buffer = response.lease(MIN_RESPONSE_BUFFER_LEN)?;

        let mut attempts = Vec::with_capacity(2);
        let mut as_url = None;
        for candidate in candidate_urls(&host) {
            let record = try_candidate(
                transport,
                &candidate,
                &body,
                &policy,
                credentials.as_ref(),
                &mut buffer,
            );
            if let AttemptOutcome::Success(url) = &record.outcome {
                as_url = Some(url.clone());
            }
            attempts.push(record);
            if as_url.is_some() {
                break;
            }
        }

        match &as_url {
            Some(url) => {
                log::info!("Autodiscover found EWS endpoint {}", url);
                settings.as_url = Some(url.clone());
            }
            None => log::warn!("Autodiscover exhausted all candidates for {}", host),
        }

        Ok(AutodiscoverReport {
            host,
            attempts,
            as_url,
            total_duration_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// Run autodiscover on a blocking worker thread
///
/// The session is moved onto the worker and dropped there; its discovered
/// settings are returned.
pub async fn autodiscover_async<T>(
    session: ExchangeSession<T>,
    request: DiscoveryRequest,
) -> ExchangeResult<ConnectionSettings>
where
    T: Transport + Send + 'static,
{
    tokio::task::spawn_blocking(move || -> ExchangeResult<ConnectionSettings> {
        let mut session = session;
        session.autodiscover(&request)?;
        Ok(session.into_settings())
    })
    .await
    .map_err(|e| ExchangeError::Internal(format!("autodiscover task failed: {}", e)))?
}

/// Autodiscover with the default reqwest transport
pub async fn fetch_autodiscover(
    request: DiscoveryRequest,
    config: super::config::TransportConfig,
) -> ExchangeResult<ConnectionSettings> {
    autodiscover_async(ExchangeSession::new(config), request).await
}

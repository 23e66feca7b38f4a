//! Session-level tests for Exchange Autodiscover
//!
//! Covers:
//! - Candidate ordering and first-success short-circuit
//! - Outcome consolidation (unavailable, connect errors)
//! - Cleanup of the response buffer and request policy on every path
//! - Credential forwarding and transport preparation errors

#[cfg(test)]
mod session_tests {
    use super::super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const PRIMARY: &str = "https://example.com/autodiscover/autodiscover.xml";
    const FALLBACK: &str = "https://autodiscover.example.com/autodiscover/autodiscover.xml";

    enum Reply {
        Status(u16, &'static str),
        Refused,
        Unreachable,
    }

    #[derive(Debug, Clone)]
    struct RecordedCall {
        url: String,
        body: String,
        options: RequestOptions,
        identity: Option<String>,
        buffer_was_empty: bool,
    }

    /// In-memory transport answering from a script keyed by URL
    #[derive(Default)]
    struct ScriptedTransport {
        replies: HashMap<String, Reply>,
        calls: Vec<RecordedCall>,
        prepared: Vec<String>,
        reject_prepare: bool,
    }

    impl ScriptedTransport {
        fn reply(mut self, url: &str, reply: Reply) -> Self {
            self.replies.insert(url.to_string(), reply);
            self
        }

        fn urls(&self) -> Vec<&str> {
            self.calls.iter().map(|c| c.url.as_str()).collect()
        }
    }

    impl Transport for ScriptedTransport {
        fn prepare(&mut self, credentials: &Credentials) -> Result<(), TransportError> {
            if self.reject_prepare {
                return Err(TransportError::Credentials("rejected".to_string()));
            }
            self.prepared.push(credentials.identity());
            Ok(())
        }

        fn perform(
            &mut self,
            request: &HttpRequest<'_>,
            response: &mut ResponseBuffer,
        ) -> Result<u16, TransportError> {
            self.calls.push(RecordedCall {
                url: request.url.to_string(),
                body: String::from_utf8_lossy(request.body).into_owned(),
                options: request.options.clone(),
                identity: request.credentials.map(|c| c.identity()),
                buffer_was_empty: response.is_empty(),
            });

            match self.replies.get(request.url) {
                Some(Reply::Status(status, body)) => {
                    response.write_all(body.as_bytes()).unwrap();
                    Ok(*status)
                }
                Some(Reply::Refused) => Err(TransportError::RedirectRefused(
                    "non-HTTPS redirect target http://example.com/".to_string(),
                )),
                Some(Reply::Unreachable) | None => {
                    Err(TransportError::Connect("connection refused".to_string()))
                }
            }
        }
    }

    fn session(transport: ScriptedTransport) -> ExchangeSession<ScriptedTransport> {
        ExchangeSession::with_transport(transport)
    }

    fn assert_cleaned_up(session: &ExchangeSession<ScriptedTransport>) {
        assert_eq!(session.request_options(), &RequestOptions::default());
        assert!(!session.response_buffer().is_attached());
        assert_eq!(session.response_buffer().capacity(), 0);
    }

    // ========================================================================
    // Candidate sequencing
    // ========================================================================

    #[test]
    fn test_primary_success_skips_fallback() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://ews.example.com/EWS/Exchange.asmx</ASUrl>"))
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://wrong/</ASUrl>"));
        let mut session = session(transport);

        let url = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        assert_eq!(url, "https://ews.example.com/EWS/Exchange.asmx");
        assert_eq!(
            session.settings().as_url.as_deref(),
            Some("https://ews.example.com/EWS/Exchange.asmx")
        );
        assert_eq!(session.transport().urls(), vec![PRIMARY]);
        assert_cleaned_up(&session);
    }

    #[test]
    fn test_fallback_after_primary_http_error() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(404, "not here"))
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://y/EWS</ASUrl>"));
        let mut session = session(transport);

        let url = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        assert_eq!(url, "https://y/EWS");
        assert_eq!(session.transport().urls(), vec![PRIMARY, FALLBACK]);
    }

    #[test]
    fn test_fallback_after_primary_transport_error() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Unreachable)
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://y/EWS</ASUrl>"));
        let mut session = session(transport);

        let url = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();
        assert_eq!(url, "https://y/EWS");
    }

    #[test]
    fn test_fallback_after_primary_without_as_url() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<Autodiscover/>"))
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://y/EWS</ASUrl>"));
        let mut session = session(transport);

        let report = session
            .autodiscover_with_report(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        assert_eq!(report.attempts.len(), 2);
        assert_eq!(report.attempts[0].outcome, AttemptOutcome::ServiceUnavailable);
        assert_eq!(report.attempts[0].status, Some(200));
        assert_eq!(
            report.attempts[1].outcome,
            AttemptOutcome::Success("https://y/EWS".to_string())
        );
        assert_eq!(report.as_url.as_deref(), Some("https://y/EWS"));
    }

    #[test]
    fn test_refused_redirect_fails_attempt() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Refused)
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://y/EWS</ASUrl>"));
        let mut session = session(transport);

        let report = session
            .autodiscover_with_report(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        assert!(matches!(
            report.attempts[0].outcome,
            AttemptOutcome::ConnectError(_)
        ));
        assert_eq!(report.attempts[0].status, None);
        assert_eq!(report.as_url.as_deref(), Some("https://y/EWS"));
    }

    // ========================================================================
    // Exhaustion
    // ========================================================================

    #[test]
    fn test_both_unreachable_is_unavailable() {
        let mut session = session(ScriptedTransport::default());

        let err = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap_err();

        assert!(matches!(err, ExchangeError::AutodiscoverUnavailable));
        assert!(session.settings().as_url.is_none());
        assert_eq!(session.transport().urls(), vec![PRIMARY, FALLBACK]);
        assert_cleaned_up(&session);
    }

    #[test]
    fn test_both_without_as_url_is_unavailable() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>unterminated"))
            .reply(FALLBACK, Reply::Status(200, "<Response/>"));
        let mut session = session(transport);

        let err = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap_err();

        assert!(matches!(err, ExchangeError::AutodiscoverUnavailable));
        assert!(session.settings().as_url.is_none());
    }

    #[test]
    fn test_failed_call_keeps_previous_endpoint() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://x/EWS</ASUrl>"));
        let mut session = session(transport);
        session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        let err = session
            .autodiscover(&DiscoveryRequest::new("bob@unknown.test"))
            .unwrap_err();

        assert!(matches!(err, ExchangeError::AutodiscoverUnavailable));
        assert_eq!(session.settings().as_url.as_deref(), Some("https://x/EWS"));
    }

    // ========================================================================
    // Input validation and preparation
    // ========================================================================

    #[test]
    fn test_invalid_address_makes_no_requests() {
        for email in ["alice", "alice@"] {
            let mut session = session(ScriptedTransport::default());
            let err = session
                .autodiscover(&DiscoveryRequest::new(email))
                .unwrap_err();

            assert!(matches!(err, ExchangeError::InvalidParameter(_)));
            assert!(session.transport().prepared.is_empty());
            assert!(session.transport().calls.is_empty());
        }
    }

    #[test]
    fn test_explicit_host_overrides_address() {
        let transport = ScriptedTransport::default().reply(
            "https://mail.corp.test/autodiscover/autodiscover.xml",
            Reply::Status(200, "<ASUrl>https://mail.corp.test/EWS</ASUrl>"),
        );
        let mut session = session(transport);

        let url = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com").with_host("mail.corp.test"))
            .unwrap();

        assert_eq!(url, "https://mail.corp.test/EWS");
        assert!(session.transport().calls[0].body.contains("alice@example.com"));
    }

    #[test]
    fn test_prepare_error_is_propagated() {
        let transport = ScriptedTransport {
            reject_prepare: true,
            ..ScriptedTransport::default()
        };
        let mut session = session(transport);

        let err = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap_err();

        assert!(matches!(
            err,
            ExchangeError::Transport(TransportError::Credentials(_))
        ));
        assert!(session.transport().calls.is_empty());
        assert_cleaned_up(&session);
    }

    #[test]
    fn test_credentials_and_policy_reach_transport() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://x/EWS</ASUrl>"));
        let mut session = session(transport);
        let request = DiscoveryRequest::new("alice@example.com")
            .with_credentials(Credentials::new("alice", "s3cret").with_domain("CORP"));

        session.autodiscover(&request).unwrap();

        let transport = session.transport();
        assert_eq!(transport.prepared, vec!["CORP\\alice".to_string()]);
        let call = &transport.calls[0];
        assert_eq!(call.identity.as_deref(), Some("CORP\\alice"));
        assert_eq!(call.options, RequestOptions::autodiscover());
        assert!(call.body.contains("<EMailAddress>alice@example.com</EMailAddress>"));
    }

    #[test]
    fn test_anonymous_request_sends_no_identity() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://x/EWS</ASUrl>"));
        let mut session = session(transport);

        session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();

        assert_eq!(session.transport().calls[0].identity, None);
    }

    // ========================================================================
    // Buffer hygiene and idempotence
    // ========================================================================

    #[test]
    fn test_buffer_cleared_between_attempts() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://stale/"))
            .reply(FALLBACK, Reply::Status(200, "</ASUrl>"));
        let mut session = session(transport);

        let err = session
            .autodiscover(&DiscoveryRequest::new("alice@example.com"))
            .unwrap_err();

        // The halves of the tag pair must not be stitched together across attempts
        assert!(matches!(err, ExchangeError::AutodiscoverUnavailable));
        assert!(session.transport().calls.iter().all(|c| c.buffer_was_empty));
    }

    #[test]
    fn test_repeated_calls_are_identical() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(500, "oops"))
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>  https://x/ews  </ASUrl>"));
        let mut session = session(transport);
        let request = DiscoveryRequest::new("alice@example.com");

        let first = session.autodiscover_with_report(&request).unwrap();
        assert_cleaned_up(&session);
        let second = session.autodiscover_with_report(&request).unwrap();
        assert_cleaned_up(&session);

        assert_eq!(first.as_url.as_deref(), Some("  https://x/ews  "));
        assert_eq!(first.as_url, second.as_url);
        let outcomes = |r: &AutodiscoverReport| {
            r.attempts.iter().map(|a| a.outcome.clone()).collect::<Vec<_>>()
        };
        assert_eq!(outcomes(&first), outcomes(&second));
        assert_eq!(session.transport().calls.len(), 4);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let transport = ScriptedTransport::default()
            .reply(PRIMARY, Reply::Status(200, "<ASUrl>https://x/EWS</ASUrl>"));
        let mut session = session(transport);

        let report = session
            .autodiscover_with_report(&DiscoveryRequest::new("alice@example.com"))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["host"], "example.com");
        assert_eq!(json["asUrl"], "https://x/EWS");
        assert_eq!(json["attempts"][0]["kind"], "primary");
        assert_eq!(json["attempts"][0]["outcome"]["success"], "https://x/EWS");
        assert!(json.get("totalDurationMs").is_some());
    }

    // ========================================================================
    // Async wrapper
    // ========================================================================

    #[tokio::test]
    async fn test_autodiscover_async_returns_settings() {
        let transport = ScriptedTransport::default()
            .reply(FALLBACK, Reply::Status(200, "<ASUrl>https://y/EWS</ASUrl>"));

        let settings = autodiscover_async(
            ExchangeSession::with_transport(transport),
            DiscoveryRequest::new("alice@example.com"),
        )
        .await
        .unwrap();

        assert_eq!(settings.as_url.as_deref(), Some("https://y/EWS"));
    }

    #[tokio::test]
    async fn test_autodiscover_async_propagates_errors() {
        let err = autodiscover_async(
            ExchangeSession::with_transport(ScriptedTransport::default()),
            DiscoveryRequest::new("no-at-sign"),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ExchangeError::InvalidParameter(_)));
    }
}

//! Test autodiscover against real servers
//!
//! Usage: cargo run --example test_autodiscover -- [--json] user@example.com ...
//! Credentials come from OWLIVION_EXCH_USERNAME, OWLIVION_EXCH_PASSWORD and
//! OWLIVION_EXCH_DOMAIN (a `.env` file works too).

use owlivion_exchange::exchange::AttemptRecord;
use owlivion_exchange::{init_logging, AttemptOutcome, Credentials, DiscoveryRequest, ExchangeSession, TransportConfig};

fn main() {
    init_logging();

    let mut json = false;
    let mut emails = Vec::new();
    for arg in std::env::args().skip(1) {
        if arg == "--json" {
            json = true;
        } else {
            emails.push(arg);
        }
    }
    if emails.is_empty() {
        match std::env::var("OWLIVION_EXCH_EMAIL") {
            Ok(email) => emails.push(email),
            Err(_) => {
                eprintln!("usage: test_autodiscover [--json] <email>...");
                std::process::exit(2);
            }
        }
    }

    let credentials = credentials_from_env();
    let mut session = ExchangeSession::new(TransportConfig::from_env());

    for email in emails {
        println!("\n{}", "=".repeat(60));
        println!("Testing: {}", email);
        println!("{}", "=".repeat(60));

        let request = DiscoveryRequest::new(email).with_credentials(credentials.clone());
        match session.autodiscover_with_report(&request) {
            Ok(report) if json => match serde_json::to_string_pretty(&report) {
                Ok(text) => println!("{}", text),
                Err(e) => println!("✗ Cannot serialize report: {}", e),
            },
            Ok(report) => {
                println!("✓ Host: {}", report.host);
                println!("✓ Total Duration: {}ms", report.total_duration_ms);
                println!();

                for (index, attempt) in report.attempts.iter().enumerate() {
                    print_attempt(index + 1, attempt);
                }

                match report.as_url {
                    Some(url) => println!("\nEWS endpoint: {}", url),
                    None => println!("\n✗ Autodiscover unavailable"),
                }
            }
            Err(e) => {
                println!("✗ Error: {}", e);
            }
        }
    }
}

fn credentials_from_env() -> Credentials {
    let username = std::env::var("OWLIVION_EXCH_USERNAME").unwrap_or_default();
    let password = std::env::var("OWLIVION_EXCH_PASSWORD").unwrap_or_default();
    let credentials = Credentials::new(username, password);
    match std::env::var("OWLIVION_EXCH_DOMAIN") {
        Ok(domain) => credentials.with_domain(domain),
        Err(_) => credentials,
    }
}

fn print_attempt(step: usize, attempt: &AttemptRecord) {
    let status = attempt
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());

    match &attempt.outcome {
        AttemptOutcome::Success(_) => println!(
            "✅ {}. {} [{}] {}ms",
            step, attempt.url, status, attempt.duration_ms
        ),
        outcome => println!(
            "❌ {}. {} [{}] {} {:?}",
            step,
            attempt.url,
            status,
            outcome.label(),
            outcome
        ),
    }
}

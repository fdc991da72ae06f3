//! # mailkit
//!
//! Single-recipient notification dispatch over SMTP.
//!
//! This crate provides functionality for:
//! - Composing a plain-text envelope with a fixed header order
//! - Deriving a content-addressed [`DispatchMarker`] for each dispatch
//! - Submitting through a [`Relay`](relay::Relay) (SMTP via `lettre`, or a mock)
//! - Categorising failures as transient or fatal
//!
//! ## Example
//!
//! ```no_run
//! use mailkit::{DispatchOptions, Dispatcher, Message, TransportConfig};
//!
//! let dispatcher = Dispatcher::smtp(DispatchOptions::default());
//! let message = Message {
//!     from: "ops@example.com".into(),
//!     to: "oncall@example.com".into(),
//!     reply_to: None,
//!     subject: "Deploy finished".into(),
//!     preamble: String::new(),
//!     body: "All green.".into(),
//! };
//!
//! match dispatcher.dispatch(&message, &TransportConfig::new("smtp.example.com", 587)) {
//!     Ok(receipt) => println!("sent {}", receipt.marker),
//!     Err(e) if e.is_retryable() => eprintln!("try again later: {e}"),
//!     Err(e) => eprintln!("giving up: {e}"),
//! }
//! ```
//!
//! ## Retry Logic
//!
//! The dispatcher never retries and never deduplicates. Callers that want
//! at-most-once delivery keep their own record of markers and consult it
//! before calling [`Dispatcher::dispatch`].

#![warn(clippy::all)]

pub mod envelope;
pub mod error;
pub mod marker;
pub mod relay;
pub mod types;

pub use envelope::Envelope;
pub use error::{Error, ErrorCategory, Result};
pub use marker::DispatchMarker;
pub use types::{DispatchOptions, DispatchReceipt, Message, TlsMode, TransportConfig};

use lettre::Address;
use relay::{Relay, SmtpRelay};

/// Composes, validates and submits messages through a relay.
#[derive(Debug)]
pub struct Dispatcher {
    relay: Box<dyn Relay>,
}

impl Dispatcher {
    /// Create a dispatcher talking SMTP.
    pub fn smtp(options: DispatchOptions) -> Self {
        Self::with_relay(Box::new(SmtpRelay::new(options)))
    }

    /// Create a dispatcher with a custom relay (useful for testing).
    pub fn with_relay(relay: Box<dyn Relay>) -> Self {
        Self { relay }
    }

    /// The marker a dispatch of `message` via `transport` would produce.
    ///
    /// Pure; touches no network.
    pub fn marker_for(message: &Message, transport: &TransportConfig) -> DispatchMarker {
        DispatchMarker::compute(&Envelope::build(message), message.to.trim(), transport)
    }

    /// Send `message` to its one recipient.
    ///
    /// Input problems are reported as fatal errors before any connection is
    /// made.
    pub fn dispatch(&self, message: &Message, transport: &TransportConfig) -> Result<DispatchReceipt> {
        let (from, to) = validate(message, transport)?;

        let envelope = Envelope::build(message);
        let marker = DispatchMarker::compute(&envelope, message.to.trim(), transport);
        let wire = envelope.to_wire();

        log::info!("Dispatching {} to {} via {}", marker, message.to, transport.route());
        self.relay.submit(transport, &from, &to, &wire)?;
        log::debug!("Relay accepted {} ({} bytes)", marker, wire.len());

        Ok(DispatchReceipt {
            marker,
            recipient: message.to.clone(),
            bytes: wire.len(),
        })
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address> {
    value.trim().parse().map_err(|e: lettre::address::AddressError| Error::InvalidAddress {
        field,
        address: value.to_string(),
        message: e.to_string(),
    })
}

/// Whether `line`, sitting in the header block, would parse as a header field
/// or as the continuation of the one above it
fn reads_as_header(line: &str) -> bool {
    if line.starts_with([' ', '\t']) {
        return true;
    }
    line.split_once(':')
        .is_some_and(|(name, _)| !name.is_empty() && name.bytes().all(|b| b.is_ascii_graphic()))
}

fn single_line(field: &'static str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeader { field });
    }
    Ok(())
}

/// Check everything that can be checked without a connection.
fn validate(message: &Message, transport: &TransportConfig) -> Result<(Address, Address)> {
    if transport.host.trim().is_empty() {
        return Err(Error::InvalidTransport {
            message: "relay host is empty".into(),
        });
    }
    if transport.port == 0 {
        return Err(Error::InvalidTransport {
            message: "relay port must be between 1 and 65535".into(),
        });
    }

    single_line("from", &message.from)?;
    single_line("to", &message.to)?;
    single_line("subject", &message.subject)?;

    // The preamble sits between Subject and the blank separator line
    if let Some(line) = message.preamble.lines().find(|line| reads_as_header(line)) {
        return Err(Error::InvalidPreamble {
            line: line.to_string(),
        });
    }

    let from = parse_address("from", &message.from)?;
    let to = parse_address("to", &message.to)?;
    if let Some(reply_to) = message.reply_address() {
        single_line("reply_to", reply_to)?;
        parse_address("reply_to", reply_to)?;
    }

    Ok((from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay::MockRelay;
    use secrecy::SecretString;

    fn message() -> Message {
        Message {
            from: "a@x.com".into(),
            to: "b@x.com".into(),
            reply_to: Some("c@x.com".into()),
            subject: "Hi".into(),
            preamble: "P".into(),
            body: "B".into(),
        }
    }

    fn transport() -> TransportConfig {
        TransportConfig::new("smtp.x.com", 587)
            .with_credentials("a@x.com", SecretString::new("hunter2".into()))
    }

    #[test]
    fn test_dispatch_sends_exactly_once_to_recipient() {
        let relay = MockRelay::new();
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));

        let receipt = dispatcher.dispatch(&message(), &transport()).unwrap();

        let sent = relay.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "b@x.com");
        assert_eq!(sent[0].from, "a@x.com");
        assert_eq!(
            sent[0].text(),
            "From: a@x.com\r\nTo: b@x.com\r\nReply-To: c@x.com\r\nSubject: Hi\r\nP\r\n\r\nB"
        );
        assert_eq!(receipt.marker, Dispatcher::marker_for(&message(), &transport()));
        assert_eq!(receipt.bytes, sent[0].wire.len());
    }

    #[test]
    fn test_malformed_address_is_fatal_and_sends_nothing() {
        let relay = MockRelay::new();
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));

        for field in ["from", "to", "reply_to"] {
            let mut message = message();
            match field {
                "from" => message.from = "nobody".into(),
                "to" => message.to = "not an address".into(),
                _ => message.reply_to = Some("@x".into()),
            }

            let err = dispatcher.dispatch(&message, &transport()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidAddress { field: f, .. } if f == field),
                "{field}: {err}"
            );
            assert_eq!(err.category(), ErrorCategory::Fatal);
        }
        assert_eq!(relay.sent_count(), 0);
    }

    #[test]
    fn test_header_injection_is_rejected() {
        let relay = MockRelay::new();
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));
        let mut message = message();
        message.subject = "Hi\nBcc: everyone@x.com".into();

        let err = dispatcher.dispatch(&message, &transport()).unwrap_err();
        assert_eq!(err, Error::InvalidHeader { field: "subject" });
        assert_eq!(relay.sent_count(), 0);
    }

    #[test]
    fn test_header_shaped_preamble_is_rejected() {
        let relay = MockRelay::new();
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));

        for preamble in ["Bcc: everyone@x.com", "P\nX-Extra:1", " folded into subject"] {
            let mut message = message();
            message.preamble = preamble.into();

            let err = dispatcher.dispatch(&message, &transport()).unwrap_err();
            assert!(matches!(err, Error::InvalidPreamble { .. }), "{preamble:?}: {err}");
            assert!(!err.is_retryable());
        }
        assert_eq!(relay.sent_count(), 0);

        let mut message = message();
        message.preamble = "Hello team, see below.\nTime 10:30 works".into();
        assert!(dispatcher.dispatch(&message, &transport()).is_ok());
        assert_eq!(relay.sent_count(), 1);
    }

    #[test]
    fn test_padded_addresses_match_the_relay_envelope() {
        let relay = MockRelay::new();
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));
        let mut padded = message();
        padded.to = " b@x.com".into();
        padded.from = "a@x.com ".into();

        let receipt = dispatcher.dispatch(&padded, &transport()).unwrap();
        let sent = relay.sent();
        assert_eq!(sent[0].to, "b@x.com");
        assert!(sent[0].text().starts_with("From: a@x.com\r\nTo: b@x.com\r\n"));
        assert_eq!(receipt.marker, Dispatcher::marker_for(&message(), &transport()));
    }

    #[test]
    fn test_relay_errors_pass_through() {
        let relay = MockRelay::new();
        relay.fail_next(Error::from_reply("451", "try later"));
        let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));

        let err = dispatcher.dispatch(&message(), &transport()).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(relay.sent_count(), 0);
    }

    #[test]
    fn test_bad_transport_is_fatal() {
        let dispatcher = Dispatcher::with_relay(Box::new(MockRelay::new()));
        let err = dispatcher
            .dispatch(&message(), &TransportConfig::new("", 25))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransport { .. }));
        assert!(!err.is_retryable());
    }
}

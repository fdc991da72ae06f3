//! Relay abstraction for message submission.
//!
//! The [`Relay`] trait hands a composed message to a mail server, allowing
//! for different implementations (real SMTP, mock for testing).
//!
//! # Testing
//!
//! Use [`MockRelay`] for testing without network access:
//!
//! ```
//! use mailkit::relay::MockRelay;
//! use mailkit::{Dispatcher, Message, TransportConfig};
//!
//! let relay = MockRelay::new();
//! let dispatcher = Dispatcher::with_relay(Box::new(relay.clone()));
//!
//! let message = Message {
//!     from: "a@x.com".into(),
//!     to: "b@x.com".into(),
//!     reply_to: None,
//!     subject: "Hi".into(),
//!     preamble: String::new(),
//!     body: "B".into(),
//! };
//! dispatcher
//!     .dispatch(&message, &TransportConfig::new("smtp.x.com", 25))
//!     .unwrap();
//! assert_eq!(relay.sent_count(), 1);
//! ```

pub mod smtp;

pub use smtp::SmtpRelay;

use crate::error::{Error, Result};
use crate::types::TransportConfig;
use lettre::Address;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Submits one composed message to exactly one recipient.
///
/// Implementations hold no per-call state and may be invoked from several
/// threads at once.
pub trait Relay: Send + Sync + fmt::Debug {
    /// Submit `wire` (CRLF-encoded) with envelope sender `from` and recipient `to`.
    fn submit(&self, transport: &TransportConfig, from: &Address, to: &Address, wire: &[u8])
    -> Result<()>;
}

/// A message accepted by [`MockRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub route: String,
    pub username: Option<String>,
    pub from: String,
    pub to: String,
    pub wire: Vec<u8>,
}

impl SentMessage {
    /// Wire bytes as text
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.wire).into_owned()
    }
}

/// Mock relay for testing without network access.
///
/// Clones share the same record of submissions, so a test can keep one
/// handle and give the other to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockRelay {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failures: Arc<Mutex<VecDeque<Error>>>,
}

impl MockRelay {
    /// Create a new mock relay that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next submission fail with `error` instead of being accepted.
    ///
    /// Queued failures are consumed in order, one per submission.
    pub fn fail_next(&self, error: Error) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// All accepted submissions in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of accepted submissions.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl Relay for MockRelay {
    fn submit(
        &self,
        transport: &TransportConfig,
        from: &Address,
        to: &Address,
        wire: &[u8],
    ) -> Result<()> {
        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                route: transport.route(),
                username: transport.auth_user().map(str::to_string),
                from: from.to_string(),
                to: to.to_string(),
                wire: wire.to_vec(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(s: &str) -> Address {
        s.parse().unwrap()
    }

    #[test]
    fn test_mock_records_submissions() {
        let relay = MockRelay::new();
        let handle = relay.clone();
        relay
            .submit(
                &TransportConfig::new("smtp.x.com", 25),
                &address("a@x.com"),
                &address("b@x.com"),
                b"hello",
            )
            .unwrap();

        let sent = handle.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].route, "smtp.x.com:25");
        assert_eq!(sent[0].to, "b@x.com");
        assert_eq!(sent[0].text(), "hello");
    }

    #[test]
    fn test_mock_fails_in_order() {
        let relay = MockRelay::new();
        relay.fail_next(Error::Timeout {
            message: "slow".into(),
        });
        let transport = TransportConfig::new("smtp.x.com", 25);
        let (from, to) = (address("a@x.com"), address("b@x.com"));

        let first = relay.submit(&transport, &from, &to, b"x");
        assert!(matches!(first, Err(Error::Timeout { .. })));
        assert_eq!(relay.sent_count(), 0);

        relay.submit(&transport, &from, &to, b"x").unwrap();
        assert_eq!(relay.sent_count(), 1);
    }
}

//! Error types for dispatch operations.
//!
//! Every failure is either [`ErrorCategory::Transient`] (re-invoking the same
//! dispatch may succeed) or [`ErrorCategory::Fatal`] (it will not). The
//! dispatcher itself never retries; callers decide based on the category.

use thiserror::Error;

/// Categories of dispatch errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Timeouts, refused connections, 4xx replies
    Transient,
    /// Bad input, rejected credentials, 5xx replies, TLS or protocol failures
    Fatal,
}

impl ErrorCategory {
    /// Whether this error category is worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Transient => "Temporary delivery failure",
            Self::Fatal => "Permanent delivery failure",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Transient => "The relay may be busy or unreachable; try again later",
            Self::Fatal => "Fix the message or transport settings before trying again",
        }
    }
}

/// Errors that can occur while dispatching a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An address field does not parse as a mailbox
    #[error("invalid {field} address {address:?}: {message}")]
    InvalidAddress {
        /// Message field holding the address
        field: &'static str,
        /// The rejected value
        address: String,
        /// Parser explanation
        message: String,
    },

    /// A header value would break the envelope layout
    #[error("{field} must be a single line")]
    InvalidHeader {
        /// Message field holding the value
        field: &'static str,
    },

    /// A preamble line would be read as an extra header
    #[error("preamble line {line:?} would be read as a message header")]
    InvalidPreamble {
        /// The offending line
        line: String,
    },

    /// Relay host or port unusable
    #[error("invalid transport: {message}")]
    InvalidTransport {
        /// What is wrong with the transport
        message: String,
    },

    /// The relay rejected the credentials
    #[error("authentication failed ({code}): {message}")]
    Authentication {
        /// SMTP reply code
        code: String,
        /// Reply text
        message: String,
    },

    /// Permanent (5xx) rejection
    #[error("rejected by relay ({code}): {message}")]
    Rejected {
        /// SMTP reply code
        code: String,
        /// Reply text
        message: String,
    },

    /// Temporary (4xx) rejection
    #[error("deferred by relay ({code}): {message}")]
    Deferred {
        /// SMTP reply code
        code: String,
        /// Reply text
        message: String,
    },

    /// The relay did not answer in time
    #[error("timed out talking to relay: {message}")]
    Timeout {
        /// Underlying error text
        message: String,
    },

    /// Could not reach the relay or the connection dropped
    #[error("connection to relay failed: {message}")]
    Connection {
        /// Underlying error text
        message: String,
    },

    /// TLS could not be set up
    #[error("TLS error: {message}")]
    Tls {
        /// Underlying error text
        message: String,
    },

    /// The relay or client violated the SMTP protocol
    #[error("SMTP protocol error: {message}")]
    Protocol {
        /// Underlying error text
        message: String,
    },

    /// A dispatch marker string is malformed
    #[error("invalid dispatch marker {0:?}: expected b3:<64 hex digits>")]
    InvalidMarker(String),
}

impl Error {
    /// Get the error category for retry logic.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Deferred { .. } | Error::Timeout { .. } | Error::Connection { .. } => {
                ErrorCategory::Transient
            }
            _ => ErrorCategory::Fatal,
        }
    }

    /// Whether re-invoking the same dispatch may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Create an error from an SMTP reply code and text.
    ///
    /// 530, 534 and 535 are credential problems; other 4xx replies are
    /// temporary and 5xx replies permanent.
    pub fn from_reply(code: &str, message: &str) -> Self {
        let code = code.trim().to_string();
        let message = message.trim().to_string();

        if matches!(code.as_str(), "530" | "534" | "535") {
            return Error::Authentication { code, message };
        }

        if code.starts_with('4') {
            Error::Deferred { code, message }
        } else {
            Error::Rejected { code, message }
        }
    }

    /// Classify an error returned by the `lettre` SMTP transport.
    pub fn from_smtp(err: &lettre::transport::smtp::Error) -> Self {
        let message = err.to_string();

        if err.is_timeout() {
            return Error::Timeout { message };
        }

        if let Some(code) = err.status() {
            return Self::from_reply(&code.to_string(), &message);
        }

        if err.is_tls() {
            return Error::Tls { message };
        }

        if err.is_client() || err.is_response() {
            return Error::Protocol { message };
        }

        Error::Connection { message }
    }
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

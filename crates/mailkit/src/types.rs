//! Core types for mailkit.

use crate::marker::DispatchMarker;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// A single-recipient plain-text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sender address
    pub from: String,
    /// The one recipient
    pub to: String,
    /// Reply address; omitted from the envelope when `None`
    pub reply_to: Option<String>,
    /// Subject line
    pub subject: String,
    /// Text placed between the headers and the body separator
    pub preamble: String,
    /// Message body
    pub body: String,
}

impl Message {
    /// Trimmed reply address, treating a blank one as unset
    pub fn reply_address(&self) -> Option<&str> {
        self.reply_to.as_deref().map(str::trim).filter(|r| !r.is_empty())
    }
}

/// Where and how to submit a message.
pub struct TransportConfig {
    /// Relay host name
    pub host: String,
    /// Relay port
    pub port: u16,
    /// AUTH user; no authentication when `None` or empty
    pub username: Option<String>,
    /// AUTH password, never part of any marker or log line
    pub password: Option<SecretString>,
}

impl TransportConfig {
    /// Create a transport without credentials.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    /// Set AUTH credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: SecretString) -> Self {
        self.username = Some(username.into());
        self.password = Some(password);
        self
    }

    /// `host:port` of the relay
    pub fn route(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// AUTH user, treating an empty string as unset
    pub fn auth_user(&self) -> Option<&str> {
        self.username.as_deref().filter(|u| !u.is_empty())
    }
}

impl Clone for TransportConfig {
    fn clone(&self) -> Self {
        Self {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self
                .password
                .as_ref()
                .map(|p| SecretString::new(p.expose_secret().clone())),
        }
    }
}

impl fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl PartialEq for TransportConfig {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.username == other.username
            && self.password.as_ref().map(|p| p.expose_secret())
                == other.password.as_ref().map(|p| p.expose_secret())
    }
}

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// STARTTLS when offered, plain otherwise
    #[default]
    Opportunistic,
    /// STARTTLS mandatory
    Required,
    /// Implicit TLS from the first byte (usually port 465)
    Wrapper,
    /// Plain text only
    None,
}

impl fmt::Display for TlsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opportunistic => write!(f, "opportunistic"),
            Self::Required => write!(f, "required"),
            Self::Wrapper => write!(f, "wrapper"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Connection settings shared by every dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Bound on every blocking network operation
    pub timeout: Duration,
    pub tls: TlsMode,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            tls: TlsMode::default(),
        }
    }
}

/// Proof that the relay accepted a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReceipt {
    pub marker: DispatchMarker,
    pub recipient: String,
    /// Size of the submitted wire form
    pub bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_password() {
        let transport = TransportConfig::new("smtp.example.com", 587)
            .with_credentials("user@example.com", SecretString::new("hunter2".into()));

        let debug = format!("{transport:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
        assert_eq!(transport.clone(), transport);
    }

    #[test]
    fn test_empty_optionals_are_unset() {
        let mut transport = TransportConfig::new("smtp.example.com", 25);
        transport.username = Some(String::new());
        assert_eq!(transport.auth_user(), None);
        assert_eq!(transport.route(), "smtp.example.com:25");

        let message = Message {
            from: "a@x.com".into(),
            to: "b@x.com".into(),
            reply_to: Some(String::new()),
            subject: "Hi".into(),
            preamble: String::new(),
            body: "B".into(),
        };
        assert_eq!(message.reply_address(), None);
    }
}

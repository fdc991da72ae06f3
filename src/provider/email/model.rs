//! Typed desired and persisted state of an `email` resource
//!
//! Conversions from host attribute values are all-or-nothing: every problem
//! found is collected into one [`ValidationError`] and no partial value is
//! ever returned.

use super::schema::{attr, email_schema};
use chrono::{DateTime, Utc};
use declarative::{AttributeValues, Diagnostic, Diagnostics};
use mailkit::{DispatchMarker, Dispatcher, Message, TransportConfig};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Provider-level settings that fill in unset attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderDefaults {
    /// Sender used when a resource sets no `from`
    pub default_sender: Option<String>,
}

/// One problem with one attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldIssue {
    pub attribute: String,
    pub message: String,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.attribute, self.message)
    }
}

/// Attribute values that do not describe a valid email
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid email resource: {}", render_issues(.issues))]
pub struct ValidationError {
    pub issues: Vec<FieldIssue>,
}

fn render_issues(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// One error diagnostic per issue, each pointing at its attribute
    pub fn to_diagnostics(&self) -> Diagnostics {
        self.issues
            .iter()
            .map(|issue| {
                Diagnostic::error(
                    format!("Invalid attribute \"{}\"", issue.attribute),
                    issue.message.clone(),
                )
                .with_attribute(issue.attribute.clone())
            })
            .collect()
    }
}

/// Collects issues while reading attribute values
struct Reader<'a> {
    values: &'a AttributeValues,
    issues: Vec<FieldIssue>,
}

impl<'a> Reader<'a> {
    fn new(values: &'a AttributeValues) -> Self {
        Self {
            values,
            issues: Vec::new(),
        }
    }

    fn issue(&mut self, attribute: &str, message: impl Into<String>) {
        self.issues.push(FieldIssue {
            attribute: attribute.to_string(),
            message: message.into(),
        });
    }

    fn reject_unknown(&mut self) {
        let schema = email_schema();
        let unknown: Vec<String> = self
            .values
            .keys()
            .filter(|name| schema.attribute(name).is_none())
            .cloned()
            .collect();
        for name in unknown {
            self.issue(&name, "unknown attribute");
        }
    }

    /// Set string value; null and missing both read as `None`
    fn string(&mut self, name: &str) -> Option<String> {
        match self.values.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.issue(name, format!("expected a string, got {}", json_type(other)));
                None
            }
        }
    }

    /// Set, non-empty string value; empty strings read as `None`
    fn non_empty(&mut self, name: &str) -> Option<String> {
        self.string(name).filter(|s| !s.trim().is_empty())
    }

    fn required(&mut self, name: &str) -> String {
        match self.values.get(name) {
            None | Some(Value::Null) => {
                self.issue(name, "is required");
                String::new()
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.issue(name, "must not be empty");
                String::new()
            }
            _ => self.string(name).unwrap_or_default(),
        }
    }

    /// Body-like text: required, but whitespace-only content is allowed
    fn required_text(&mut self, name: &str) -> String {
        if matches!(self.values.get(name), None | Some(Value::Null)) {
            self.issue(name, "is required");
            return String::new();
        }
        self.string(name).unwrap_or_default()
    }

    fn port(&mut self, name: &str) -> u16 {
        let parsed = match self.values.get(name) {
            None | Some(Value::Null) => {
                self.issue(name, "is required");
                return 0;
            }
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
            Some(other) => {
                self.issue(name, format!("expected a port number, got {}", json_type(other)));
                return 0;
            }
        };

        match parsed.map(u16::try_from) {
            Some(Ok(port)) if port > 0 => port,
            _ => {
                self.issue(name, "must be an integer between 1 and 65535");
                0
            }
        }
    }

    fn address(&mut self, name: &str, value: &str) {
        let well_formed = value
            .split_once('@')
            .is_some_and(|(user, domain)| !user.is_empty() && !domain.is_empty());
        if !well_formed {
            self.issue(name, format!("{value:?} is not an email address"));
        }
    }

    fn finish<T>(self, value: T) -> Result<T, ValidationError> {
        if self.issues.is_empty() {
            Ok(value)
        } else {
            Err(ValidationError {
                issues: self.issues,
            })
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

fn optional_value(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.to_string()))
}

/// Desired state of one email
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceConfig {
    pub recipient: String,
    /// Resolved sender, after applying provider defaults
    pub sender: String,
    pub reply_to: Option<String>,
    pub subject: String,
    pub preamble: String,
    pub body: String,
    pub transport: TransportConfig,
}

impl ResourceConfig {
    /// Read and validate a plan
    pub fn from_attributes(
        values: &AttributeValues,
        defaults: &ProviderDefaults,
    ) -> Result<Self, ValidationError> {
        let mut reader = Reader::new(values);
        reader.reject_unknown();

        let recipient = reader.required(attr::TO);
        if !recipient.is_empty() {
            reader.address(attr::TO, &recipient);
        }

        let reply_to = reader.non_empty(attr::REPLY_TO);
        if let Some(reply_to) = &reply_to {
            reader.address(attr::REPLY_TO, reply_to);
        }

        let subject = reader.required(attr::SUBJECT);
        let preamble = reader.string(attr::PREAMBLE).unwrap_or_default();
        let body = reader.required_text(attr::BODY);

        let host = reader.required(attr::SMTP_SERVER);
        let port = reader.port(attr::SMTP_PORT);
        let username = reader.non_empty(attr::SMTP_USERNAME);
        let password = reader.string(attr::SMTP_PASSWORD).map(SecretString::new);

        let sender = match reader.non_empty(attr::FROM) {
            Some(sender) => {
                reader.address(attr::FROM, &sender);
                sender
            }
            None => match resolve_default_sender(defaults, username.as_deref()) {
                Some(sender) => sender,
                None => {
                    reader.issue(
                        attr::FROM,
                        "no sender: set \"from\", the provider's default_sender, \
                         or an address-shaped smtp_username",
                    );
                    String::new()
                }
            },
        };

        reader.finish(Self {
            recipient,
            sender,
            reply_to,
            subject,
            preamble,
            body,
            transport: TransportConfig {
                host: host.trim().to_string(),
                port,
                username,
                password,
            },
        })
    }

    /// Attribute values of this config, password included
    pub fn to_attributes(&self) -> AttributeValues {
        let mut values = AttributeValues::new();
        values.insert(attr::TO.into(), Value::String(self.recipient.clone()));
        values.insert(attr::FROM.into(), Value::String(self.sender.clone()));
        values.insert(attr::REPLY_TO.into(), optional_value(self.reply_to.as_deref()));
        values.insert(attr::SUBJECT.into(), Value::String(self.subject.clone()));
        values.insert(attr::PREAMBLE.into(), Value::String(self.preamble.clone()));
        values.insert(attr::BODY.into(), Value::String(self.body.clone()));
        values.insert(attr::SMTP_SERVER.into(), Value::String(self.transport.host.clone()));
        values.insert(attr::SMTP_PORT.into(), Value::from(self.transport.port));
        values.insert(
            attr::SMTP_USERNAME.into(),
            optional_value(self.transport.username.as_deref()),
        );
        values.insert(
            attr::SMTP_PASSWORD.into(),
            optional_value(self.transport.password.as_ref().map(|p| p.expose_secret().as_str())),
        );
        values
    }

    pub fn message(&self) -> Message {
        Message {
            from: self.sender.clone(),
            to: self.recipient.clone(),
            reply_to: self.reply_to.clone(),
            subject: self.subject.clone(),
            preamble: self.preamble.clone(),
            body: self.body.clone(),
        }
    }

    /// Marker a dispatch of this config would produce
    pub fn marker(&self) -> DispatchMarker {
        Dispatcher::marker_for(&self.message(), &self.transport)
    }
}

fn resolve_default_sender(defaults: &ProviderDefaults, username: Option<&str>) -> Option<String> {
    defaults
        .default_sender
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| username.filter(|u| u.contains('@')))
        .map(str::to_string)
}

/// Persisted state: the config as dispatched, plus its marker
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState {
    pub config: ResourceConfig,
    pub id: DispatchMarker,
    pub dispatched_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn to_attributes(&self) -> AttributeValues {
        let mut values = self.config.to_attributes();
        values.insert(attr::ID.into(), Value::String(self.id.to_string()));
        values.insert(
            attr::DISPATCHED_AT.into(),
            Value::String(self.dispatched_at.to_rfc3339()),
        );
        values
    }

    pub fn from_attributes(
        values: &AttributeValues,
        defaults: &ProviderDefaults,
    ) -> Result<Self, ValidationError> {
        let mut reader = Reader::new(values);

        let id = match reader.string(attr::ID) {
            Some(id) => match id.parse::<DispatchMarker>() {
                Ok(marker) => Some(marker),
                Err(e) => {
                    reader.issue(attr::ID, e.to_string());
                    None
                }
            },
            None => {
                reader.issue(attr::ID, "is required in persisted state");
                None
            }
        };

        let dispatched_at = match reader.string(attr::DISPATCHED_AT) {
            Some(ts) => match DateTime::parse_from_rfc3339(&ts) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(e) => {
                    reader.issue(attr::DISPATCHED_AT, format!("not an RFC 3339 timestamp: {e}"));
                    None
                }
            },
            None => {
                reader.issue(attr::DISPATCHED_AT, "is required in persisted state");
                None
            }
        };

        let config = ResourceConfig::from_attributes(values, defaults);

        let mut issues = reader.issues;
        match (config, id, dispatched_at) {
            (Ok(config), Some(id), Some(dispatched_at)) if issues.is_empty() => Ok(Self {
                config,
                id,
                dispatched_at,
            }),
            (config, ..) => {
                if let Err(e) = config {
                    issues.extend(e.issues);
                }
                Err(ValidationError { issues })
            }
        }
    }

    /// Copy with the password dropped, for storage outside host state
    pub fn without_password(&self) -> Self {
        let mut state = self.clone();
        state.config.transport.password = None;
        state
    }
}

/// Where an email resource stands; the only transition is Absent to Dispatched
#[derive(Debug, Clone, PartialEq)]
pub enum Lifecycle {
    /// Nothing sent, nothing persisted
    Absent,
    /// The relay accepted the message; the state records what was sent
    Dispatched(Box<ResourceState>),
}

impl Lifecycle {
    pub fn dispatched(state: ResourceState) -> Self {
        Self::Dispatched(Box::new(state))
    }

    /// Host-facing state values; `None` while absent
    pub fn attributes(&self) -> Option<AttributeValues> {
        match self {
            Self::Absent => None,
            Self::Dispatched(state) => Some(state.to_attributes()),
        }
    }
}

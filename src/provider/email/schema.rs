//! Attribute schema of the `email` resource

use declarative::{Attribute, AttributeType, Schema};
use serde_json::Value;

/// Bumped whenever the persisted attribute layout changes
pub const SCHEMA_VERSION: u64 = 1;

/// Attribute names, shared with the model conversions
pub mod attr {
    pub const TO: &str = "to";
    pub const FROM: &str = "from";
    pub const REPLY_TO: &str = "reply_to";
    pub const SUBJECT: &str = "subject";
    pub const PREAMBLE: &str = "preamble";
    pub const BODY: &str = "body";
    pub const SMTP_SERVER: &str = "smtp_server";
    pub const SMTP_PORT: &str = "smtp_port";
    pub const SMTP_USERNAME: &str = "smtp_username";
    pub const SMTP_PASSWORD: &str = "smtp_password";
    pub const ID: &str = "id";
    pub const DISPATCHED_AT: &str = "dispatched_at";
}

/// Schema of `<provider>_email`, in declaration order
pub fn email_schema() -> Schema {
    use AttributeType::{Number, String};

    Schema::new(
        SCHEMA_VERSION,
        "Sends one email when created. Changing content or transport sends a new one; \
         destroying it only forgets that it was sent.",
    )
    .with_attribute(Attribute::required(attr::TO, String, "Recipient address"))
    .with_attribute(Attribute::optional_computed(
        attr::FROM,
        String,
        "Sender address. Defaults to the provider's default_sender, then to smtp_username when it is an address",
    ))
    .with_attribute(Attribute::optional(attr::REPLY_TO, String, "Reply-To address"))
    .with_attribute(Attribute::required(attr::SUBJECT, String, "Subject line"))
    .with_attribute(Attribute::defaulted(
        attr::PREAMBLE,
        String,
        Value::String(std::string::String::new()),
        "Text placed between the headers and the body",
    ))
    .with_attribute(Attribute::required(attr::BODY, String, "Message body"))
    .with_attribute(Attribute::required(attr::SMTP_SERVER, String, "SMTP relay host"))
    .with_attribute(Attribute::required(
        attr::SMTP_PORT,
        Number,
        "SMTP relay port (1-65535); numeric strings are accepted",
    ))
    .with_attribute(Attribute::optional(
        attr::SMTP_USERNAME,
        String,
        "SMTP AUTH user; no authentication when unset",
    ))
    .with_attribute(
        Attribute::optional(attr::SMTP_PASSWORD, String, "SMTP AUTH password").sensitive(),
    )
    .with_attribute(Attribute::computed(
        attr::ID,
        String,
        "Dispatch marker: content hash of the message as sent",
    ))
    .with_attribute(Attribute::computed(
        attr::DISPATCHED_AT,
        String,
        "When the relay accepted the message (RFC 3339)",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::Requirement;

    #[test]
    fn test_schema_is_deterministic() {
        assert_eq!(
            serde_json::to_string(&email_schema()).unwrap(),
            serde_json::to_string(&email_schema()).unwrap()
        );
    }

    #[test]
    fn test_attribute_order_and_flags() {
        let schema = email_schema();
        let names: Vec<_> = schema.names().collect();
        assert_eq!(
            names,
            [
                "to",
                "from",
                "reply_to",
                "subject",
                "preamble",
                "body",
                "smtp_server",
                "smtp_port",
                "smtp_username",
                "smtp_password",
                "id",
                "dispatched_at",
            ]
        );

        assert!(schema.is_sensitive(attr::SMTP_PASSWORD));
        assert_eq!(schema.names().filter(|n| schema.is_sensitive(n)).count(), 1);
        assert_eq!(
            schema.attribute(attr::PREAMBLE).unwrap().requirement,
            Requirement::Defaulted(Value::String(String::new()))
        );
        assert_eq!(schema.attribute(attr::SMTP_PORT).unwrap().kind, AttributeType::Number);
        assert_eq!(schema.attribute(attr::ID).unwrap().requirement, Requirement::Computed);
    }
}

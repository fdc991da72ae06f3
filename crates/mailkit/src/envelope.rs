//! Envelope layout.
//!
//! Header lines appear in a fixed order (`From`, `To`, optional `Reply-To`,
//! `Subject`), followed directly by the preamble, a blank line and the body.
//! Addresses are written trimmed, as they are handed to the relay:
//!
//! ```text
//! From: a@x.com
//! To: b@x.com
//! Reply-To: c@x.com
//! Subject: Hi
//! P
//!
//! B
//! ```

use crate::types::Message;

/// The exact bytes of a message as composed, before wire encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    text: String,
}

impl Envelope {
    /// Compose the envelope for `message`.
    pub fn build(message: &Message) -> Self {
        let mut text = String::with_capacity(
            message.subject.len() + message.preamble.len() + message.body.len() + 64,
        );

        text.push_str("From: ");
        text.push_str(message.from.trim());
        text.push('\n');

        text.push_str("To: ");
        text.push_str(message.to.trim());
        text.push('\n');

        if let Some(reply_to) = message.reply_address() {
            text.push_str("Reply-To: ");
            text.push_str(reply_to);
            text.push('\n');
        }

        text.push_str("Subject: ");
        text.push_str(&message.subject);
        text.push('\n');

        text.push_str(&message.preamble);
        text.push_str("\n\n");
        text.push_str(&message.body);

        Self { text }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// SMTP wire form: every line ending becomes CRLF.
    pub fn to_wire(&self) -> Vec<u8> {
        self.text
            .replace("\r\n", "\n")
            .replace('\n', "\r\n")
            .into_bytes()
    }
}

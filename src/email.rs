use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmailError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Mailbox '{mailbox}' not found: {reason}")]
    MailboxNotFound { mailbox: String, reason: String },

    #[error("Transmission failed: {0}")]
    Transmission(String),

    #[error("Cannot read attachment {path:?}: {source}")]
    AttachmentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode message part: {0}")]
    PartDecode(String),

    #[error("Cannot assemble message: {0}")]
    Build(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("TLS error: {0}")]
    Tls(#[from] native_tls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recipient list accepted at the public boundary.
///
/// A single address and a list of addresses both convert into this type, so
/// the rest of the crate only ever deals with a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients(Vec<String>);

impl Recipients {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl From<&str> for Recipients {
    fn from(address: &str) -> Self {
        Self(vec![address.to_string()])
    }
}

impl From<String> for Recipients {
    fn from(address: String) -> Self {
        Self(vec![address])
    }
}

impl From<Vec<String>> for Recipients {
    fn from(addresses: Vec<String>) -> Self {
        Self(addresses)
    }
}

impl From<Vec<&str>> for Recipients {
    fn from(addresses: Vec<&str>) -> Self {
        Self(addresses.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Recipients {
    fn from(addresses: &[&str]) -> Self {
        Self(addresses.iter().map(|a| a.to_string()).collect())
    }
}

/// A message to be assembled and sent. Built fresh for every send.
#[derive(Debug, Clone, Default)]
pub struct OutboundMessage {
    pub sender: String,
    pub to: Recipients,
    pub cc: Recipients,
    /// Delivered to, never written into a header.
    pub bcc: Recipients,
    pub subject: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub attachments: Vec<PathBuf>,
}

impl OutboundMessage {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            ..Default::default()
        }
    }
}

/// The full set of addresses handed to the transport: To, then Cc, then Bcc.
/// Order is preserved and duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryEnvelope {
    pub recipients: Vec<String>,
}

impl DeliveryEnvelope {
    pub fn from_message(message: &OutboundMessage) -> Self {
        let recipients = message
            .to
            .iter()
            .chain(message.cc.iter())
            .chain(message.bcc.iter())
            .cloned()
            .collect();
        Self { recipients }
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }
}

/// Server-assigned sequence number of a message inside a selected mailbox.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MessageId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Inclusive `start:end` sequence set as written on the IMAP wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqRange {
    pub start: MessageId,
    pub end: MessageId,
}

impl SeqRange {
    pub fn new(start: MessageId, end: MessageId) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, id: MessageId) -> bool {
        let (low, high) = if self.start <= self.end {
            (self.start, self.end)
        } else {
            (self.end, self.start)
        };
        low <= id && id <= high
    }
}

impl fmt::Display for SeqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// A message fetched from a mailbox and decoded.
#[derive(Debug, Clone, Default)]
pub struct InboundMessage {
    pub id: MessageId,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,
    pub bcc: Option<String>,
    pub date: Option<String>,
    pub subject: Option<String>,
    /// All text/plain parts, concatenated in the order they were found.
    pub body_text: String,
    /// All text/html parts, concatenated in the order they were found.
    pub body_html: String,
    pub attachments: Vec<String>,
    raw: Option<Vec<u8>>,
}

impl InboundMessage {
    pub fn new(id: MessageId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub(crate) fn with_raw(mut self, raw: Vec<u8>) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn has_raw(&self) -> bool {
        self.raw.is_some()
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw.as_deref()
    }

    /// Parse the retained raw message again. Only available when the raw body
    /// was requested at fetch time.
    pub fn raw_message(&self) -> Option<mail_parser::Message<'_>> {
        self.raw
            .as_deref()
            .and_then(|raw| mail_parser::Message::parse(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_recipient_normalizes_to_list() {
        let recipients = Recipients::from("alice@example.com");
        assert_eq!(recipients.as_slice(), &["alice@example.com".to_string()]);
    }

    #[test]
    fn test_envelope_keeps_order_and_duplicates() {
        let mut message = OutboundMessage::new("me@example.com");
        message.to = vec!["a@example.com", "b@example.com"].into();
        message.cc = "a@example.com".into();
        message.bcc = "hidden@example.com".into();

        let envelope = DeliveryEnvelope::from_message(&message);
        assert_eq!(
            envelope.recipients,
            vec![
                "a@example.com".to_string(),
                "b@example.com".to_string(),
                "a@example.com".to_string(),
                "hidden@example.com".to_string(),
            ]
        );
    }

    #[test]
    fn test_seq_range_display() {
        let range = SeqRange::new(MessageId(1), MessageId(51));
        assert_eq!(range.to_string(), "1:51");
        assert!(range.contains(MessageId(51)));
        assert!(!range.contains(MessageId(52)));
    }

    #[test]
    fn test_raw_is_empty_by_default() {
        let message = InboundMessage::new(MessageId(3));
        assert!(!message.has_raw());
        assert!(message.raw_message().is_none());
        assert!(message.body_text.is_empty());
        assert!(message.body_html.is_empty());
    }
}

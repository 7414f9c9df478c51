use std::fs;
use std::path::Path;

use lettre::address::{Address, Envelope};
use lettre::message::header::{Cc, ContentTransferEncoding, ContentType, Header, Headers, To};
use lettre::message::{Attachment, Body, Mailbox, Mailboxes, MultiPart, SinglePart};
use lettre::Message;

use crate::email::{DeliveryEnvelope, EmailError, OutboundMessage};
use crate::logging::Logger;

/// A serialized message ready for submission, with the addresses it goes to.
#[derive(Debug, Clone)]
pub struct BuiltMessage {
    pub formatted: Vec<u8>,
    pub envelope: DeliveryEnvelope,
}

impl BuiltMessage {
    pub fn as_string(&self) -> String {
        String::from_utf8_lossy(&self.formatted).into_owned()
    }
}

/// Turns an [`OutboundMessage`] into MIME wire format.
///
/// The plain part always precedes the HTML part: clients render the last
/// alternative they understand. Attachments that cannot be read are logged
/// and left out; they never fail the build.
pub struct MessageBuilder {
    logger: Logger,
    show_recipients: bool,
}

impl MessageBuilder {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            show_recipients: true,
        }
    }

    /// When false, no To header is written. Recipients still receive the
    /// message through the envelope.
    pub fn show_recipients(mut self, show: bool) -> Self {
        self.show_recipients = show;
        self
    }

    pub fn build(&self, message: &OutboundMessage) -> Result<BuiltMessage, EmailError> {
        let envelope = DeliveryEnvelope::from_message(message);

        let from = parse_mailbox(&message.sender)?;
        let recipients = envelope
            .recipients
            .iter()
            .map(|r| parse_mailbox(r).map(|m| m.email))
            .collect::<Result<Vec<Address>, _>>()?;
        let smtp_envelope = Envelope::new(Some(from.email.clone()), recipients)
            .map_err(|e| EmailError::InvalidAddress(e.to_string()))?;

        let mut builder = Message::builder().from(from).envelope(smtp_envelope);

        if let Some(subject) = message.subject.as_deref().filter(|s| !s.is_empty()) {
            builder = builder.subject(subject);
        }

        // One To or Cc line per address, ahead of the builder's headers.
        let mut recipient_headers = String::new();
        if self.show_recipients {
            for to in message.to.iter() {
                recipient_headers.push_str(&header_line(To::from(Mailboxes::from(parse_mailbox(to)?))));
            }
        }
        for cc in message.cc.iter() {
            recipient_headers.push_str(&header_line(Cc::from(Mailboxes::from(parse_mailbox(cc)?))));
        }

        let mut alternative: Option<MultiPart> = None;
        if let Some(text) = &message.body_text {
            let part = SinglePart::plain(text.clone());
            alternative = Some(match alternative {
                Some(multipart) => multipart.singlepart(part),
                None => MultiPart::alternative().singlepart(part),
            });
        }
        if let Some(html) = &message.body_html {
            let part = SinglePart::html(html.clone());
            alternative = Some(match alternative {
                Some(multipart) => multipart.singlepart(part),
                None => MultiPart::alternative().singlepart(part),
            });
        }

        let attachments = self.read_attachments(message.attachments.as_slice())?;

        let body = if attachments.is_empty() {
            alternative
        } else {
            let mut mixed = alternative.map(|alt| MultiPart::mixed().multipart(alt));
            for part in attachments {
                mixed = Some(match mixed {
                    Some(multipart) => multipart.singlepart(part),
                    None => MultiPart::mixed().singlepart(part),
                });
            }
            mixed
        };

        let email = match body {
            Some(multipart) => builder.multipart(multipart),
            None => builder.body(String::new()),
        }
        .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut formatted = recipient_headers.into_bytes();
        formatted.extend_from_slice(&email.formatted());

        Ok(BuiltMessage { formatted, envelope })
    }

    fn read_attachments<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<SinglePart>, EmailError> {
        let octet_stream = ContentType::parse("application/octet-stream")
            .map_err(|e| EmailError::Build(e.to_string()))?;

        let mut parts = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let Some(filename) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                self.logger.warn(&format!("Attachment {:?} has no file name, skipping", path));
                continue;
            };

            let data = match fs::read(path) {
                Ok(data) => data,
                Err(source) => {
                    let err = EmailError::AttachmentRead {
                        path: path.to_path_buf(),
                        source,
                    };
                    self.logger.warn(&format!("{}, skipping", err));
                    continue;
                }
            };

            let body = Body::new_with_encoding(data, ContentTransferEncoding::Base64)
                .map_err(|_| EmailError::Build(format!("cannot base64-encode {}", filename)))?;
            parts.push(Attachment::new(filename).body(body, octet_stream.clone()));
        }

        Ok(parts)
    }
}

/// One encoded `Name: value\r\n` line.
fn header_line<H: Header>(header: H) -> String {
    let mut headers = Headers::new();
    headers.set(header);
    headers.to_string()
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .trim()
        .parse::<Mailbox>()
        .map_err(|e| EmailError::InvalidAddress(format!("'{}': {}", address, e)))
}

use std::fmt::Display;

use lettre::address::{Address, Envelope};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{SmtpTransport, Transport};

use crate::email::EmailError;
use crate::logging::Logger;

pub const IMPLICIT_TLS_PORT: u16 = 465;
pub const SUBMISSION_PORT: u16 = 587;

/// Outcome of a single send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Sent,
    Failed,
}

impl SendResult {
    /// 1 for sent, 0 for failed.
    pub fn code(self) -> i32 {
        match self {
            SendResult::Sent => 1,
            SendResult::Failed => 0,
        }
    }

    pub fn is_sent(self) -> bool {
        self == SendResult::Sent
    }
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    /// Connect with TLS straight away instead of upgrading with STARTTLS.
    pub implicit_tls: bool,
    /// Overrides 465 / 587.
    pub port: Option<u16>,
}

impl SmtpSettings {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(if self.implicit_tls {
            IMPLICIT_TLS_PORT
        } else {
            SUBMISSION_PORT
        })
    }
}

/// Hands serialized messages to an SMTP server. One attempt per call, and
/// every failure is logged and folded into [`SendResult::Failed`].
pub struct TransportSender {
    logger: Logger,
}

impl TransportSender {
    pub fn new(logger: Logger) -> Self {
        Self { logger }
    }

    pub fn send(
        &self,
        formatted: &[u8],
        sender: &str,
        recipients: &[String],
        credential: &str,
        settings: &SmtpSettings,
    ) -> SendResult {
        match smtp_transport(sender, credential, settings) {
            Ok(transport) => {
                // The transport is dropped on return, which closes the connection.
                self.submit(&transport, formatted, sender, recipients)
            }
            Err(e) => {
                self.logger.error(&format!(
                    "Cannot set up SMTP transport to {}:{}: {}",
                    settings.host,
                    settings.port(),
                    e
                ));
                SendResult::Failed
            }
        }
    }

    /// Submit through any lettre transport.
    pub fn submit<T>(&self, transport: &T, formatted: &[u8], sender: &str, recipients: &[String]) -> SendResult
    where
        T: Transport,
        T::Error: Display,
    {
        let envelope = match envelope(sender, recipients) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.logger.error(&format!("Cannot build delivery envelope: {}", e));
                return SendResult::Failed;
            }
        };

        match transport.send_raw(&envelope, formatted) {
            Ok(_) => {
                self.logger.info(&format!(
                    "The mail has been sent to {} recipient(s). Time: {}",
                    recipients.len(),
                    chrono::Local::now().format("%H:%M:%S")
                ));
                SendResult::Sent
            }
            Err(e) => {
                let err = EmailError::Transmission(e.to_string());
                self.logger.error(&err.to_string());
                SendResult::Failed
            }
        }
    }
}

fn envelope(sender: &str, recipients: &[String]) -> Result<Envelope, EmailError> {
    let from = parse_address(sender)?;
    let to = recipients
        .iter()
        .map(|r| parse_address(r))
        .collect::<Result<Vec<_>, _>>()?;
    Envelope::new(Some(from), to).map_err(|e| EmailError::InvalidAddress(e.to_string()))
}

fn parse_address(address: &str) -> Result<Address, EmailError> {
    address
        .trim()
        .parse::<Address>()
        .map_err(|e| EmailError::InvalidAddress(format!("'{}': {}", address, e)))
}

/// Build a blocking SMTP transport authenticated as `username`.
///
/// Implicit TLS wraps the connection from the first byte; otherwise the
/// client greets in plaintext and STARTTLS is required before AUTH.
pub fn smtp_transport(username: &str, credential: &str, settings: &SmtpSettings) -> Result<SmtpTransport, EmailError> {
    let creds = Credentials::new(username.to_string(), credential.to_string());
    let tls_params = TlsParameters::new(settings.host.clone())
        .map_err(|e| EmailError::Transmission(e.to_string()))?;

    let tls = if settings.implicit_tls {
        Tls::Wrapper(tls_params)
    } else {
        Tls::Required(tls_params)
    };

    let transport = SmtpTransport::relay(&settings.host)
        .map_err(|e| EmailError::Transmission(e.to_string()))?
        .credentials(creds)
        .port(settings.port())
        .tls(tls)
        .build();

    Ok(transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{MemorySink, Verbosity};
    use lettre::transport::stub::StubTransport;

    fn sender(sink: &MemorySink) -> TransportSender {
        TransportSender::new(Logger::new("send_mail", Verbosity::Info).with_writer(sink.clone()))
    }

    fn recipients() -> Vec<String> {
        vec!["a@example.com".to_string(), "b@example.com".to_string()]
    }

    #[test]
    fn test_default_ports() {
        let mut settings = SmtpSettings {
            host: "smtp.example.com".to_string(),
            implicit_tls: true,
            port: None,
        };
        assert_eq!(settings.port(), 465);

        settings.implicit_tls = false;
        assert_eq!(settings.port(), 587);

        settings.port = Some(2525);
        assert_eq!(settings.port(), 2525);
    }

    #[test]
    fn test_successful_submit_is_logged() {
        let sink = MemorySink::new();
        let result = sender(&sink).submit(
            &StubTransport::new_ok(),
            b"Subject: hi\r\n\r\nbody\r\n",
            "me@example.com",
            &recipients(),
        );

        assert_eq!(result, SendResult::Sent);
        assert_eq!(result.code(), 1);
        assert!(sink.contents().contains("INFO send_mail: The mail has been sent to 2 recipient(s)"));
    }

    #[test]
    fn test_rejected_submit_reports_failure() {
        let sink = MemorySink::new();
        let result = sender(&sink).submit(
            &StubTransport::new_error(),
            b"Subject: hi\r\n\r\nbody\r\n",
            "me@example.com",
            &recipients(),
        );

        assert_eq!(result, SendResult::Failed);
        assert_eq!(result.code(), 0);
        assert!(sink.contents().contains("ERROR send_mail: Transmission failed"));
    }

    #[test]
    fn test_empty_envelope_fails_without_submitting() {
        let sink = MemorySink::new();
        let result = sender(&sink).submit(&StubTransport::new_ok(), b"", "me@example.com", &[]);

        assert_eq!(result, SendResult::Failed);
        assert!(sink.contents().contains("Cannot build delivery envelope"));
    }
}

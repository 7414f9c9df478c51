use std::fmt::Display;

use lettre::Transport;

use crate::compose::{BuiltMessage, MessageBuilder};
use crate::config::{DeleteOptions, ReceiveOptions, SendOptions};
use crate::delete::BatchDeleter;
use crate::email::{InboundMessage, OutboundMessage};
use crate::fetch::{FetchLimit, FetchOptions, FetchOrder, MessageFetcher};
use crate::logging::{Logger, LoggerRegistry};
use crate::mailbox::{select_all, ImapMailbox, MailboxClient};
use crate::transport::{SendResult, SmtpSettings, TransportSender};

pub const SEND_LOGGER: &str = "send_mail";
pub const RECEIVE_LOGGER: &str = "receive_mail";
pub const DELETE_LOGGER: &str = "delete_mail";

/// Entry point for sending, receiving and deleting mail.
///
/// Every call opens its own connection and closes it before returning. The
/// client owns the logger registry, so each operation's logger is set up once
/// and reused by later calls.
#[derive(Debug, Default)]
pub struct MailClient {
    loggers: LoggerRegistry,
}

impl MailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loggers(loggers: LoggerRegistry) -> Self {
        Self { loggers }
    }

    pub fn loggers(&self) -> &LoggerRegistry {
        &self.loggers
    }

    fn build(&mut self, message: &OutboundMessage, options: &SendOptions) -> Option<(Logger, BuiltMessage)> {
        let logger = self
            .loggers
            .register(SEND_LOGGER, options.verbosity, options.log_file.as_deref());

        match MessageBuilder::new(logger.clone())
            .show_recipients(options.show_recipients)
            .build(message)
        {
            Ok(built) => Some((logger, built)),
            Err(e) => {
                logger.error(&format!("Cannot build message: {}", e));
                None
            }
        }
    }

    /// Build and send `message`. Never fails outright: problems are logged and
    /// reported as [`SendResult::Failed`].
    pub fn send_mail(&mut self, message: &OutboundMessage, credential: &str, options: &SendOptions) -> SendResult {
        let Some((logger, built)) = self.build(message, options) else {
            return SendResult::Failed;
        };

        let settings = SmtpSettings {
            host: options.host.clone(),
            implicit_tls: options.use_implicit_tls,
            port: options.port,
        };
        TransportSender::new(logger).send(
            &built.formatted,
            &message.sender,
            &built.envelope.recipients,
            credential,
            &settings,
        )
    }

    /// Like [`MailClient::send_mail`], through a transport supplied by the caller.
    pub fn send_mail_with<T>(&mut self, transport: &T, message: &OutboundMessage, options: &SendOptions) -> SendResult
    where
        T: Transport,
        T::Error: Display,
    {
        let Some((logger, built)) = self.build(message, options) else {
            return SendResult::Failed;
        };

        TransportSender::new(logger).submit(transport, &built.formatted, &message.sender, &built.envelope.recipients)
    }

    /// Fetch messages from `options.mailbox`. A login or select failure is
    /// logged and yields an empty list.
    pub fn receive_mail(&mut self, username: &str, credential: &str, options: &ReceiveOptions) -> Vec<InboundMessage> {
        let logger = self
            .loggers
            .register(RECEIVE_LOGGER, options.verbosity, options.log_file.as_deref());

        match ImapMailbox::open(&options.host, options.port, username, credential, &logger) {
            Ok(mut session) => self.receive_from(&mut session, options),
            Err(_) => Vec::new(),
        }
    }

    /// Fetch through an already authenticated session, then log out.
    pub fn receive_from<C: MailboxClient + ?Sized>(&mut self, session: &mut C, options: &ReceiveOptions) -> Vec<InboundMessage> {
        let logger = self
            .loggers
            .register(RECEIVE_LOGGER, options.verbosity, options.log_file.as_deref());

        let messages = match select_all(session, &options.mailbox, &logger) {
            Ok(ids) => {
                let fetch_options = FetchOptions {
                    order: if options.latest_first {
                        FetchOrder::LatestFirst
                    } else {
                        FetchOrder::Ascending
                    },
                    limit: FetchLimit::from_count(options.count),
                    include_raw: options.include_raw_body,
                    save_dir: options.attachment_save_path.clone(),
                };
                MessageFetcher::new(logger.clone(), fetch_options).fetch_all(session, &ids)
            }
            Err(_) => Vec::new(),
        };

        if let Err(e) = session.logout() {
            logger.error(&format!("Logout failed: {}", e));
        }
        messages
    }

    /// Flag and expunge every message in `options.mailbox`.
    pub fn delete_all_inbox(&mut self, username: &str, credential: &str, options: &DeleteOptions) {
        let logger = self
            .loggers
            .register(DELETE_LOGGER, options.verbosity, options.log_file.as_deref());

        if let Ok(mut session) = ImapMailbox::open(&options.host, options.port, username, credential, &logger) {
            self.delete_from(&mut session, options);
        }
    }

    pub fn delete_from<C: MailboxClient + ?Sized>(&mut self, session: &mut C, options: &DeleteOptions) {
        let logger = self
            .loggers
            .register(DELETE_LOGGER, options.verbosity, options.log_file.as_deref());

        BatchDeleter::new(logger, options.batch_size).delete_all(session, &options.mailbox);
    }
}

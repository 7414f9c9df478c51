use std::net::TcpStream;

use imap::Session;
use native_tls::{TlsConnector, TlsStream};

use crate::email::{EmailError, MessageId, SeqRange};
use crate::logging::Logger;

pub const IMAP_TLS_PORT: u16 = 993;

/// The IMAP operations the fetch and delete paths rely on, on an already
/// authenticated connection.
pub trait MailboxClient {
    fn select(&mut self, mailbox: &str) -> Result<(), EmailError>;

    /// Every message in the selected mailbox, ascending.
    fn search_all(&mut self) -> Result<Vec<MessageId>, EmailError>;

    /// Full RFC822 bytes of one message.
    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, EmailError>;

    fn mark_deleted(&mut self, range: SeqRange) -> Result<(), EmailError>;

    fn expunge(&mut self) -> Result<(), EmailError>;

    fn close(&mut self) -> Result<(), EmailError>;

    fn logout(&mut self) -> Result<(), EmailError>;
}

/// A logged-in session over implicit TLS.
pub struct ImapMailbox {
    session: Session<TlsStream<TcpStream>>,
}

impl ImapMailbox {
    /// Connect and log in. A rejected login is returned as
    /// [`EmailError::Authentication`]; no half-open session is handed out.
    pub fn open(host: &str, port: u16, username: &str, credential: &str, logger: &Logger) -> Result<Self, EmailError> {
        let tls = TlsConnector::builder().build()?;
        let client = imap::connect((host, port), host, &tls).map_err(|e| {
            let err = EmailError::Imap(format!("cannot connect to {}:{}: {}", host, port, e));
            logger.error(&err.to_string());
            err
        })?;

        let session = client.login(username, credential).map_err(|(e, _client)| {
            let err = EmailError::Authentication(format!("{} on {}: {}", username, host, e));
            logger.error(&err.to_string());
            err
        })?;

        logger.info(&format!("Logged in to {} as {}", host, username));
        Ok(Self { session })
    }
}

impl MailboxClient for ImapMailbox {
    fn select(&mut self, mailbox: &str) -> Result<(), EmailError> {
        self.session
            .select(mailbox)
            .map(|_| ())
            .map_err(|e| EmailError::MailboxNotFound {
                mailbox: mailbox.to_string(),
                reason: e.to_string(),
            })
    }

    fn search_all(&mut self) -> Result<Vec<MessageId>, EmailError> {
        let found = self
            .session
            .search("ALL")
            .map_err(|e| EmailError::Imap(e.to_string()))?;

        let mut ids: Vec<MessageId> = found.into_iter().map(MessageId).collect();
        ids.sort();
        Ok(ids)
    }

    fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, EmailError> {
        let messages = self
            .session
            .fetch(id.to_string(), "RFC822")
            .map_err(|e| EmailError::Imap(e.to_string()))?;

        messages
            .iter()
            .find_map(|m| m.body().map(|body| body.to_vec()))
            .ok_or_else(|| EmailError::Imap(format!("message {} returned no body", id)))
    }

    fn mark_deleted(&mut self, range: SeqRange) -> Result<(), EmailError> {
        self.session
            .store(range.to_string(), "+FLAGS (\\Deleted)")
            .map(|_| ())
            .map_err(|e| EmailError::Imap(e.to_string()))
    }

    fn expunge(&mut self) -> Result<(), EmailError> {
        self.session
            .expunge()
            .map(|_| ())
            .map_err(|e| EmailError::Imap(e.to_string()))
    }

    fn close(&mut self) -> Result<(), EmailError> {
        self.session.close().map_err(|e| EmailError::Imap(e.to_string()))
    }

    fn logout(&mut self) -> Result<(), EmailError> {
        self.session.logout().map_err(|e| EmailError::Imap(e.to_string()))
    }
}

/// Select `mailbox` and list every message in it.
///
/// Failures are logged and returned; callers must not fetch or delete on an
/// error.
pub fn select_all<C: MailboxClient + ?Sized>(
    client: &mut C,
    mailbox: &str,
    logger: &Logger,
) -> Result<Vec<MessageId>, EmailError> {
    if let Err(e) = client.select(mailbox) {
        logger.error(&e.to_string());
        return Err(e);
    }

    let ids = client.search_all().map_err(|e| {
        let err = EmailError::MailboxNotFound {
            mailbox: mailbox.to_string(),
            reason: format!("search failed: {}", e),
        };
        logger.error(&err.to_string());
        err
    })?;

    logger.info(&format!("Mailbox '{}' holds {} message(s)", mailbox, ids.len()));
    Ok(ids)
}

#[cfg(test)]
pub(crate) mod fake {
    use std::collections::BTreeMap;

    use super::*;

    /// In-memory stand-in for an IMAP server, recording every call.
    #[derive(Debug, Default)]
    pub struct FakeMailbox {
        pub mailboxes: BTreeMap<String, BTreeMap<u32, Vec<u8>>>,
        pub selected: Option<String>,
        pub stored: Vec<SeqRange>,
        pub fail_store_at: Option<usize>,
        pub fail_fetch: Vec<u32>,
        pub expunged: usize,
        pub closed: bool,
        pub logged_out: bool,
        pub calls: Vec<String>,
    }

    impl FakeMailbox {
        pub fn with_messages(mailbox: &str, messages: Vec<Vec<u8>>) -> Self {
            let mut fake = FakeMailbox::default();
            let entries = messages
                .into_iter()
                .enumerate()
                .map(|(i, raw)| (i as u32 + 1, raw))
                .collect();
            fake.mailboxes.insert(mailbox.to_string(), entries);
            fake.selected = Some(mailbox.to_string());
            fake
        }

        fn current(&self) -> Result<&BTreeMap<u32, Vec<u8>>, EmailError> {
            self.selected
                .as_ref()
                .and_then(|name| self.mailboxes.get(name))
                .ok_or_else(|| EmailError::Imap("no mailbox selected".to_string()))
        }
    }

    impl MailboxClient for FakeMailbox {
        fn select(&mut self, mailbox: &str) -> Result<(), EmailError> {
            self.calls.push(format!("SELECT {}", mailbox));
            if self.mailboxes.contains_key(mailbox) {
                self.selected = Some(mailbox.to_string());
                Ok(())
            } else {
                Err(EmailError::MailboxNotFound {
                    mailbox: mailbox.to_string(),
                    reason: "NO Mailbox doesn't exist".to_string(),
                })
            }
        }

        fn search_all(&mut self) -> Result<Vec<MessageId>, EmailError> {
            self.calls.push("SEARCH ALL".to_string());
            Ok(self.current()?.keys().copied().map(MessageId).collect())
        }

        fn fetch_raw(&mut self, id: MessageId) -> Result<Vec<u8>, EmailError> {
            self.calls.push(format!("FETCH {}", id));
            if self.fail_fetch.contains(&id.0) {
                return Err(EmailError::Imap(format!("BAD fetch {}", id)));
            }
            self.current()?
                .get(&id.0)
                .cloned()
                .ok_or_else(|| EmailError::Imap(format!("no message {}", id)))
        }

        fn mark_deleted(&mut self, range: SeqRange) -> Result<(), EmailError> {
            self.calls.push(format!("STORE {}", range));
            if self.fail_store_at == Some(self.stored.len()) {
                return Err(EmailError::Imap("connection reset".to_string()));
            }
            self.stored.push(range);
            Ok(())
        }

        fn expunge(&mut self) -> Result<(), EmailError> {
            self.calls.push("EXPUNGE".to_string());
            let stored = self.stored.clone();
            if let Some(name) = self.selected.clone() {
                if let Some(messages) = self.mailboxes.get_mut(&name) {
                    let before = messages.len();
                    messages.retain(|id, _| !stored.iter().any(|r| r.contains(MessageId(*id))));
                    self.expunged += before - messages.len();
                }
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), EmailError> {
            self.calls.push("CLOSE".to_string());
            self.closed = true;
            Ok(())
        }

        fn logout(&mut self) -> Result<(), EmailError> {
            self.calls.push("LOGOUT".to_string());
            self.logged_out = true;
            Ok(())
        }
    }
}

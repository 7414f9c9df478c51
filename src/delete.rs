use crate::email::{EmailError, MessageId, SeqRange};
use crate::logging::Logger;
use crate::mailbox::{select_all, MailboxClient};

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Ranges flagged for a mailbox holding `ids` (ascending).
///
/// Every start index that still has a full batch ahead of it flags
/// `ids[i]..=ids[i] + batch_size`. One more range then runs from the last
/// start index visited to the final id, which sweeps up the remainder. The
/// ranges overlap by one id and the sweep may repeat the last full batch.
pub fn plan_ranges(ids: &[MessageId], batch_size: usize) -> Vec<SeqRange> {
    let Some(&last) = ids.last() else {
        return Vec::new();
    };
    if batch_size == 0 {
        return Vec::new();
    }

    let step = u32::try_from(batch_size).unwrap_or(u32::MAX);
    let mut ranges = Vec::new();
    let mut last_start = 0;
    for start in (0..ids.len()).step_by(batch_size) {
        last_start = start;
        if ids.len() - start >= batch_size {
            let first = ids[start];
            ranges.push(SeqRange::new(first, MessageId(first.0.saturating_add(step))));
        }
    }
    ranges.push(SeqRange::new(ids[last_start], last));
    ranges
}

/// Flags every message of a mailbox as deleted in batches, then expunges.
pub struct BatchDeleter {
    logger: Logger,
    batch_size: usize,
}

impl BatchDeleter {
    pub fn new(logger: Logger, batch_size: usize) -> Self {
        Self { logger, batch_size }
    }

    /// Mark and expunge everything in `mailbox`.
    ///
    /// Outcomes are logged, not returned. Expunge and close run whenever the
    /// mailbox was selected, and logout always runs, whether or not marking
    /// went through.
    pub fn delete_all<C: MailboxClient + ?Sized>(&self, client: &mut C, mailbox: &str) {
        let selected = match select_all(client, mailbox, &self.logger) {
            Ok(ids) => {
                if let Err(e) = self.mark(client, &ids) {
                    self.logger.error(&format!("Deleting from '{}' stopped: {}", mailbox, e));
                }
                true
            }
            Err(_) => false,
        };

        if selected {
            match client.expunge() {
                Ok(()) => self.logger.info(&format!("Expunged '{}'", mailbox)),
                Err(e) => self.logger.error(&format!("Expunge failed: {}", e)),
            }
            if let Err(e) = client.close() {
                self.logger.error(&format!("Close failed: {}", e));
            }
        }

        if let Err(e) = client.logout() {
            self.logger.error(&format!("Logout failed: {}", e));
        }
    }

    fn mark<C: MailboxClient + ?Sized>(&self, client: &mut C, ids: &[MessageId]) -> Result<(), EmailError> {
        if ids.is_empty() {
            self.logger.info("Nothing to delete");
            return Ok(());
        }
        if self.batch_size == 0 {
            return Err(EmailError::Imap("batch size must be at least 1".to_string()));
        }

        for range in plan_ranges(ids, self.batch_size) {
            client.mark_deleted(range)?;
            self.logger.info(&format!("Messages {} flagged as deleted", range));
        }
        Ok(())
    }
}

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use mail_parser::{MessagePart, MimeHeaders, PartType};

use crate::email::{EmailError, InboundMessage, MessageId};
use crate::logging::Logger;
use crate::mailbox::MailboxClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchOrder {
    /// Mailbox order, lowest id first.
    Ascending,
    /// Highest id first.
    #[default]
    LatestFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimit {
    All,
    Count(usize),
}

impl FetchLimit {
    /// Any negative count means no limit.
    pub fn from_count(count: i64) -> Self {
        if count < 0 {
            FetchLimit::All
        } else {
            FetchLimit::Count(usize::try_from(count).unwrap_or(usize::MAX))
        }
    }

    fn take(self, available: usize) -> usize {
        match self {
            FetchLimit::All => available,
            FetchLimit::Count(n) => n.min(available),
        }
    }
}

impl Default for FetchLimit {
    fn default() -> Self {
        FetchLimit::Count(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub order: FetchOrder,
    pub limit: FetchLimit,
    /// Keep the raw message bytes on each result.
    pub include_raw: bool,
    /// Where attachments are written. `None` records names only.
    pub save_dir: Option<PathBuf>,
}

/// What a single MIME part contributes to an [`InboundMessage`].
#[derive(Debug, PartialEq, Eq)]
pub enum PartKind<'a> {
    Plain(&'a str),
    Html(&'a str),
    Attachment { filename: &'a str, data: &'a [u8] },
    Unknown,
}

/// Decide once what a part is. Parts carrying a file name are attachments
/// whatever their content type; containers are `Unknown`.
pub fn classify<'a>(part: &'a MessagePart<'a>) -> PartKind<'a> {
    if matches!(part.body, PartType::Multipart(_)) {
        return PartKind::Unknown;
    }

    if let Some(filename) = part.attachment_name() {
        return PartKind::Attachment {
            filename,
            data: part_bytes(part),
        };
    }

    match &part.body {
        PartType::Html(html) => PartKind::Html(html.as_ref()),
        PartType::Text(text) if is_plain_text(part) => PartKind::Plain(text.as_ref()),
        _ => PartKind::Unknown,
    }
}

fn is_plain_text(part: &MessagePart<'_>) -> bool {
    match part.content_type() {
        None => true,
        Some(ct) => {
            ct.ctype().eq_ignore_ascii_case("text")
                && ct.subtype().map_or(true, |s| s.eq_ignore_ascii_case("plain"))
        }
    }
}

fn part_bytes<'a>(part: &'a MessagePart<'a>) -> &'a [u8] {
    match &part.body {
        PartType::Text(text) => text.as_bytes(),
        PartType::Html(html) => html.as_bytes(),
        PartType::Binary(binary) => binary.as_ref(),
        PartType::InlineBinary(binary) => binary.as_ref(),
        PartType::Message(nested) => nested.raw_message(),
        PartType::Multipart(_) => &[],
    }
}

/// Fetches messages by id and decodes them.
pub struct MessageFetcher {
    logger: Logger,
    options: FetchOptions,
}

impl MessageFetcher {
    pub fn new(logger: Logger, options: FetchOptions) -> Self {
        Self { logger, options }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetch up to the configured limit, in the configured order.
    ///
    /// A message that cannot be fetched or parsed is logged and skipped; the
    /// messages already decoded are kept and the loop moves on.
    pub fn fetch_all<C: MailboxClient + ?Sized>(&self, client: &mut C, ids: &[MessageId]) -> Vec<InboundMessage> {
        let mut ordered = ids.to_vec();
        if self.options.order == FetchOrder::LatestFirst {
            ordered.reverse();
        }
        let total = self.options.limit.take(ordered.len());

        let save_dir = self.prepare_save_dir();

        let mut messages = Vec::with_capacity(total);
        for (index, id) in ordered.into_iter().take(total).enumerate() {
            let raw = match client.fetch_raw(id) {
                Ok(raw) => raw,
                Err(e) => {
                    self.logger.error(&format!("Cannot fetch message {}: {}", id, e));
                    continue;
                }
            };

            match parse_message(id, &raw, save_dir.as_deref(), &self.logger) {
                Ok(message) => {
                    self.logger.info(&format!("Fetched {}/{} (id {})", index + 1, total, id));
                    let message = if self.options.include_raw {
                        message.with_raw(raw)
                    } else {
                        message
                    };
                    messages.push(message);
                }
                Err(e) => {
                    self.logger.error(&format!("Skipping message {}: {}", id, e));
                }
            }
        }

        messages
    }

    fn prepare_save_dir(&self) -> Option<PathBuf> {
        let dir = self.options.save_dir.as_ref()?;
        match fs::create_dir_all(dir) {
            Ok(()) => Some(dir.clone()),
            Err(e) => {
                self.logger.warn(&format!(
                    "Cannot create attachment directory {}: {}; attachments will not be saved",
                    dir.display(),
                    e
                ));
                None
            }
        }
    }
}

/// Decode one raw message. Attachments are written below `save_dir` when
/// given; a failed write is logged and the name is still recorded.
pub fn parse_message(
    id: MessageId,
    raw: &[u8],
    save_dir: Option<&Path>,
    logger: &Logger,
) -> Result<InboundMessage, EmailError> {
    let parsed = mail_parser::Message::parse(raw)
        .ok_or_else(|| EmailError::PartDecode(format!("message {} is not valid RFC 5322", id)))?;

    let mut message = InboundMessage::new(id);
    message.from = raw_header(&parsed, "From");
    message.to = raw_header(&parsed, "To");
    message.cc = raw_header(&parsed, "Cc");
    message.bcc = raw_header(&parsed, "Bcc");
    message.date = raw_header(&parsed, "Date");
    message.subject = parsed.subject().map(str::to_string);

    let Some(root) = parsed.parts.first() else {
        return Ok(message);
    };

    if !matches!(root.body, PartType::Multipart(_)) {
        message.body_text = match &root.body {
            PartType::Text(text) => text.to_string(),
            PartType::Html(html) => html.to_string(),
            PartType::Binary(data) | PartType::InlineBinary(data) => String::from_utf8_lossy(data).into_owned(),
            _ => String::new(),
        };
        return Ok(message);
    }

    for part in &parsed.parts {
        match classify(part) {
            PartKind::Plain(text) => message.body_text.push_str(text),
            PartKind::Html(html) => message.body_html.push_str(html),
            PartKind::Attachment { filename, data } => {
                message.attachments.push(filename.to_string());
                if let Some(dir) = save_dir {
                    match save_attachment(dir, filename, data) {
                        Ok(path) => logger.info(&format!("Saved attachment {}", path.display())),
                        Err(e) => logger.warn(&format!("Cannot save attachment {}: {}", filename, e)),
                    }
                }
            }
            PartKind::Unknown => {}
        }
    }

    Ok(message)
}

/// Header text as sent, unfolded. Repeated headers are joined with ", ".
fn raw_header(parsed: &mail_parser::Message<'_>, name: &str) -> Option<String> {
    let values: Vec<String> = parsed
        .headers_raw()
        .filter(|(header, _)| header.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.replace("\r\n", "").replace('\n', "").trim().to_string())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.join(", "))
    }
}

/// Strip any directory components a sender put in an attachment name.
fn safe_file_name(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if name.is_empty() || name == "." || name == ".." {
        "attachment".to_string()
    } else {
        name.to_string()
    }
}

fn numbered(filename: &str, n: usize) -> String {
    if n == 0 {
        return filename.to_string();
    }
    let path = Path::new(filename);
    let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}-{}", stem, n),
    }
}

/// First path of `name.ext`, `name-1.ext`, `name-2.ext`, ... inside `dir`
/// that does not exist yet.
pub fn unique_path(dir: &Path, filename: &str) -> PathBuf {
    let filename = safe_file_name(filename);
    let mut n = 0;
    loop {
        let candidate = dir.join(numbered(&filename, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Write `data` under `dir` without ever replacing an existing file.
pub fn save_attachment(dir: &Path, filename: &str, data: &[u8]) -> io::Result<PathBuf> {
    let filename = safe_file_name(filename);
    let mut n = 0;
    loop {
        let candidate = dir.join(numbered(&filename, n));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(mut file) => {
                file.write_all(data)?;
                return Ok(candidate);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e),
        }
    }
}

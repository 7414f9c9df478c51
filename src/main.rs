use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mailbag::{Config, MailClient, OutboundMessage, Verbosity};

/// Send, fetch and purge mail over SMTP and IMAP
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Path to config file
    #[clap(short, long, default_value = "~/.config/mailbag/config.json")]
    config: String,

    /// Account password or app password
    #[clap(long, env = "MAILBAG_PASSWORD", hide_env_values = true)]
    password: String,

    /// Verbosity from 0 (critical only) to 3 (info)
    #[clap(short, long)]
    verbosity: Option<u8>,

    /// Enable debug logging
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a message
    Send {
        /// Sender address, also used to log in
        #[clap(short, long)]
        from: String,

        /// Recipient address (repeatable)
        #[clap(short, long, required = true)]
        to: Vec<String>,

        #[clap(long)]
        cc: Vec<String>,

        #[clap(long)]
        bcc: Vec<String>,

        #[clap(short, long)]
        subject: Option<String>,

        /// Plain text body
        #[clap(short, long)]
        body: Option<String>,

        /// HTML alternative body
        #[clap(long)]
        html: Option<String>,

        /// File to attach (repeatable)
        #[clap(short, long)]
        attach: Vec<PathBuf>,

        /// Leave the To header out
        #[clap(long)]
        hide_recipients: bool,

        /// Use STARTTLS on the submission port instead of implicit TLS
        #[clap(long)]
        starttls: bool,
    },

    /// Fetch messages from a mailbox
    Receive {
        #[clap(short, long)]
        username: String,

        #[clap(short, long)]
        mailbox: Option<String>,

        /// Number of messages, -1 for all
        #[clap(short = 'n', long, allow_hyphen_values = true)]
        count: Option<i64>,

        /// Oldest messages first
        #[clap(long)]
        oldest_first: bool,

        /// Directory for attachments
        #[clap(long)]
        save_to: Option<PathBuf>,
    },

    /// Delete every message in a mailbox
    Delete {
        #[clap(short, long)]
        username: String,

        #[clap(short, long)]
        mailbox: Option<String>,

        #[clap(long)]
        batch_size: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    let config_path = shellexpand::tilde(&args.config).into_owned();
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    if let Some(level) = args.verbosity {
        let verbosity = Verbosity::from_level(level);
        config.send.verbosity = verbosity;
        config.receive.verbosity = verbosity;
        config.delete.verbosity = verbosity;
    }

    let mut client = MailClient::new();

    match args.command {
        Commands::Send {
            from,
            to,
            cc,
            bcc,
            subject,
            body,
            html,
            attach,
            hide_recipients,
            starttls,
        } => {
            let mut message = OutboundMessage::new(from);
            message.to = to.into();
            message.cc = cc.into();
            message.bcc = bcc.into();
            message.subject = subject;
            message.body_text = body;
            message.body_html = html;
            message.attachments = attach;

            let mut options = config.send;
            options.show_recipients = !hide_recipients;
            if starttls {
                options.use_implicit_tls = false;
            }

            let result = client.send_mail(&message, &args.password, &options);
            if !result.is_sent() {
                anyhow::bail!("Sending failed, see the send_mail log for details");
            }
            println!("Mail sent.");
        }
        Commands::Receive {
            username,
            mailbox,
            count,
            oldest_first,
            save_to,
        } => {
            let mut options = config.receive;
            if let Some(mailbox) = mailbox {
                options.mailbox = mailbox;
            }
            if let Some(count) = count {
                options.count = count;
            }
            if oldest_first {
                options.latest_first = false;
            }
            if let Some(dir) = save_to {
                options.attachment_save_path = Some(dir);
            }

            let messages = client.receive_mail(&username, &args.password, &options);
            for message in &messages {
                println!(
                    "[{}] {} | {} | {}",
                    message.id,
                    message.date.as_deref().unwrap_or("-"),
                    message.from.as_deref().unwrap_or("-"),
                    message.subject.as_deref().unwrap_or("(no subject)")
                );
                if !message.attachments.is_empty() {
                    println!("    attachments: {}", message.attachments.join(", "));
                }
            }
            println!("{} message(s) fetched.", messages.len());
        }
        Commands::Delete {
            username,
            mailbox,
            batch_size,
        } => {
            let mut options = config.delete;
            if let Some(mailbox) = mailbox {
                options.mailbox = mailbox;
            }
            if let Some(batch_size) = batch_size {
                options.batch_size = batch_size;
            }

            client.delete_all_inbox(&username, &args.password, &options);
        }
    }

    Ok(())
}

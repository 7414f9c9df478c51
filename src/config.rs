use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delete::DEFAULT_BATCH_SIZE;
use crate::logging::Verbosity;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    pub host: String,
    /// Overrides 465 (implicit TLS) / 587 (STARTTLS).
    pub port: Option<u16>,
    pub use_implicit_tls: bool,
    pub show_recipients: bool,
    pub verbosity: Verbosity,
    pub log_file: Option<PathBuf>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: None,
            use_implicit_tls: true,
            show_recipients: true,
            verbosity: Verbosity::Info,
            log_file: Some(PathBuf::from("send_mail.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveOptions {
    pub host: String,
    pub port: u16,
    pub mailbox: String,
    /// Number of messages to fetch; -1 fetches all of them.
    pub count: i64,
    pub latest_first: bool,
    pub include_raw_body: bool,
    pub attachment_save_path: Option<PathBuf>,
    pub verbosity: Verbosity,
    pub log_file: Option<PathBuf>,
}

impl Default for ReceiveOptions {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            mailbox: "inbox".to_string(),
            count: 1,
            latest_first: true,
            include_raw_body: false,
            attachment_save_path: Some(PathBuf::from("attachments")),
            verbosity: Verbosity::Info,
            log_file: Some(PathBuf::from("receive_mail.log")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteOptions {
    pub host: String,
    pub port: u16,
    pub mailbox: String,
    pub batch_size: usize,
    pub verbosity: Verbosity,
    pub log_file: Option<PathBuf>,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        Self {
            host: "imap.gmail.com".to_string(),
            port: 993,
            mailbox: "inbox".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            verbosity: Verbosity::Info,
            log_file: Some(PathBuf::from("delete_mail.log")),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub send: SendOptions,
    pub receive: ReceiveOptions,
    pub delete: DeleteOptions,
}

impl Config {
    /// Read a JSON config. A missing file yields the defaults; sections or
    /// fields left out of the file take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Config::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_error)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.send.host, "smtp.gmail.com");
        assert!(config.send.use_implicit_tls);
        assert_eq!(config.receive.count, 1);
        assert_eq!(config.receive.mailbox, "inbox");
        assert_eq!(config.delete.batch_size, 100);
        assert_eq!(config.delete.log_file, Some(PathBuf::from("delete_mail.log")));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.receive.host, "imap.gmail.com");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.receive.count = -1;
        config.delete.batch_size = 50;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.receive.count, -1);
        assert_eq!(loaded.delete.batch_size, 50);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "send": { "host": "smtp.example.com" } }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.send.host, "smtp.example.com");
        assert!(config.send.show_recipients);
        assert_eq!(config.receive.port, 993);
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}

use std::collections::HashMap;
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// How much a logger lets through. Lower values are more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Verbosity {
    Critical = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
}

impl Verbosity {
    /// Map the 0..=3 scale onto a verbosity. Anything above 3 is Info.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Critical,
            1 => Verbosity::Error,
            2 => Verbosity::Warning,
            _ => Verbosity::Info,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    fn log_level(self) -> log::Level {
        match self {
            Verbosity::Critical | Verbosity::Error => log::Level::Error,
            Verbosity::Warning => log::Level::Warn,
            Verbosity::Info => log::Level::Info,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Verbosity::Critical => "CRITICAL",
            Verbosity::Error => "ERROR",
            Verbosity::Warning => "WARNING",
            Verbosity::Info => "INFO",
        }
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Info
    }
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

type Sink = Arc<Mutex<Box<dyn Write + Send>>>;

/// A named log sink.
///
/// Every record goes to the `log` facade under the logger's name as target
/// (the console, once the binary installs `env_logger`). When a file or
/// writer is attached, records are also appended there with a timestamp.
#[derive(Clone)]
pub struct Logger {
    name: String,
    verbosity: Verbosity,
    sink: Option<Sink>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("verbosity", &self.verbosity)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Logger {
    pub fn new(name: &str, verbosity: Verbosity) -> Self {
        Self {
            name: name.to_string(),
            verbosity,
            sink: None,
        }
    }

    /// Append records to `path`, creating the file if needed.
    pub fn with_file(self, path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(self.with_writer(file))
    }

    pub fn with_writer<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.sink = Some(Arc::new(Mutex::new(Box::new(writer))));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    pub fn enabled(&self, severity: Verbosity) -> bool {
        severity <= self.verbosity
    }

    pub fn info(&self, message: &str) {
        self.emit(Verbosity::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Verbosity::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Verbosity::Error, message);
    }

    pub fn critical(&self, message: &str) {
        self.emit(Verbosity::Critical, message);
    }

    fn emit(&self, severity: Verbosity, message: &str) {
        if !self.enabled(severity) {
            return;
        }

        if severity == Verbosity::Critical {
            log::log!(target: self.name.as_str(), severity.log_level(), "CRITICAL: {}", message);
        } else {
            log::log!(target: self.name.as_str(), severity.log_level(), "{}", message);
        }

        if let Some(sink) = &self.sink {
            if let Ok(mut writer) = sink.lock() {
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(writer, "[{}] {} {}: {}", timestamp, severity, self.name, message);
                let _ = writer.flush();
            }
        }
    }
}

/// Loggers by name. Registering a name twice hands back the first logger, so
/// sinks are never duplicated.
///
/// Registration takes `&mut self`; share a registry across threads only behind
/// your own lock.
#[derive(Debug, Default)]
pub struct LoggerRegistry {
    loggers: HashMap<String, Logger>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the logger called `name`, creating it on first use with the given
    /// verbosity and optional log file. A log file that cannot be opened leaves
    /// the logger console-only.
    pub fn register(&mut self, name: &str, verbosity: Verbosity, log_file: Option<&Path>) -> Logger {
        if let Some(existing) = self.loggers.get(name) {
            return existing.clone();
        }

        let logger = Logger::new(name, verbosity);
        let logger = match log_file {
            Some(path) => match logger.clone().with_file(path) {
                Ok(with_file) => with_file,
                Err(e) => {
                    log::warn!("Could not open log file {}: {}", path.display(), e);
                    logger
                }
            },
            None => logger,
        };

        self.loggers.insert(name.to_string(), logger.clone());
        logger
    }

    /// Register a prepared logger unless one with the same name exists.
    pub fn insert(&mut self, logger: Logger) -> Logger {
        self.loggers
            .entry(logger.name.clone())
            .or_insert(logger)
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<&Logger> {
        self.loggers.get(name)
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}

/// In-memory writer for capturing what a logger wrote.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        match self.buffer.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => String::new(),
        }
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.buffer.lock() {
            Ok(mut buffer) => {
                buffer.extend_from_slice(buf);
                Ok(buf.len())
            }
            Err(_) => Err(io::Error::new(io::ErrorKind::Other, "log buffer poisoned")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

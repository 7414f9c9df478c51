pub mod client;
pub mod compose;
pub mod config;
pub mod delete;
pub mod email;
pub mod fetch;
pub mod logging;
pub mod mailbox;
pub mod transport;

// Re-export commonly used types
pub use client::MailClient;
pub use config::{Config, DeleteOptions, ReceiveOptions, SendOptions};
pub use email::{DeliveryEnvelope, EmailError, InboundMessage, MessageId, OutboundMessage, Recipients};
pub use logging::{Logger, LoggerRegistry, Verbosity};
pub use transport::SendResult;

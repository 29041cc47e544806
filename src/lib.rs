//! Telegram Batch Sender Library
//!
//! This library provides tools to:
//! - Sign in to a Telegram account and list its conversations
//! - Pick a conversation and a message file interactively
//! - Send every line of the file as a separate message, with bounded
//!   retries, provider rate-limit compliance and pacing
//! - Expose Prometheus metrics about the run

pub mod config;
pub mod conversations;
pub mod dispatch;
pub mod error;
pub mod messages;
pub mod metrics;
pub mod prompt;
pub mod session;
pub mod telegram;
pub mod transport;

// Re-export common types
pub use config::{Config, SendingConfig};
pub use conversations::{Conversation, ConversationKind};
pub use dispatch::{DispatchSummary, Dispatcher, RetryPolicy, SendOutcome};
pub use error::{Error, Result};
pub use messages::MessageBatch;
pub use prompt::{StdTerminal, Terminal};
pub use session::{SessionLock, TelegramClient};
pub use telegram::TelegramTransport;
pub use transport::{SendError, Transport};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;

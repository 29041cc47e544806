//! Messaging transport abstraction
//!
//! The dispatch loop and the conversation lister only talk to this trait, so
//! they can be driven by the grammers client in production and by scripted
//! stubs in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::conversations::Conversation;
use crate::error::Result;

/// Failure of a single `send_message` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Provider asked us to wait before the next request.
    #[error("rate limited for {seconds}s")]
    RateLimited { seconds: u64 },

    /// The server answered with an RPC error.
    #[error("remote error {code} {name}")]
    Remote { code: i32, name: String },

    /// Network, I/O or protocol failure below the RPC layer.
    #[error("transport error: {0}")]
    Transport(String),

    /// The conversation has no entity the client can address.
    #[error("conversation {0} cannot be resolved")]
    Unresolved(i64),
}

/// Operations the sender needs from a messaging client.
#[async_trait]
pub trait Transport: Send {
    /// (Re)establish the connection.
    async fn connect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    async fn disconnect(&mut self);

    /// Fetch every dialog of the account, resolvable or not.
    async fn get_dialogs(&mut self) -> Result<Vec<Conversation>>;

    async fn send_message(
        &mut self,
        conversation: &Conversation,
        text: &str,
    ) -> std::result::Result<(), SendError>;
}

//! grammers-backed [`Transport`] implementation

use std::collections::HashMap;

use async_trait::async_trait;
use grammers_client::types::peer::Peer;
use grammers_client::types::Dialog;
use grammers_client::InvocationError;
use grammers_tl_types as tl;
use tracing::{debug, info};

use crate::conversations::{display_name, Conversation, ConversationKind};
use crate::error::Result;
use crate::session::TelegramClient;
use crate::transport::{SendError, Transport};

/// Used when a flood error carries no usable wait value.
const FALLBACK_FLOOD_WAIT_SECS: u64 = 30;

/// Transport over a connected grammers client.
///
/// `get_dialogs` remembers the peer behind every conversation so that
/// `send_message` can address it later.
pub struct TelegramTransport {
    client: TelegramClient,
    peers: HashMap<(ConversationKind, i64), Peer>,
}

impl TelegramTransport {
    pub fn new(client: TelegramClient) -> Self {
        Self {
            client,
            peers: HashMap::new(),
        }
    }

    pub fn client(&self) -> &TelegramClient {
        &self.client
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn connect(&mut self) -> Result<()> {
        self.client.reconnect().await
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn disconnect(&mut self) {
        self.client.disconnect();
    }

    async fn get_dialogs(&mut self) -> Result<Vec<Conversation>> {
        self.peers.clear();
        let mut conversations = Vec::new();
        let mut dialogs = self.client.iter_dialogs();

        while let Some(dialog) = dialogs.next().await? {
            let conversation = conversation_from_dialog(&dialog);
            if conversation.resolved {
                self.peers
                    .insert((conversation.kind, conversation.id), dialog.peer.clone());
            }
            conversations.push(conversation);
        }

        debug!(count = conversations.len(), "Dialogs fetched");
        Ok(conversations)
    }

    async fn send_message(
        &mut self,
        conversation: &Conversation,
        text: &str,
    ) -> std::result::Result<(), SendError> {
        let peer = self
            .peers
            .get(&(conversation.kind, conversation.id))
            .ok_or(SendError::Unresolved(conversation.id))?;

        match self.client.send_message(peer, text).await {
            Ok(_) => {
                debug!(conversation = conversation.id, "Message sent");
                Ok(())
            }
            Err(err) => Err(classify_invocation_error(&err)),
        }
    }
}

fn conversation_from_dialog(dialog: &Dialog) -> Conversation {
    let peer = &dialog.peer;
    let id = peer_id(peer);

    let (kind, name, resolved) = match peer {
        Peer::Channel(c) => (
            ConversationKind::Channel,
            display_name(id, Some(c.title()), None, None),
            true,
        ),
        Peer::Group(g) => {
            let resolved = matches!(
                &g.raw,
                tl::enums::Chat::Chat(_) | tl::enums::Chat::Channel(_)
            );
            (
                ConversationKind::Group,
                display_name(id, g.title(), None, None),
                resolved,
            )
        }
        Peer::User(u) => match &u.raw {
            tl::enums::User::User(user) => (
                ConversationKind::Person,
                display_name(
                    id,
                    None,
                    Some(user.first_name.as_deref().unwrap_or_default()),
                    user.last_name.as_deref(),
                ),
                !user.deleted,
            ),
            tl::enums::User::Empty(_) => (ConversationKind::Person, format!("User {}", id), false),
        },
    };

    Conversation {
        id,
        name,
        kind,
        unread: extract_unread_count(dialog),
        resolved,
    }
}

fn peer_id(peer: &Peer) -> i64 {
    match peer {
        Peer::Channel(c) => c.raw.id,
        Peer::Group(g) => match &g.raw {
            tl::enums::Chat::Empty(c) => c.id,
            tl::enums::Chat::Chat(c) => c.id,
            tl::enums::Chat::Forbidden(c) => c.id,
            tl::enums::Chat::Channel(c) => c.id,
            tl::enums::Chat::ChannelForbidden(c) => c.id,
        },
        Peer::User(u) => u.raw.id(),
    }
}

fn extract_unread_count(dialog: &Dialog) -> i32 {
    match &dialog.raw {
        tl::enums::Dialog::Dialog(d) => d.unread_count,
        tl::enums::Dialog::Folder(folder) => {
            folder.unread_muted_messages_count + folder.unread_unmuted_messages_count
        }
    }
}

/// Map a grammers invocation error onto the transport taxonomy.
pub fn classify_invocation_error(err: &InvocationError) -> SendError {
    match err {
        InvocationError::Rpc(rpc) => {
            match rate_limit_seconds(&rpc.name, rpc.value, &err.to_string()) {
                Some(seconds) => {
                    info!(name = %rpc.name, seconds, "Provider rate limit");
                    SendError::RateLimited { seconds }
                }
                None => SendError::Remote {
                    code: rpc.code,
                    name: rpc.name.clone(),
                },
            }
        }
        other => SendError::Transport(other.to_string()),
    }
}

/// Wait in seconds when `name` is a flood/slow-mode error, `None` otherwise.
fn rate_limit_seconds(name: &str, value: Option<u32>, rendered: &str) -> Option<u64> {
    if !(name.starts_with("FLOOD") || name.starts_with("SLOWMODE_WAIT")) {
        return None;
    }
    Some(
        value
            .map(u64::from)
            .or_else(|| parse_flood_wait_seconds(rendered))
            .unwrap_or(FALLBACK_FLOOD_WAIT_SECS),
    )
}

/// Extract flood wait seconds from an error string (best-effort)
fn parse_flood_wait_seconds(error: &str) -> Option<u64> {
    if let Some(idx) = error.find("FLOOD_WAIT_") {
        let start = idx + "FLOOD_WAIT_".len();
        let secs = error[start..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>();
        if let Ok(v) = secs.parse::<u64>() {
            return Some(v);
        }
    }

    if let Some(idx) = error.find("value:") {
        let start = idx + "value:".len();
        let secs = error[start..]
            .trim_start()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect::<String>();
        if let Ok(v) = secs.parse::<u64>() {
            return Some(v);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flood_wait_suffix() {
        assert_eq!(parse_flood_wait_seconds("rpc error 420: FLOOD_WAIT_35"), Some(35));
    }

    #[test]
    fn parses_value_field() {
        assert_eq!(parse_flood_wait_seconds("name: FLOOD_WAIT, value: 12"), Some(12));
    }

    #[test]
    fn non_flood_text_has_no_wait() {
        assert_eq!(parse_flood_wait_seconds("CHAT_WRITE_FORBIDDEN"), None);
    }

    #[test]
    fn rate_limit_prefers_structured_value() {
        assert_eq!(rate_limit_seconds("FLOOD_WAIT", Some(40), "FLOOD_WAIT_5"), Some(40));
        assert_eq!(rate_limit_seconds("SLOWMODE_WAIT", Some(10), ""), Some(10));
        assert_eq!(rate_limit_seconds("FLOOD_PREMIUM_WAIT", None, "FLOOD_WAIT_7"), Some(7));
    }

    #[test]
    fn rate_limit_without_value_uses_fallback() {
        assert_eq!(
            rate_limit_seconds("FLOOD_WAIT", None, "flood"),
            Some(FALLBACK_FLOOD_WAIT_SECS)
        );
    }

    #[test]
    fn other_rpc_errors_are_not_rate_limits() {
        assert_eq!(rate_limit_seconds("PEER_ID_INVALID", Some(3), "PEER_ID_INVALID"), None);
        assert_eq!(rate_limit_seconds("INTERNAL", None, ""), None);
    }
}

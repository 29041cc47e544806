//! Conversation snapshot and listing

use std::fmt;

use tracing::{error, info};

use crate::transport::Transport;

/// Kind of dialog as shown in the menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversationKind {
    Person,
    Channel,
    Group,
    Other,
}

impl ConversationKind {
    pub fn glyph(&self) -> &'static str {
        match self {
            ConversationKind::Person => "👤",
            ConversationKind::Channel => "📢",
            ConversationKind::Group => "👥",
            ConversationKind::Other => "💬",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConversationKind::Person => "person",
            ConversationKind::Channel => "channel",
            ConversationKind::Group => "group",
            ConversationKind::Other => "other",
        };
        f.write_str(label)
    }
}

/// One dialog of the account, fetched once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: i64,
    pub name: String,
    pub kind: ConversationKind,
    pub unread: i32,
    /// The underlying entity can be addressed by `send_message`.
    pub resolved: bool,
}

impl Conversation {
    pub fn new(id: i64, name: impl Into<String>, kind: ConversationKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            unread: 0,
            resolved: true,
        }
    }

    pub fn with_unread(mut self, unread: i32) -> Self {
        self.unread = unread;
        self
    }

    pub fn unresolved(mut self) -> Self {
        self.resolved = false;
        self
    }

    /// Menu glyph; unresolved entries get a question mark.
    pub fn glyph(&self) -> &'static str {
        if self.resolved {
            self.kind.glyph()
        } else {
            "❓"
        }
    }
}

/// Derive a display name: title first, then first/last name, then a generic label.
pub fn display_name(
    id: i64,
    title: Option<&str>,
    first_name: Option<&str>,
    last_name: Option<&str>,
) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }

    if first_name.is_some() || last_name.is_some() {
        let full = format!(
            "{} {}",
            first_name.unwrap_or_default(),
            last_name.unwrap_or_default()
        );
        let full = full.trim();
        return if full.is_empty() {
            format!("User {}", id)
        } else {
            full.to_string()
        };
    }

    format!("Chat {}", id)
}

/// Fetch the conversation list, keeping only resolvable entries.
///
/// Remote failures are logged and turned into an empty list; the caller
/// treats that as "no conversations".
pub async fn list_conversations<T: Transport + ?Sized>(transport: &mut T) -> Vec<Conversation> {
    match transport.get_dialogs().await {
        Ok(dialogs) => {
            let total = dialogs.len();
            let valid: Vec<Conversation> = dialogs.into_iter().filter(|c| c.resolved).collect();
            info!(total, valid = valid.len(), "Fetched dialogs");
            valid
        }
        Err(err) => {
            error!("Failed to fetch dialogs: {}", err);
            println!("❌ Ошибка получения чатов: {}", err);
            Vec::new()
        }
    }
}

/// Format one menu line, numbered from 1.
pub fn menu_line(index: usize, conversation: &Conversation) -> String {
    let unread = if conversation.unread > 0 {
        format!(" ({} непрочитанных)", conversation.unread)
    } else {
        String::new()
    };
    format!(
        "{:3}. {} {}{}",
        index,
        conversation.glyph(),
        conversation.name,
        unread
    )
}

/// Print the numbered conversation menu.
pub fn render_menu(conversations: &[Conversation]) {
    println!("\n{}", "=".repeat(60));
    println!("📋 СПИСОК ВАШИХ ЧАТОВ:");
    println!("{}", "=".repeat(60));
    for (i, conversation) in conversations.iter().enumerate() {
        println!("{}", menu_line(i + 1, conversation));
    }
    println!("{}", "=".repeat(60));
}

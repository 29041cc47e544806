//! Send messages from a file to a chosen chat
//!
//! Отправка сообщений из файла в выбранный чат

use chrono::Local;
use tracing::info;

use crate::config::SendingConfig;
use crate::conversations::{list_conversations, render_menu};
use crate::dispatch::{DispatchSummary, Dispatcher};
use crate::error::{Error, Result};
use crate::messages::{print_preview, read_messages};
use crate::prompt::{confirm_sending, select_conversation, select_file_path, Terminal};
use crate::transport::Transport;

/// How an interactive run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The account has no usable conversations (or listing failed).
    NoConversations,
    /// The chosen file had nothing to send.
    NoMessages,
    /// The user declined the confirmation.
    Cancelled,
    Completed {
        summary: DispatchSummary,
        total_lines: usize,
        blank_lines: usize,
    },
}

/// Run the whole interactive flow over an already connected transport.
pub async fn run<T, M>(
    transport: &mut T,
    terminal: &mut M,
    sending: &SendingConfig,
) -> Result<RunOutcome>
where
    T: Transport + ?Sized,
    M: Terminal + ?Sized,
{
    let conversations = list_conversations(transport).await;
    if conversations.is_empty() {
        println!("❌ Чаты не найдены или произошла ошибка при загрузке");
        return Ok(RunOutcome::NoConversations);
    }

    println!("✅ Загружено чатов: {}", conversations.len());
    render_menu(&conversations);

    let selected = select_conversation(terminal, &conversations).await?;
    let path = select_file_path(terminal).await?;

    let Some(batch) = read_messages(&path) else {
        return Ok(RunOutcome::NoMessages);
    };
    print_preview(&batch);

    if !confirm_sending(terminal, &selected, batch.len()).await? {
        return Ok(RunOutcome::Cancelled);
    }

    if !selected.resolved {
        return Err(Error::InvalidArgument(format!(
            "conversation {} cannot be used for sending",
            selected.id
        )));
    }

    let started = Local::now();
    println!("🕒 Начало отправки: {}", started.format("%d.%m.%Y %H:%M:%S"));
    info!(
        conversation = %selected.name,
        file = %path.display(),
        messages = batch.len(),
        "Sending batch"
    );

    let summary = Dispatcher::new(transport, sending.retry_policy())
        .send_all(&selected, &batch.messages)
        .await;

    summary.print(&selected.name);
    let elapsed = Local::now() - started;
    println!(
        "🕒 Завершено за {} мин {} сек",
        elapsed.num_minutes(),
        elapsed.num_seconds() % 60
    );

    Ok(RunOutcome::Completed {
        summary,
        total_lines: batch.total_lines,
        blank_lines: batch.blank_lines,
    })
}

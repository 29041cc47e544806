//! Message source file loading
//!
//! One message per line, UTF-8. Lines are trimmed and blank lines dropped;
//! order is the send order.

use std::fs;
use std::path::Path;

use tracing::{error, info};

const PREVIEW_COUNT: usize = 5;
const PREVIEW_CHARS: usize = 50;

/// Ordered, non-empty list of messages read from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageBatch {
    pub messages: Vec<String>,
    /// Lines in the source file, blank ones included.
    pub total_lines: usize,
    /// Lines dropped because they were blank after trimming.
    pub blank_lines: usize,
}

impl MessageBatch {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Split text into messages. Returns `None` when every line is blank.
pub fn parse_messages(text: &str) -> Option<MessageBatch> {
    let mut messages = Vec::new();
    let mut total_lines = 0;

    for line in split_lines(text) {
        total_lines += 1;
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            messages.push(trimmed.to_string());
        }
    }

    if messages.is_empty() {
        return None;
    }

    Some(MessageBatch {
        blank_lines: total_lines - messages.len(),
        total_lines,
        messages,
    })
}

/// Iterate over lines ended by `\n`, `\r\n` or a bare `\r`.
///
/// A terminator at the very end does not start another line.
fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let mut rest = text;
    std::iter::from_fn(move || {
        if rest.is_empty() {
            return None;
        }
        match rest.find(['\r', '\n']) {
            Some(idx) => {
                let line = &rest[..idx];
                let terminator = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
                rest = &rest[idx + terminator..];
                Some(line)
            }
            None => {
                let line = rest;
                rest = "";
                Some(line)
            }
        }
    })
}

/// Read and parse a message file.
///
/// Failures (I/O, invalid UTF-8, only blank lines) are reported and yield
/// `None`; they never abort the program.
pub fn read_messages(path: &Path) -> Option<MessageBatch> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(path = %path.display(), "Failed to read message file: {}", err);
            println!("❌ Ошибка чтения файла: {}", err);
            return None;
        }
    };

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            error!(path = %path.display(), "Message file is not valid UTF-8: {}", err);
            println!("❌ Ошибка: файл должен быть в кодировке UTF-8");
            return None;
        }
    };

    match parse_messages(&text) {
        Some(batch) => {
            info!(
                path = %path.display(),
                messages = batch.len(),
                blank = batch.blank_lines,
                "Loaded message file"
            );
            Some(batch)
        }
        None => {
            error!(path = %path.display(), "Message file has only blank lines");
            println!("❌ В файле нет сообщений (все строки пустые)");
            None
        }
    }
}

/// Shorten a message for display, counting characters rather than bytes.
pub fn preview(message: &str) -> String {
    if message.chars().count() > PREVIEW_CHARS {
        let head: String = message.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        message.to_string()
    }
}

/// Print the message count and the first few messages.
pub fn print_preview(batch: &MessageBatch) {
    println!("📨 Прочитано сообщений: {}", batch.len());
    if batch.blank_lines > 0 {
        println!("⚠️ Пропущено пустых строк: {}", batch.blank_lines);
    }
    println!("\n📋 Первые {} сообщений:", PREVIEW_COUNT);
    println!("{}", "-".repeat(40));
    for (i, message) in batch.messages.iter().take(PREVIEW_COUNT).enumerate() {
        println!("{}. {}", i + 1, preview(message));
    }
    if batch.len() > PREVIEW_COUNT {
        println!("... и еще {} сообщений", batch.len() - PREVIEW_COUNT);
    }
    println!("{}", "-".repeat(40));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file
    }

    #[test]
    fn blank_line_between_messages_is_skipped() {
        let batch = parse_messages("hello\n\nworld").unwrap();
        assert_eq!(batch.messages, vec!["hello", "world"]);
        assert_eq!(batch.blank_lines, 1);
        assert_eq!(batch.total_lines, 3);
    }

    #[test]
    fn lines_are_trimmed_and_order_kept() {
        let batch = parse_messages("  third  \r\nfirst\n\t second\t\n").unwrap();
        assert_eq!(batch.messages, vec!["third", "first", "second"]);
        assert_eq!(batch.total_lines, 3);
    }

    #[test]
    fn bare_carriage_return_ends_a_line() {
        let batch = parse_messages("hello\rworld\r").unwrap();
        assert_eq!(batch.messages, vec!["hello", "world"]);
        assert_eq!(batch.total_lines, 2);
        assert_eq!(batch.blank_lines, 0);
    }

    #[test]
    fn mixed_line_endings_count_every_line() {
        let batch = parse_messages("a\r\r\nb\n\rc").unwrap();
        assert_eq!(batch.messages, vec!["a", "b", "c"]);
        assert_eq!(batch.total_lines, 5);
        assert_eq!(batch.blank_lines, 2);
    }

    #[test]
    fn only_blank_lines_yield_none() {
        assert!(parse_messages("\n   \n\t\n").is_none());
        assert!(parse_messages("").is_none());
    }

    #[test]
    fn duplicates_are_preserved() {
        let batch = parse_messages("ping\nping\nping").unwrap();
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn read_messages_loads_utf8_file() {
        let file = file_with("привет\n\nмир 🌍\n".as_bytes());
        let batch = read_messages(file.path()).unwrap();
        assert_eq!(batch.messages, vec!["привет", "мир 🌍"]);
        assert_eq!(batch.blank_lines, 1);
    }

    #[test]
    fn read_messages_rejects_invalid_utf8() {
        let file = file_with(&[0x66, 0x6f, 0xff, 0xfe, 0x0a]);
        assert!(read_messages(file.path()).is_none());
    }

    #[test]
    fn read_messages_rejects_all_blank_file() {
        let file = file_with(b"\n \n\n");
        assert!(read_messages(file.path()).is_none());
    }

    #[test]
    fn read_messages_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_messages(&dir.path().join("nope.txt")).is_none());
    }

    #[test]
    fn preview_truncates_by_characters() {
        let long = "я".repeat(60);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}

//! Interactive prompts
//!
//! Validation is done by pure functions returning [`ValidationError`]; the
//! prompt loops only read a line, validate, print the rejection and retry.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};

use crate::conversations::Conversation;
use crate::error::{Error, Result};

const MESSAGE_FILE_EXTENSION: &str = ".txt";

/// Rejected user input; the prompt is repeated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty input")]
    Empty,
    #[error("not a number: {0}")]
    NotANumber(String),
    #[error("selection {value} out of range 1..={max}")]
    OutOfRange { value: i64, max: usize },
    #[error("conversation cannot be used for sending")]
    Unresolved,
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("file is empty: {0}")]
    EmptyFile(PathBuf),
    #[error("unrecognised answer: {0}")]
    UnknownAnswer(String),
}

impl ValidationError {
    /// Status line shown to the user before re-prompting.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::Empty => "❌ Пустой ввод, попробуйте ещё раз".to_string(),
            ValidationError::NotANumber(_) => "❌ Введите корректный номер".to_string(),
            ValidationError::OutOfRange { max, .. } => {
                format!("❌ Неверный номер. Доступно от 1 до {}", max)
            }
            ValidationError::Unresolved => "❌ Выбран невалидный чат".to_string(),
            ValidationError::FileNotFound(path) => {
                format!("❌ Файл '{}' не найден", path.display())
            }
            ValidationError::EmptyFile(path) => {
                format!("❌ Файл '{}' пустой", path.display())
            }
            ValidationError::UnknownAnswer(_) => "❌ Введите 'да' или 'нет'".to_string(),
        }
    }
}

/// Line-oriented terminal. `Ok(None)` means the input was closed.
#[async_trait]
pub trait Terminal: Send {
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;

    /// Read without echo; falls back to a plain line.
    async fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        self.read_line(prompt).await
    }
}

/// Terminal over the process stdin/stdout.
pub struct StdTerminal {
    stdin: BufReader<Stdin>,
}

impl StdTerminal {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Terminal for StdTerminal {
    async fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let mut line = String::new();
        let bytes = self.stdin.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn read_secret(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let prompt = prompt.to_string();
        tokio::task::spawn_blocking(move || read_hidden_line(&prompt))
            .await
            .map_err(io::Error::other)?
    }
}

/// Restores the cooked terminal mode when dropped.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Read a line without echo from the controlling terminal.
///
/// Raw mode turns Ctrl-C into a key press instead of SIGINT, so the
/// terminal mode is always restored before the interrupt propagates.
fn read_hidden_line(prompt: &str) -> io::Result<Option<String>> {
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", prompt)?;
    stdout.flush()?;

    let secret = {
        let _raw = RawModeGuard::enable()?;
        collect_secret(event::read)
    };
    writeln!(stdout)?;
    secret
}

/// Accumulate key presses until Enter. Ctrl-C, or Ctrl-D on an empty
/// input, closes the prompt.
fn collect_secret<F>(mut next_event: F) -> io::Result<Option<String>>
where
    F: FnMut() -> io::Result<Event>,
{
    let mut secret = String::new();
    loop {
        let Event::Key(key) = next_event()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Enter => return Ok(Some(secret.trim().to_string())),
            KeyCode::Char('c') if ctrl => return Ok(None),
            KeyCode::Char('d') if ctrl && secret.is_empty() => return Ok(None),
            KeyCode::Backspace => {
                secret.pop();
            }
            KeyCode::Char(c) if !ctrl => secret.push(c),
            _ => {}
        }
    }
}

/// Read one line; a closed input is treated as an interrupt.
async fn ask<T: Terminal + ?Sized>(terminal: &mut T, prompt: &str) -> Result<String> {
    match terminal.read_line(prompt).await? {
        Some(line) => Ok(line),
        None => Err(Error::Interrupted),
    }
}

/// Parse a 1-based menu selection into a 0-based index.
pub fn parse_selection(raw: &str, len: usize) -> std::result::Result<usize, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Empty);
    }

    let value: i64 = raw
        .parse()
        .map_err(|_| ValidationError::NotANumber(raw.to_string()))?;

    if value < 1 || value as u64 > len as u64 {
        return Err(ValidationError::OutOfRange { value, max: len });
    }

    Ok(value as usize - 1)
}

/// Pick a conversation from `list` by its index.
pub fn validate_selection(
    raw: &str,
    list: &[Conversation],
) -> std::result::Result<usize, ValidationError> {
    let index = parse_selection(raw, list.len())?;
    if !list[index].resolved {
        return Err(ValidationError::Unresolved);
    }
    Ok(index)
}

/// Trim the input and append `.txt` unless already present.
pub fn normalize_path(raw: &str) -> std::result::Result<PathBuf, ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ValidationError::Empty);
    }

    if raw.to_lowercase().ends_with(MESSAGE_FILE_EXTENSION) {
        Ok(PathBuf::from(raw))
    } else {
        Ok(PathBuf::from(format!("{}{}", raw, MESSAGE_FILE_EXTENSION)))
    }
}

/// The file must exist and be non-empty. Returns its size in bytes.
pub fn check_message_file(path: &Path) -> std::result::Result<u64, ValidationError> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Err(ValidationError::FileNotFound(path.to_path_buf())),
    };

    if metadata.len() == 0 {
        return Err(ValidationError::EmptyFile(path.to_path_buf()));
    }

    Ok(metadata.len())
}

/// Interpret a yes/no answer (Russian or English).
pub fn parse_confirmation(raw: &str) -> std::result::Result<bool, ValidationError> {
    match raw.trim().to_lowercase().as_str() {
        "да" | "д" | "yes" | "y" | "1" => Ok(true),
        "нет" | "н" | "no" | "n" | "0" => Ok(false),
        "" => Err(ValidationError::Empty),
        other => Err(ValidationError::UnknownAnswer(other.to_string())),
    }
}

/// Loop until the user picks a valid conversation.
pub async fn select_conversation<T: Terminal + ?Sized>(
    terminal: &mut T,
    list: &[Conversation],
) -> Result<Conversation> {
    if list.is_empty() {
        return Err(Error::InvalidArgument("no conversations to choose from".into()));
    }

    loop {
        let raw = ask(terminal, "\n🎯 Введите номер чата для отправки: ").await?;
        match validate_selection(&raw, list) {
            Ok(index) => {
                let selected = list[index].clone();
                println!("✅ Выбран чат: {}", selected.name);
                return Ok(selected);
            }
            Err(err) => println!("{}", err.user_message()),
        }
    }
}

/// Loop until the user names an existing, non-empty message file.
pub async fn select_file_path<T: Terminal + ?Sized>(terminal: &mut T) -> Result<PathBuf> {
    loop {
        let raw = ask(terminal, "\n📁 Введите путь к файлу .txt: ").await?;
        let checked = normalize_path(&raw)
            .and_then(|path| check_message_file(&path).map(|size| (path, size)));
        match checked {
            Ok((path, size)) => {
                println!("✅ Файл найден: {} ({} байт)", path.display(), size);
                return Ok(path);
            }
            Err(err) => println!("{}", err.user_message()),
        }
    }
}

/// Show the summary of what is about to be sent and ask for confirmation.
pub async fn confirm_sending<T: Terminal + ?Sized>(
    terminal: &mut T,
    conversation: &Conversation,
    message_count: usize,
) -> Result<bool> {
    println!("\n{}", "=".repeat(60));
    println!("🚀 ПОДТВЕРЖДЕНИЕ ОТПРАВКИ");
    println!("{}", "=".repeat(60));
    println!("💬 Чат: {}", conversation.name);
    println!("📨 Сообщений: {}", message_count);
    println!("{}", "=".repeat(60));

    loop {
        let raw = ask(terminal, "\nОтправить сообщения? (да/нет): ").await?;
        match parse_confirmation(&raw) {
            Ok(answer) => {
                if !answer {
                    println!("❌ Отправка отменена");
                }
                return Ok(answer);
            }
            Err(err) => println!("{}", err.user_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::ConversationKind;
    use crossterm::event::KeyEvent;
    use std::collections::VecDeque;

    struct ScriptedTerminal {
        lines: VecDeque<String>,
        prompts: usize,
    }

    impl ScriptedTerminal {
        fn new(lines: &[&str]) -> Self {
            Self {
                lines: lines.iter().map(|l| l.to_string()).collect(),
                prompts: 0,
            }
        }
    }

    #[async_trait]
    impl Terminal for ScriptedTerminal {
        async fn read_line(&mut self, _prompt: &str) -> io::Result<Option<String>> {
            self.prompts += 1;
            Ok(self.lines.pop_front())
        }
    }

    fn sample_list() -> Vec<Conversation> {
        vec![
            Conversation::new(10, "Alice", ConversationKind::Person),
            Conversation::new(20, "Gone", ConversationKind::Group).unresolved(),
            Conversation::new(30, "News", ConversationKind::Channel),
        ]
    }

    fn key_events(keys: Vec<KeyEvent>) -> impl FnMut() -> io::Result<Event> {
        let mut keys = VecDeque::from(keys);
        move || {
            keys.pop_front()
                .map(Event::Key)
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
        }
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn secret_is_collected_until_enter() {
        let keys = vec![
            press(KeyCode::Char('p')),
            press(KeyCode::Char('w')),
            press(KeyCode::Char('x')),
            press(KeyCode::Backspace),
            press(KeyCode::Char('d')),
            press(KeyCode::Enter),
        ];
        assert_eq!(collect_secret(key_events(keys)).unwrap(), Some("pwd".to_string()));
    }

    #[test]
    fn ctrl_c_closes_secret_prompt() {
        let keys = vec![press(KeyCode::Char('s')), ctrl('c'), press(KeyCode::Enter)];
        assert_eq!(collect_secret(key_events(keys)).unwrap(), None);
    }

    #[test]
    fn ctrl_d_closes_only_empty_secret_prompt() {
        assert_eq!(collect_secret(key_events(vec![ctrl('d')])).unwrap(), None);

        let keys = vec![press(KeyCode::Char('a')), ctrl('d'), press(KeyCode::Enter)];
        assert_eq!(collect_secret(key_events(keys)).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn key_release_events_are_ignored() {
        let mut release = press(KeyCode::Char('z'));
        release.kind = KeyEventKind::Release;
        let keys = vec![press(KeyCode::Char('a')), release, press(KeyCode::Enter)];
        assert_eq!(collect_secret(key_events(keys)).unwrap(), Some("a".to_string()));
    }

    #[test]
    fn parse_selection_accepts_bounds() {
        assert_eq!(parse_selection("1", 3), Ok(0));
        assert_eq!(parse_selection(" 3 ", 3), Ok(2));
    }

    #[test]
    fn parse_selection_rejects_each_category() {
        assert_eq!(parse_selection("", 3), Err(ValidationError::Empty));
        assert_eq!(
            parse_selection("abc", 3),
            Err(ValidationError::NotANumber("abc".into()))
        );
        assert_eq!(
            parse_selection("0", 3),
            Err(ValidationError::OutOfRange { value: 0, max: 3 })
        );
        assert_eq!(
            parse_selection("4", 3),
            Err(ValidationError::OutOfRange { value: 4, max: 3 })
        );
        assert_eq!(
            parse_selection("-2", 3),
            Err(ValidationError::OutOfRange { value: -2, max: 3 })
        );
        assert!(matches!(
            parse_selection("1.5", 3),
            Err(ValidationError::NotANumber(_))
        ));
    }

    #[test]
    fn parse_selection_never_escapes_the_list() {
        for len in 0..8usize {
            for value in -3i64..12 {
                if let Ok(index) = parse_selection(&value.to_string(), len) {
                    assert!(index < len);
                }
            }
        }
    }

    #[test]
    fn validate_selection_rejects_unresolved_entry() {
        let list = sample_list();
        assert_eq!(validate_selection("2", &list), Err(ValidationError::Unresolved));
        assert_eq!(validate_selection("3", &list), Ok(2));
    }

    #[test]
    fn normalize_path_appends_extension() {
        assert_eq!(normalize_path("messages"), Ok(PathBuf::from("messages.txt")));
        assert_eq!(normalize_path(" list.TXT "), Ok(PathBuf::from("list.TXT")));
        assert_eq!(normalize_path("notes.md"), Ok(PathBuf::from("notes.md.txt")));
        assert_eq!(normalize_path("   "), Err(ValidationError::Empty));
    }

    #[test]
    fn check_message_file_distinguishes_missing_and_empty() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        assert_eq!(
            check_message_file(&missing),
            Err(ValidationError::FileNotFound(missing.clone()))
        );

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        assert_eq!(
            check_message_file(&empty),
            Err(ValidationError::EmptyFile(empty.clone()))
        );

        let full = dir.path().join("full.txt");
        fs::write(&full, "hi\n").unwrap();
        assert_eq!(check_message_file(&full), Ok(3));

        assert!(matches!(
            check_message_file(dir.path()),
            Err(ValidationError::FileNotFound(_))
        ));
    }

    #[test]
    fn parse_confirmation_understands_both_languages() {
        for yes in ["да", "Д", "yes", "Y", "1"] {
            assert_eq!(parse_confirmation(yes), Ok(true));
        }
        for no in ["нет", "н", "NO", "n", "0"] {
            assert_eq!(parse_confirmation(no), Ok(false));
        }
        assert!(matches!(
            parse_confirmation("maybe"),
            Err(ValidationError::UnknownAnswer(_))
        ));
    }

    #[test]
    fn user_messages_are_distinct_per_category() {
        let errors = [
            ValidationError::Empty,
            ValidationError::NotANumber("x".into()),
            ValidationError::OutOfRange { value: 9, max: 3 },
            ValidationError::Unresolved,
            ValidationError::FileNotFound(PathBuf::from("a.txt")),
            ValidationError::EmptyFile(PathBuf::from("a.txt")),
            ValidationError::UnknownAnswer("x".into()),
        ];
        let messages: std::collections::HashSet<String> =
            errors.iter().map(|e| e.user_message()).collect();
        assert_eq!(messages.len(), errors.len());
    }

    #[tokio::test]
    async fn select_conversation_retries_until_valid() {
        let list = sample_list();
        let mut terminal = ScriptedTerminal::new(&["", "x", "9", "2", "3"]);

        let selected = select_conversation(&mut terminal, &list).await.unwrap();
        assert_eq!(selected.id, 30);
        assert_eq!(terminal.prompts, 5);
    }

    #[tokio::test]
    async fn select_conversation_interrupts_on_closed_input() {
        let list = sample_list();
        let mut terminal = ScriptedTerminal::new(&["nope"]);

        let err = select_conversation(&mut terminal, &list).await.unwrap_err();
        assert!(err.is_interrupt());
    }

    #[tokio::test]
    async fn select_file_path_loops_past_missing_and_empty_files() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "").unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "hello\n").unwrap();

        let missing = dir.path().join("missing");
        let empty_raw = dir.path().join("empty");
        let good_raw = dir.path().join("good");
        let mut terminal = ScriptedTerminal::new(&[
            missing.to_str().unwrap(),
            empty_raw.to_str().unwrap(),
            good_raw.to_str().unwrap(),
        ]);

        let path = select_file_path(&mut terminal).await.unwrap();
        assert_eq!(path, good);
        assert_eq!(terminal.prompts, 3);
    }

    #[tokio::test]
    async fn confirm_sending_reprompts_on_unknown_answer() {
        let conv = Conversation::new(1, "Alice", ConversationKind::Person);

        let mut terminal = ScriptedTerminal::new(&["может", "да"]);
        assert!(confirm_sending(&mut terminal, &conv, 3).await.unwrap());
        assert_eq!(terminal.prompts, 2);

        let mut terminal = ScriptedTerminal::new(&["нет"]);
        assert!(!confirm_sending(&mut terminal, &conv, 3).await.unwrap());
    }
}

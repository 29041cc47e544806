//! Error types for the Telegram sender
//!
//! Setup-time failures are fatal and abort the run. Per-message send
//! failures never reach this type: they are classified inside the dispatch
//! loop (see [`crate::transport::SendError`]).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session file not found: {0}")]
    SessionNotFound(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Interrupted by user")]
    Interrupted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the error was caused by the user stopping the program.
    pub fn is_interrupt(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}

impl From<grammers_client::InvocationError> for Error {
    fn from(err: grammers_client::InvocationError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_config() {
        let err = Error::Config("api_id is missing".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Configuration error"));
        assert!(msg.contains("api_id"));
    }

    #[test]
    fn test_error_display_session_not_found() {
        let err = Error::SessionNotFound("test.session".to_string());
        assert!(err.to_string().contains("Session file not found"));
        assert!(err.to_string().contains("test.session"));
    }

    #[test]
    fn test_error_display_session_locked() {
        let err = Error::SessionLocked;
        assert!(err.to_string().contains("locked by another process"));
    }

    #[test]
    fn test_error_display_lock_error() {
        let err = Error::LockError("timeout".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Failed to acquire session lock"));
        assert!(msg.contains("timeout"));
    }

    #[test]
    fn test_error_display_telegram_error() {
        let err = Error::TelegramError("PHONE_CODE_INVALID".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Telegram API error"));
        assert!(msg.contains("PHONE_CODE_INVALID"));
    }

    #[test]
    fn test_error_display_connection_error() {
        let err = Error::ConnectionError("reset by peer".to_string());
        assert!(err.to_string().contains("Connection error"));
    }

    #[test]
    fn interrupted_is_recognised() {
        assert!(Error::Interrupted.is_interrupt());
        assert!(!Error::SessionLocked.is_interrupt());
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::IoError(_)));
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_error_from_yaml() {
        let yaml_err = serde_yaml::from_str::<Vec<i32>>("{not: [a list").unwrap_err();
        let err: Error = yaml_err.into();
        assert!(matches!(err, Error::Config(_)));
    }
}

//! Session management for Telegram client
//!
//! Provides:
//! - File-based session locking to prevent parallel execution
//! - Client creation and lazy reconnection
//! - Interactive sign-in when the session is not yet authorized

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use grammers_client::client::updates::UpdatesLike;
use grammers_client::{Client, SignInError};
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_session::storages::SqliteSession;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::prompt::Terminal;

/// Session lock guard that ensures exclusive access to the Telegram session.
pub struct SessionLock {
    lock_file: Option<File>,
    path: PathBuf,
}

impl SessionLock {
    /// Acquire an exclusive lock on the session.
    pub fn acquire(path: &Path) -> Result<Self> {
        let lock_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| Error::LockError(format!("Failed to open lock file: {}", e)))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                lock_file: Some(lock_file),
                path: path.to_path_buf(),
            }),
            Err(_) => {
                eprintln!(
                    r#"
⚠️  ОШИБКА: Telegram сессия уже используется другим процессом!

Параллельное использование одной сессии может привести к конфликтам и блокировкам.
Подождите, пока завершится другой процесс, и попробуйте снова.
"#
                );
                Err(Error::SessionLocked)
            }
        }
    }

    /// Release the lock manually
    pub fn release(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = file.unlock();
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open the session database, creating it on first use.
pub fn open_session(path: &Path) -> Result<Arc<SqliteSession>> {
    if !path.exists() {
        info!(path = %path.display(), "Session file not found, a new one will be created");
    }
    let session = SqliteSession::open(path).map_err(|e| {
        Error::SessionNotFound(format!("Failed to open {}: {}", path.display(), e))
    })?;
    Ok(Arc::new(session))
}

/// Holder for SenderPool components and Client
pub struct TelegramClient {
    pub client: Client,
    _handle: SenderPoolHandle,
    session: Arc<SqliteSession>,
    api_id: i32,
    _updates: mpsc::UnboundedReceiver<UpdatesLike>,
    runner_handle: tokio::task::JoinHandle<()>,
}

impl TelegramClient {
    /// Create a new TelegramClient from session
    pub async fn connect(session: Arc<SqliteSession>, api_id: i32) -> Result<Self> {
        let pool = SenderPool::new(session.clone(), api_id);

        // Create client from pool (need reference to whole pool)
        let client = Client::new(&pool);

        let SenderPool {
            runner,
            updates,
            handle,
        } = pool;

        let runner_handle = tokio::spawn(async move {
            runner.run().await;
        });

        Ok(Self {
            client,
            _handle: handle,
            session,
            api_id,
            _updates: updates,
            runner_handle,
        })
    }

    /// The sender pool runner stops when the connection is lost for good.
    pub fn is_connected(&self) -> bool {
        !self.runner_handle.is_finished()
    }

    /// Drop the current pool and build a fresh one over the same session.
    pub async fn reconnect(&mut self) -> Result<()> {
        self.runner_handle.abort();
        *self = Self::connect(self.session.clone(), self.api_id).await?;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.runner_handle.abort();
    }
}

// Implement Deref to allow using TelegramClient as &Client
impl std::ops::Deref for TelegramClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}

/// Sign in interactively unless the session is already authorized.
pub async fn authorize<T: Terminal + ?Sized>(
    client: &Client,
    terminal: &mut T,
    config: &Config,
) -> Result<()> {
    let authorized = client
        .is_authorized()
        .await
        .map_err(|e| Error::ConnectionError(e.to_string()))?;
    if authorized {
        info!("Session already authorized");
        return Ok(());
    }

    println!("\n🔐 Сессия не авторизована, выполняем вход для {}", config.phone);

    let token = client
        .request_login_code(&config.phone, &config.api_hash)
        .await
        .map_err(|e| Error::TelegramError(format!("Failed to request code: {}", e)))?;

    let code = terminal
        .read_line("📱 Введите код из Telegram: ")
        .await?
        .ok_or(Error::Interrupted)?;

    let user = match client.sign_in(&token, code.trim()).await {
        Ok(user) => user,
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("не указана").to_string();
            let prompt = format!("🔑 Введите пароль 2FA (подсказка: {}): ", hint);
            let password = terminal
                .read_secret(&prompt)
                .await?
                .ok_or(Error::Interrupted)?;

            client
                .check_password(password_token, password.trim())
                .await
                .map_err(|e| Error::TelegramError(format!("Failed to check password: {}", e)))?
        }
        Err(e) => {
            warn!("Sign in failed: {}", e);
            return Err(Error::TelegramError(format!("Failed to sign in: {}", e)));
        }
    };

    println!(
        "✅ Вход выполнен: {} (@{})",
        user.full_name(),
        user.username().unwrap_or("не указан")
    );
    Ok(())
}

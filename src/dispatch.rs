//! Message dispatch loop
//!
//! Sends a batch of messages to one conversation, strictly one at a time.
//! Each message runs through a small state machine:
//!
//! - `Attempting(n)` → `Sent` on success;
//! - rate limit with wait W → sleep W + 1 s and retry on the same attempt;
//! - retryable remote/transport error → backoff and `Attempting(n + 1)`,
//!   or `Failed` once the attempt budget is spent;
//! - fatal error → `Failed` right away.
//!
//! A failed message never aborts the batch.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::conversations::Conversation;
use crate::metrics;
use crate::transport::{SendError, Transport};

/// RPC errors that will not go away by retrying the same request.
const PERMANENT_RPC_ERRORS: &[&str] = &[
    "CHAT_WRITE_FORBIDDEN",
    "CHAT_ADMIN_REQUIRED",
    "CHAT_RESTRICTED",
    "CHANNEL_PRIVATE",
    "USER_BANNED_IN_CHANNEL",
    "USER_IS_BLOCKED",
    "USER_DEACTIVATED",
    "INPUT_USER_DEACTIVATED",
    "PEER_ID_INVALID",
    "MESSAGE_EMPTY",
    "MESSAGE_TOO_LONG",
];

/// Retry and pacing parameters of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per message for non rate-limit failures.
    pub max_attempts: u32,
    pub remote_backoff: Duration,
    pub transport_backoff: Duration,
    /// Pause after every sent or failed message.
    pub pacing: Duration,
    pub progress_every: usize,
    /// Cap on the total rate-limit wait for one message; `None` never gives up.
    pub max_rate_limit_wait: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            remote_backoff: Duration::from_secs(5),
            transport_backoff: Duration::from_secs(3),
            pacing: Duration::from_millis(500),
            progress_every: 10,
            max_rate_limit_wait: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Remote,
    Transport,
}

/// Tagged result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent,
    RateLimited(u64),
    Retryable(FailureKind),
    Fatal(FailureKind),
}

impl AttemptOutcome {
    pub fn classify(result: &Result<(), SendError>) -> Self {
        match result {
            Ok(()) => AttemptOutcome::Sent,
            Err(SendError::RateLimited { seconds }) => AttemptOutcome::RateLimited(*seconds),
            Err(SendError::Remote { name, .. }) if is_permanent(name) => {
                AttemptOutcome::Fatal(FailureKind::Remote)
            }
            Err(SendError::Remote { .. }) => AttemptOutcome::Retryable(FailureKind::Remote),
            Err(SendError::Transport(_)) => AttemptOutcome::Retryable(FailureKind::Transport),
            Err(SendError::Unresolved(_)) => AttemptOutcome::Fatal(FailureKind::Remote),
        }
    }
}

fn is_permanent(name: &str) -> bool {
    PERMANENT_RPC_ERRORS.contains(&name)
}

/// Per-message state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Attempting(u32),
    Sent,
    Failed,
}

/// Transition produced by [`next_step`]: wait (if any), then move to `next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: AttemptState,
    pub wait: Option<Duration>,
}

/// Pure transition function of the per-message state machine.
pub fn next_step(attempt: u32, outcome: &AttemptOutcome, policy: &RetryPolicy) -> Step {
    let retry_or_fail = |backoff: Duration| {
        if attempt < policy.max_attempts {
            Step {
                next: AttemptState::Attempting(attempt + 1),
                wait: Some(backoff),
            }
        } else {
            Step {
                next: AttemptState::Failed,
                wait: None,
            }
        }
    };

    match outcome {
        AttemptOutcome::Sent => Step {
            next: AttemptState::Sent,
            wait: None,
        },
        AttemptOutcome::RateLimited(seconds) => Step {
            next: AttemptState::Attempting(attempt),
            wait: Some(Duration::from_secs(seconds.saturating_add(1))),
        },
        AttemptOutcome::Retryable(FailureKind::Remote) => retry_or_fail(policy.remote_backoff),
        AttemptOutcome::Retryable(FailureKind::Transport) => {
            retry_or_fail(policy.transport_backoff)
        }
        AttemptOutcome::Fatal(_) => Step {
            next: AttemptState::Failed,
            wait: None,
        },
    }
}

/// Progress is reported every `every` messages and after the last one.
pub fn should_report(number: usize, total: usize, every: usize) -> bool {
    number % every.max(1) == 0 || number == total
}

/// Status line for a provider wait; shows the wait the provider asked for.
fn rate_limit_notice(seconds: u64) -> String {
    format!("⏳ Flood wait: ждем {} секунд...", seconds)
}

/// Terminal result for one line of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    Failed,
    Skipped,
}

/// Counters for one run; never persisted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    /// Blank messages that reached the loop and were not sent.
    pub skipped: usize,
    /// Send attempts, rate-limited ones included.
    pub attempts: usize,
    pub rate_limit_waits: usize,
}

impl DispatchSummary {
    fn record(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent => self.sent += 1,
            SendOutcome::Failed => self.failed += 1,
            SendOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.sent + self.failed + self.skipped
    }

    /// Print the end-of-run report.
    pub fn print(&self, conversation_name: &str) {
        println!("\n{}", "=".repeat(60));
        println!("📊 ИТОГИ ОТПРАВКИ:");
        println!("{}", "=".repeat(60));
        println!("✅ Успешно отправлено: {}", self.sent);
        println!("❌ Не отправлено: {}", self.failed);
        if self.skipped > 0 {
            println!("⚠️ Пропущено пустых: {}", self.skipped);
        }
        println!("💬 Чат: {}", conversation_name);
        println!("{}", "=".repeat(60));
    }
}

/// Sends messages through a [`Transport`] according to a [`RetryPolicy`].
pub struct Dispatcher<'a, T: Transport + ?Sized> {
    transport: &'a mut T,
    policy: RetryPolicy,
    summary: DispatchSummary,
}

impl<'a, T: Transport + ?Sized> Dispatcher<'a, T> {
    pub fn new(transport: &'a mut T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            summary: DispatchSummary::default(),
        }
    }

    /// Send every message in order and return the run summary.
    pub async fn send_all(
        mut self,
        conversation: &Conversation,
        messages: &[String],
    ) -> DispatchSummary {
        let total = messages.len();
        info!(
            conversation = %conversation.name,
            total,
            "Starting dispatch"
        );
        println!("\n📤 Начинаем отправку в чат: {}", conversation.name);
        println!("⏳ Это может занять некоторое время...");

        for (i, message) in messages.iter().enumerate() {
            let number = i + 1;
            let outcome = self.send_message(conversation, message, number).await;
            self.summary.record(outcome);
            metrics::record_message(outcome);

            if should_report(number, total, self.policy.progress_every) {
                println!(
                    "📨 Обработано {}/{} (отправлено {}, ошибок {})",
                    number, total, self.summary.sent, self.summary.failed
                );
            }

            if outcome != SendOutcome::Skipped && !self.policy.pacing.is_zero() {
                sleep(self.policy.pacing).await;
            }
        }

        info!(
            sent = self.summary.sent,
            failed = self.summary.failed,
            skipped = self.summary.skipped,
            attempts = self.summary.attempts,
            "Dispatch finished"
        );
        self.summary
    }

    /// Drive one message to a terminal outcome.
    pub async fn send_message(
        &mut self,
        conversation: &Conversation,
        message: &str,
        number: usize,
    ) -> SendOutcome {
        if message.trim().is_empty() {
            warn!(number, "Skipping blank message");
            println!("⚠️ Пропущено пустое сообщение {}", number);
            return SendOutcome::Skipped;
        }

        let max = self.policy.max_attempts;
        let mut attempt = 1;
        let mut rate_limited_for = Duration::ZERO;

        loop {
            let result = self.attempt(conversation, message).await;
            self.summary.attempts += 1;
            metrics::record_attempt();

            let outcome = AttemptOutcome::classify(&result);
            let step = next_step(attempt, &outcome, &self.policy);

            if let Err(err) = &result {
                match outcome {
                    AttemptOutcome::RateLimited(seconds) => {
                        warn!(number, seconds, "Rate limited");
                        println!("{}", rate_limit_notice(seconds));
                    }
                    AttemptOutcome::Retryable(FailureKind::Remote) => {
                        warn!(number, attempt, "Remote error: {}", err);
                        println!("❌ Ошибка RPC (попытка {}/{}): {}", attempt, max, err);
                    }
                    AttemptOutcome::Retryable(FailureKind::Transport) => {
                        warn!(number, attempt, "Transport error: {}", err);
                        println!(
                            "❌ Неожиданная ошибка (попытка {}/{}): {}",
                            attempt, max, err
                        );
                    }
                    AttemptOutcome::Fatal(_) => {
                        warn!(number, attempt, "Message rejected: {}", err);
                        println!("❌ Сообщение отклонено без повтора: {}", err);
                    }
                    AttemptOutcome::Sent => {}
                }
            }

            if let AttemptOutcome::RateLimited(_) = outcome {
                let wait = step.wait.unwrap_or_default();
                if let Some(cap) = self.policy.max_rate_limit_wait {
                    if rate_limited_for + wait > cap {
                        warn!(number, ?cap, "Rate-limit wait cap exceeded");
                        println!("❌ Превышено время ожидания flood wait для сообщения {}", number);
                        return SendOutcome::Failed;
                    }
                }
                rate_limited_for += wait;
                self.summary.rate_limit_waits += 1;
                metrics::record_rate_limit_wait(wait);
            }

            if let Some(wait) = step.wait {
                debug!(?wait, "Waiting before next attempt");
                sleep(wait).await;
            }

            match step.next {
                AttemptState::Attempting(next) => attempt = next,
                AttemptState::Sent => return SendOutcome::Sent,
                AttemptState::Failed => {
                    println!("❌ Не удалось отправить сообщение {}", number);
                    return SendOutcome::Failed;
                }
            }
        }
    }

    /// One attempt: reconnect if needed, then send.
    async fn attempt(&mut self, conversation: &Conversation, message: &str) -> Result<(), SendError> {
        if !self.transport.is_connected() {
            println!("🔌 Соединение разорвано, переподключаемся...");
            info!("Transport disconnected, reconnecting");
            self.transport
                .connect()
                .await
                .map_err(|e| SendError::Transport(e.to_string()))?;
        }

        self.transport.send_message(conversation, message).await
    }
}

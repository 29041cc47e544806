//! Telegram Sender CLI - main entry point
//!
//! Interactive flow: sign in, pick a chat, pick a message file, confirm,
//! send. The connection is always closed at the end, however the run ends.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Instant;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use telegram_sender::commands::{self, RunOutcome};
use telegram_sender::config::{self, DEFAULT_CONFIG_FILE};
use telegram_sender::{
    metrics, session, Config, Error, SessionLock, StdTerminal, TelegramClient,
    TelegramTransport, Transport,
};

#[derive(Parser)]
#[command(name = "telegram_sender")]
#[command(about = "Send every line of a text file to a Telegram chat", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to config.yml with Telegram credentials and sending policy
    #[arg(long, env = "SENDER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Address to expose Prometheus metrics (e.g., 0.0.0.0:9898)
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for local development
    config::load_env_file();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("telegram_sender=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr.as_deref() {
        match addr.parse::<SocketAddr>() {
            Ok(socket) => metrics::spawn_metrics_server(socket),
            Err(err) => warn!(%addr, "Invalid metrics address: {}", err),
        }
    }

    println!("🤖 ЗАПУСК ТЕЛЕГРАМ ОТПРАВИТЕЛЯ");
    println!("{}", "=".repeat(50));

    let config = Config::load(&cli.config).and_then(|config| {
        config.validate()?;
        Ok(config)
    });
    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!(path = %cli.config.display(), "Setup failed: {}", err);
            eprintln!("💥 Ошибка конфигурации: {}", err);
            return Err(err.into());
        }
    };

    let mut lock = SessionLock::acquire(&config.lock_file())?;

    println!("🔌 Подключаемся к Telegram...");
    let mut transport = match connect(&config).await {
        Ok(transport) => transport,
        Err(err) => {
            error!("Connection failed: {}", err);
            eprintln!("💥 Ошибка подключения: {}", err);
            return Err(err.into());
        }
    };
    let mut terminal = StdTerminal::new();
    let start = Instant::now();

    let result = tokio::select! {
        result = run(&mut transport, &mut terminal, &config) => result,
        _ = signal::ctrl_c() => Err(Error::Interrupted),
    };

    transport.disconnect().await;
    println!("🔌 Соединение закрыто");
    metrics::record_run(start.elapsed());

    match result {
        Ok(outcome) => {
            info!(?outcome, "Run finished");
            if matches!(outcome, RunOutcome::Completed { .. }) {
                println!("\n🎉 Работа завершена!");
            }
            Ok(())
        }
        Err(err) if err.is_interrupt() => {
            println!("\n👋 Программа завершена");
            lock.release();
            // A pending stdin read cannot be cancelled; don't wait for it.
            std::process::exit(0);
        }
        Err(err) => {
            error!("Run failed: {}", err);
            eprintln!("💥 Критическая ошибка: {}", err);
            Err(err.into())
        }
    }
}

async fn connect(config: &Config) -> telegram_sender::Result<TelegramTransport> {
    let session = session::open_session(&config.session_file)?;
    let client = TelegramClient::connect(session, config.api_id).await?;
    Ok(TelegramTransport::new(client))
}

async fn run(
    transport: &mut TelegramTransport,
    terminal: &mut StdTerminal,
    config: &Config,
) -> telegram_sender::Result<RunOutcome> {
    session::authorize(transport.client(), terminal, config).await?;
    println!("✅ Клиент запущен успешно!");
    commands::send_file_run(transport, terminal, &config.sending).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_defaults_to_config_file_constant() {
        let cli = Cli::try_parse_from(["telegram_sender"]).expect("parse");
        if std::env::var_os("SENDER_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_FILE));
        }
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "telegram_sender",
            "--config",
            "other.yml",
            "--metrics-addr",
            "127.0.0.1:9898",
        ])
        .expect("parse");
        assert_eq!(cli.config, PathBuf::from("other.yml"));
        assert_eq!(cli.metrics_addr.as_deref(), Some("127.0.0.1:9898"));
    }
}

//! `collabflow`: headless board watcher.
//!
//! Connects to the realtime server, opens one project's board and prints a
//! one-line summary every time the board changes. Configuration via CLI
//! flags, environment variables, or config file
//! (`~/.config/collabflow/config.toml`).
//!
//! ```bash
//! cargo run --bin collabflow -- --server-url ws://127.0.0.1:5000/ws \
//!     --token "$TOKEN" --project p1 --user-id alice
//! ```

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use collabflow::activity::{self, ActivityFeed};
use collabflow::channel::websocket::WsConnector;
use collabflow::channel::{ChannelSignal, SyncChannel};
use collabflow::config::{CliArgs, ClientConfig, StorageBackend};
use collabflow::persist::{HttpAdapter, LocalStore, PersistenceAdapter};
use collabflow::session::{BoardSession, Identity, SessionUpdate};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("collabflow: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("collabflow starting");

    let result = run(&config).await;
    tracing::info!("collabflow exiting");
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("collabflow: {message}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("collabflow.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn run(config: &ClientConfig) -> Result<(), String> {
    let server_url = config
        .server_url
        .as_deref()
        .ok_or("no server URL (use --server-url or [server] url)")?;
    let token = config
        .token
        .as_deref()
        .ok_or("no credential (use --token or COLLABFLOW_TOKEN)")?;
    let project = config.project.as_deref().ok_or("no project (use --project)")?;
    let user_id = config.user_id.clone().ok_or("no user id (use --user-id or [identity] user_id)")?;
    let identity = Identity {
        display_name: config.display_name().unwrap_or(&user_id).to_string(),
        user_id,
    };

    let connector = WsConnector::new(server_url)
        .map_err(|e| e.to_string())?
        .with_connect_timeout(config.connect_timeout);
    let channel = Arc::new(SyncChannel::new(connector, config.reconnect));
    channel.connect(token).await.map_err(|e| e.to_string())?;
    println!("connected to {server_url}");

    let feed = ActivityFeed::new(config.activity_capacity);
    let result = match config.backend {
        StorageBackend::Local => {
            tracing::info!(dir = %config.data_dir.display(), "using local storage");
            let store = LocalStore::new(&config.data_dir);
            watch(Arc::clone(&channel), store, project, identity, feed).await
        }
        StorageBackend::Remote => {
            let api_url = config
                .api_url
                .as_deref()
                .ok_or("remote storage needs an API URL (use --api-url or [storage] api_url)")?;
            tracing::info!(api = api_url, "using remote storage");
            let adapter = HttpAdapter::new(api_url, token);
            watch(Arc::clone(&channel), adapter, project, identity, feed).await
        }
    };

    channel.disconnect().await;
    result
}

/// Prints the board after each change until Ctrl-C or connectivity loss.
async fn watch<P: PersistenceAdapter>(
    channel: Arc<SyncChannel<WsConnector>>,
    adapter: P,
    project: &str,
    identity: Identity,
    feed: ActivityFeed,
) -> Result<(), String> {
    let session = BoardSession::open(channel, adapter, project, identity, feed).await;
    if let Some(e) = session.load_error() {
        println!("could not load board ({e}), showing default layout");
    }
    println!("[{project}] {}", session.board().summary());

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            update = session.process_next() => match update {
                Some(SessionUpdate::Board(outcome)) if outcome.changed_board() => {
                    println!("[{project}] {}", session.board().summary());
                }
                Some(SessionUpdate::Presence { changed: true }) => {
                    let names: Vec<_> = session
                        .participants()
                        .into_iter()
                        .map(|p| p.display_name)
                        .collect();
                    println!("[{project}] online: {}", names.join(", "));
                }
                Some(SessionUpdate::Activity { added: true }) => {
                    if let Some(entry) = session.activity().first() {
                        let when = activity::relative_time(&entry.timestamp, chrono::Utc::now());
                        println!("[{project}] {} ({when})", activity::describe(entry));
                    }
                }
                Some(SessionUpdate::Connection(ChannelSignal::Reconnecting { attempt, max_attempts })) => {
                    println!("reconnecting ({attempt}/{max_attempts})...");
                }
                Some(SessionUpdate::Connection(ChannelSignal::Reconnected)) => println!("reconnected"),
                Some(SessionUpdate::Connection(ChannelSignal::ConnectivityLost)) => {
                    break Err("lost connection to the server".to_string());
                }
                Some(_) => {}
                None => break Ok(()),
            },
        }
    };

    session.close();
    outcome
}

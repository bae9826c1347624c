//! # Store Console Library
//!
//! Command loop for the store manager console and the standalone receiver.
//!
//! ## Module Organization
//! ```text
//! store_console_lib/
//! ├── lib.rs          ◄─── You are here (startup, loops, logging)
//! ├── commands.rs     ◄─── Command parsing and execution
//! ├── state.rs        ◄─── Registries, controller, receiver
//! └── error.rs        ◄─── AppError for command failures
//! ```
//!
//! ## Console Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   stdin ──► parse_command ──► execute(AppState) ──► stdout              │
//! │     │                                                                   │
//! │     ├── "quit" ───────┐                                                 │
//! │     ├── EOF ──────────┼──► AppState::shutdown ──► exit                  │
//! │     └── Ctrl-C ───────┘    (broadcaster stopped, receiver closed)       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod error;
pub mod state;

use std::io::Write;
use std::path::PathBuf;

use store_broadcast::{BroadcastConfig, ReceiverConfig, ReceiverEvent, UdpReceiver};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use commands::{execute, parse_command, Reply, HELP};
use error::{AppError, AppResult};
use state::AppState;

/// Sets up `tracing` with `RUST_LOG` support. Logs go to stderr so they do
/// not interleave with command output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,store=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Loads config from the path given as the first CLI argument, or from the
/// platform config dir.
pub fn load_config() -> AppResult<BroadcastConfig> {
    let path = std::env::args().nth(1).map(PathBuf::from);
    Ok(BroadcastConfig::load(path)?)
}

/// Runs the operator console until `quit`, end of input or Ctrl-C.
pub async fn run_console() -> AppResult<()> {
    let config = load_config()?;
    info!(
        store_id = %config.store.id,
        destination = %config.broadcast.target(),
        interval_ms = config.broadcast.interval_ms,
        "Starting store console"
    );

    let mut state = AppState::new(config, Handle::current());
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    println!("Store manager console. Commands:");
    print_lines(HELP.iter().copied());

    loop {
        prompt();
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = input.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_line(&mut state, &line).await == Reply::Quit {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("End of input");
                    break;
                }
                Err(e) => {
                    state.shutdown().await;
                    return Err(AppError::internal(format!("Failed to read input: {}", e)));
                }
            },
        }
    }

    state.shutdown().await;
    Ok(())
}

/// Parses and runs one line, printing the result or the error.
async fn handle_line(state: &mut AppState, line: &str) -> Reply {
    let result = match parse_command(line) {
        Ok(Some(command)) => execute(state, command).await,
        Ok(None) => return Reply::Lines(Vec::new()),
        Err(e) => Err(e),
    };

    match result {
        Ok(Reply::Lines(lines)) => {
            print_lines(lines.iter().map(String::as_str));
            Reply::Lines(lines)
        }
        Ok(Reply::Quit) => Reply::Quit,
        Err(e) => {
            debug!(code = %e.code, "Command failed");
            println!("{}", e);
            Reply::Lines(Vec::new())
        }
    }
}

fn print_lines<'a>(lines: impl IntoIterator<Item = &'a str>) {
    for line in lines {
        println!("  {}", line);
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Runs the standalone receiver, printing each transaction once, until
/// Ctrl-C.
pub async fn run_receiver() -> AppResult<()> {
    let config = load_config()?;
    let receiver = UdpReceiver::new(ReceiverConfig::from(&config.receiver))
        .start()
        .await?;
    let mut events = receiver.subscribe();

    println!("Listening on {}", receiver.local_addr());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(ReceiverEvent::Received { from, new_lines, .. }) => {
                    for line in new_lines {
                        println!("[{}] {}", from, line);
                    }
                }
                Ok(ReceiverEvent::Heartbeat { from, store, .. }) => {
                    debug!(%from, store = %store.store_name, "Heartbeat");
                }
                Ok(ReceiverEvent::Rejected { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Display fell behind, events skipped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let stats = receiver.stats();
    receiver.stop().await?;
    info!(
        datagrams = stats.datagrams,
        transactions = stats.transactions,
        rejected = stats.rejected,
        "Receiver stopped"
    );
    Ok(())
}

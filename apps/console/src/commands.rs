//! # Console Commands
//!
//! Parses operator input and runs it against [`AppState`].
//!
//! ## Command Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Console Commands                                 │
//! │                                                                         │
//! │  customer <name>                         - register a customer          │
//! │  item book|magazine <name>               - register an item             │
//! │  sale <customer> ; <item> x<qty> [; ..]  - create a transaction         │
//! │  backup / restore                        - item list backup/restore     │
//! │  start / stop                            - broadcast control            │
//! │  receiver / received                     - open receiver, show lines    │
//! │  status / list                           - state and transactions       │
//! │  help / quit                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use store_broadcast::ControllerState;
use store_core::ItemType;

use crate::error::{AppError, AppResult, ErrorCode};
use crate::state::AppState;

pub const HELP: &[&str] = &[
    "customer <name>                          register a customer",
    "item book|magazine <name>                register an item",
    "sale <customer> ; <item> x<qty> [; ...]  create a transaction",
    "backup                                   back up the item list",
    "restore                                  restore items from backup",
    "start                                    start broadcasting",
    "stop                                     stop broadcasting",
    "receiver                                 open the receiver",
    "received                                 show received transactions",
    "status                                   broadcast and registry status",
    "list                                     show local transactions",
    "help                                     show this help",
    "quit                                     exit",
];

const SALE_SYNTAX: &str = "sale <customer> ; <item> x<qty> [; <item> x<qty> ...]";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    AddCustomer(String),
    AddItem { item_type: ItemType, name: String },
    Sale { customer: String, lines: Vec<SaleLine> },
    Backup,
    Restore,
    Start,
    Stop,
    OpenReceiver,
    Received,
    Status,
    List,
    Help,
    Quit,
}

/// One `<item> x<qty>` part of a sale. Quantity is range-checked by the
/// registry, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLine {
    pub item: String,
    pub quantity: i64,
}

/// What the loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Reply::Lines(vec![text.into()])
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(input: &str) -> AppResult<Option<Command>> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (input, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "customer" => {
            if rest.is_empty() {
                return Err(AppError::usage("customer <name>"));
            }
            Command::AddCustomer(rest.to_string())
        }
        "item" => {
            let (kind, name) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| AppError::usage("item book|magazine <name>"))?;
            let item_type: ItemType = kind.parse()?;
            Command::AddItem {
                item_type,
                name: name.trim().to_string(),
            }
        }
        "sale" => parse_sale(rest)?,
        "backup" => Command::Backup,
        "restore" => Command::Restore,
        "start" => Command::Start,
        "stop" => Command::Stop,
        "receiver" => Command::OpenReceiver,
        "received" => Command::Received,
        "status" => Command::Status,
        "list" => Command::List,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => {
            return Err(AppError::new(
                ErrorCode::Usage,
                format!("Unknown command '{}', type 'help' for the list", other),
            ))
        }
    };

    Ok(Some(command))
}

fn parse_sale(rest: &str) -> AppResult<Command> {
    let mut parts = rest.split(';').map(str::trim);

    let customer = match parts.next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Err(AppError::usage(SALE_SYNTAX)),
    };

    let mut lines = Vec::new();
    for part in parts {
        if part.is_empty() {
            return Err(AppError::usage(SALE_SYNTAX));
        }
        lines.push(parse_sale_line(part));
    }

    Ok(Command::Sale { customer, lines })
}

/// `Go Programming x2` → ("Go Programming", 2). Without a trailing `x<n>`
/// the whole text is the item name and the quantity is 1.
fn parse_sale_line(part: &str) -> SaleLine {
    if let Some((name, last)) = part.rsplit_once(char::is_whitespace) {
        let quantity = last
            .strip_prefix('x')
            .or_else(|| last.strip_prefix('X'))
            .and_then(|n| n.parse::<i64>().ok());
        if let Some(quantity) = quantity {
            return SaleLine {
                item: name.trim().to_string(),
                quantity,
            };
        }
    }

    SaleLine {
        item: part.to_string(),
        quantity: 1,
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Runs a command. Errors are meant to be shown to the operator.
pub async fn execute(state: &mut AppState, command: Command) -> AppResult<Reply> {
    match command {
        Command::AddCustomer(name) => {
            let customer = state.registries().customers().add_customer(&name)?;
            Ok(Reply::line(format!("Added customer {}", customer.name)))
        }
        Command::AddItem { item_type, name } => {
            let item = state.registries().items().add_item(&name, item_type)?;
            Ok(Reply::line(format!("Added {} {}", item.item_type, item.name)))
        }
        Command::Sale { customer, lines } => create_sale(state, &customer, &lines),
        Command::Backup => {
            let count = state.registries().items().backup();
            Ok(Reply::line(format!("Backed up {} item(s)", count)))
        }
        Command::Restore => {
            let count = state.controller_mut().restore_items()?;
            Ok(Reply::line(format!("Restored {} item(s) from backup", count)))
        }
        Command::Start => {
            state.controller_mut().start_broadcasting()?;
            let target = state.controller().config().broadcast.target();
            Ok(Reply::line(format!("Broadcasting to {}", target)))
        }
        Command::Stop => {
            let was_broadcasting = state.controller().state() == ControllerState::Broadcasting;
            state.controller_mut().stop_broadcasting();
            Ok(Reply::line(if was_broadcasting {
                "Broadcast stopped"
            } else {
                "Broadcast is not running"
            }))
        }
        Command::OpenReceiver => {
            let (addr, created) = state.open_receiver().await?;
            let text = if created {
                format!("Receiver listening on {}", addr)
            } else {
                format!("Receiver already listening on {}", addr)
            };
            Ok(Reply::line(text))
        }
        Command::Received => {
            let receiver = state
                .receiver()
                .ok_or_else(|| AppError::business("Receiver is not open, use 'receiver' first"))?;
            let lines = receiver.lines();
            if lines.is_empty() {
                return Ok(Reply::line("No transactions received yet"));
            }
            Ok(Reply::Lines(lines))
        }
        Command::Status => Ok(Reply::Lines(status_lines(state))),
        Command::List => Ok(Reply::Lines(list_lines(state))),
        Command::Help => Ok(Reply::Lines(HELP.iter().map(|s| s.to_string()).collect())),
        Command::Quit => Ok(Reply::Quit),
    }
}

fn create_sale(state: &AppState, customer: &str, lines: &[SaleLine]) -> AppResult<Reply> {
    let registries = state.registries();
    if !registries.can_create_transaction() {
        return Err(AppError::business(
            "Add at least one customer and one item before creating a transaction",
        ));
    }

    let customer = registries
        .customers()
        .find_by_name(customer)
        .ok_or_else(|| AppError::not_found("Customer", customer))?;

    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let item = registries
            .items()
            .find_by_name(&line.item)
            .ok_or_else(|| AppError::not_found("Item", &line.item))?;
        resolved.push((item.id, line.quantity));
    }

    let entries: Vec<(&str, i64)> = resolved.iter().map(|(id, q)| (id.as_str(), *q)).collect();
    let transaction = registries.create_transaction(&customer.id, &entries)?;

    Ok(Reply::line(format!(
        "Created transaction for {} ({} item(s))",
        customer.name,
        transaction.total_quantity()
    )))
}

fn status_lines(state: &AppState) -> Vec<String> {
    let controller = state.controller();
    let controls = controller.controls();
    let registries = state.registries();

    let mut lines = vec![
        format!("Broadcast: {}", controller.state()),
        format!("Status: {}", controller.status_line()),
        format!(
            "Controls: start={} stop={} create-transaction={}",
            on_off(controls.start_enabled),
            on_off(controls.stop_enabled),
            on_off(controls.create_transaction_enabled)
        ),
        format!(
            "Customers: {}  Items: {}  Transactions: {}",
            registries.customers().len(),
            registries.items().len(),
            registries.transactions().len()
        ),
    ];

    if let Some((changes, last)) = state.activity().last_change() {
        lines.push(format!("Registry changes: {}  Last: {}", changes, last));
    }

    if let Some(broadcaster) = controller.broadcaster() {
        lines.push(format!(
            "Target: {}  Datagrams sent: {}",
            broadcaster.target(),
            broadcaster.datagrams_sent()
        ));
    }

    lines.push(match state.receiver() {
        Some(receiver) => {
            let stats = receiver.stats();
            format!(
                "Receiver: {} ({} datagrams, {} rejected)",
                receiver.local_addr(),
                stats.datagrams,
                stats.rejected
            )
        }
        None => "Receiver: closed".to_string(),
    });

    lines
}

/// Local transactions rendered the way a receiver shows them. A transaction
/// whose customer or item is gone shows the reason instead.
fn list_lines(state: &AppState) -> Vec<String> {
    let transactions = state.registries().transactions().transactions();
    if transactions.is_empty() {
        return vec!["No transactions".to_string()];
    }

    transactions
        .iter()
        .map(|tx| match state.encoder().record(tx) {
            Ok(record) => record.to_string(),
            Err(e) => format!("{} (not broadcastable: {})", tx.id, e),
        })
        .collect()
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use store_broadcast::{BroadcastConfig, ReceiverConfig, UdpReceiver};
    use tokio::runtime::Handle;

    fn test_config(broadcast_port: u16) -> BroadcastConfig {
        let mut config = BroadcastConfig::default();
        config.broadcast.address = Ipv4Addr::LOCALHOST;
        config.broadcast.port = broadcast_port;
        config.broadcast.interval_ms = 50;
        config.receiver.bind_addr = Ipv4Addr::LOCALHOST;
        config.receiver.port = 0;
        config
    }

    async fn run(state: &mut AppState, input: &str) -> AppResult<Reply> {
        let command = parse_command(input)?.expect("command");
        execute(state, command).await
    }

    async fn text(state: &mut AppState, input: &str) -> Vec<String> {
        match run(state, input).await {
            Ok(Reply::Lines(lines)) => lines,
            other => panic!("unexpected reply for '{}': {:?}", input, other),
        }
    }

    #[test]
    fn test_parse_simple_commands() {
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("START").unwrap(), Some(Command::Start));
        assert_eq!(parse_command("quit").unwrap(), Some(Command::Quit));
        assert_eq!(
            parse_command("customer  Alice Smith ").unwrap(),
            Some(Command::AddCustomer("Alice Smith".into()))
        );
        assert_eq!(
            parse_command("item magazine Wired").unwrap(),
            Some(Command::AddItem {
                item_type: ItemType::Magazine,
                name: "Wired".into()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_command("customer").unwrap_err().code, ErrorCode::Usage);
        assert_eq!(parse_command("item book").unwrap_err().code, ErrorCode::Usage);
        assert_eq!(
            parse_command("item vinyl Abbey Road").unwrap_err().code,
            ErrorCode::ValidationError
        );
        assert_eq!(parse_command("dance").unwrap_err().code, ErrorCode::Usage);
        assert_eq!(parse_command("sale ; Wired x1").unwrap_err().code, ErrorCode::Usage);
        assert_eq!(parse_command("sale Alice ; ; Wired").unwrap_err().code, ErrorCode::Usage);
    }

    #[test]
    fn test_parse_sale_lines() {
        let command = parse_command("sale Alice ; Go Programming x2 ; Wired ; Box x ").unwrap();
        assert_eq!(
            command,
            Some(Command::Sale {
                customer: "Alice".into(),
                lines: vec![
                    SaleLine { item: "Go Programming".into(), quantity: 2 },
                    SaleLine { item: "Wired".into(), quantity: 1 },
                    SaleLine { item: "Box x".into(), quantity: 1 },
                ],
            })
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sale_flow_and_list() {
        let mut state = AppState::new(test_config(45454), Handle::current());

        let err = run(&mut state, "sale Alice ; Wired x1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);

        text(&mut state, "customer Alice").await;
        text(&mut state, "item book Go Programming").await;
        text(&mut state, "item magazine Wired").await;

        let err = run(&mut state, "sale Bob ; Wired x1").await.unwrap_err();
        assert_eq!(err.to_string(), "[NOT_FOUND] Customer not found: Bob");

        let err = run(&mut state, "sale alice ; Wired x0").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let err = run(&mut state, "sale alice").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);

        let lines = text(&mut state, "sale alice ; go programming x2 ; Wired x1").await;
        assert_eq!(lines, vec!["Created transaction for Alice (3 item(s))"]);

        let lines = text(&mut state, "list").await;
        assert_eq!(lines, vec!["Alice — Go Programming x2, Wired x1"]);
        assert_eq!(state.registries().transactions().len(), 1);

        let status = text(&mut state, "status").await;
        assert!(status
            .iter()
            .any(|l| l.starts_with("Registry changes: 4  Last: transaction ")));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_restore_without_backup_creates_no_broadcaster() {
        let mut state = AppState::new(test_config(45454), Handle::current());

        let err = run(&mut state, "restore").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);
        assert_eq!(state.controller().state(), ControllerState::NoBroadcaster);

        text(&mut state, "item book Dune").await;
        assert_eq!(text(&mut state, "backup").await, vec!["Backed up 1 item(s)"]);
        text(&mut state, "item book Emma").await;

        let lines = text(&mut state, "restore").await;
        assert_eq!(lines, vec!["Restored 1 item(s) from backup"]);
        assert_eq!(state.registries().items().len(), 1);
        assert_eq!(state.controller().state(), ControllerState::Idle);

        state.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_receiver_opens_once() {
        let mut state = AppState::new(test_config(45454), Handle::current());

        let err = run(&mut state, "received").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BusinessLogic);

        let first = text(&mut state, "receiver").await;
        assert!(first[0].starts_with("Receiver listening on 127.0.0.1:"));
        let second = text(&mut state, "receiver").await;
        assert!(second[0].starts_with("Receiver already listening on 127.0.0.1:"));

        assert_eq!(text(&mut state, "received").await, vec!["No transactions received yet"]);

        state.shutdown().await;
        assert!(state.receiver().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_start_stop_reaches_receiver() {
        let listener = UdpReceiver::new(ReceiverConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            history: 10,
        })
        .start()
        .await
        .unwrap();

        let mut state =
            AppState::new(test_config(listener.local_addr().port()), Handle::current());
        text(&mut state, "customer Alice").await;
        text(&mut state, "item magazine Wired").await;
        text(&mut state, "sale Alice ; Wired x3").await;

        let lines = text(&mut state, "start").await;
        assert!(lines[0].starts_with("Broadcasting to 127.0.0.1:"));
        assert_eq!(state.controller().state(), ControllerState::Broadcasting);

        let status = text(&mut state, "status").await;
        assert!(status.contains(&"Controls: start=off stop=on create-transaction=on".to_string()));

        let mut received = Vec::new();
        for _ in 0..40 {
            received = listener.lines();
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(received.first().map(String::as_str), Some("Alice — Wired x3"));

        assert_eq!(text(&mut state, "stop").await, vec!["Broadcast stopped"]);
        assert_eq!(state.controller().state(), ControllerState::Idle);
        assert_eq!(run(&mut state, "quit").await.unwrap(), Reply::Quit);

        state.shutdown().await;
        listener.stop().await.unwrap();
    }
}

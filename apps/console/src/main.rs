//! # Store Console Entry Point
//!
//! ```text
//! store-console [CONFIG_PATH]
//!
//!   1. Initialize tracing (RUST_LOG, default info,store=debug)
//!   2. Load broadcast.toml (argument or platform config dir) + env
//!   3. Run the command loop until quit / EOF / Ctrl-C
//! ```

#[tokio::main]
async fn main() {
    store_console_lib::init_tracing();

    if let Err(e) = store_console_lib::run_console().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

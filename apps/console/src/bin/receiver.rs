//! # Standalone Receiver
//!
//! ```text
//! store-receiver [CONFIG_PATH]
//!
//!   Binds [receiver] bind_addr:port and prints every received
//!   transaction line until Ctrl-C.
//! ```

#[tokio::main]
async fn main() {
    store_console_lib::init_tracing();

    if let Err(e) = store_console_lib::run_receiver().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

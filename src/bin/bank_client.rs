//! Entry point for the bank client (C4 of `spec.md` §4.4).

use clap::Parser;

use bank_sim::client_driver;
use bank_sim::config::{init_ambient_environment, ClientArgs};
use bank_sim::fifo;

#[tokio::main]
async fn main() {
    init_ambient_environment();
    fifo::ignore_sigpipe();
    let args = ClientArgs::parse();
    if let Err(e) = client_driver::run(args).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

//! Entry point for the bank server (C1/C8 of `spec.md` §4.8).

use clap::Parser;

use bank_sim::config::{init_ambient_environment, ServerArgs};
use bank_sim::fifo;
use bank_sim::server;

#[tokio::main]
async fn main() {
    init_ambient_environment();
    fifo::ignore_sigpipe();
    let args = ServerArgs::parse();
    server::run_server(args).await;
}

//! `bank_sim`: a multi-client bank simulator — one long-lived server
//! process, many short-lived client processes, connected over named
//! pipes. See each module's doc comment for its piece of the design.

pub mod account;
pub mod batch;
pub mod client_driver;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fifo;
pub mod ingress;
pub mod log_store;
pub mod parser;
pub mod server;
pub mod teller;
pub mod wire;

#[macro_use]
extern crate pest_derive;

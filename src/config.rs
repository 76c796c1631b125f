//! CLI argument parsing and ambient configuration.
//!
//! `tib888-accounter`'s `Cargo.toml` declares both `clap` (with `derive`
//! and `env` features) and `dotenv`, neither exercised by its own
//! `main.rs`. This module is where this rendition actually uses them:
//! every timeout in `spec.md` §5 is a `Config` field with a `clap` `env`
//! fallback, per the Design Notes' "surface them as configuration for
//! tests" recommendation.

use std::time::Duration;

use clap::{Args, Parser};

/// `<prog> <BankName> <ServerFifoName>` (`spec.md` §6).
#[derive(Debug, Parser)]
#[clap(name = "bank_server", about = "Bank simulator server")]
pub struct ServerArgs {
    /// Name of the bank; also the `<BankName>.bankLog` file stem.
    #[clap(env = "BANK_NAME")]
    pub bank_name: String,

    /// Name of the well-known server FIFO, created under `/tmp`.
    #[clap(env = "BANK_SERVER_FIFO")]
    pub server_fifo_name: String,

    #[clap(flatten)]
    pub timeouts: TimeoutArgs,
}

/// `<prog> <ClientFile> <ServerFifoName>` (`spec.md` §6).
#[derive(Debug, Parser)]
#[clap(name = "bank_client", about = "Bank simulator client")]
pub struct ClientArgs {
    /// Path to the text file of operations to submit.
    #[clap(env = "BANK_CLIENT_FILE")]
    pub client_file: String,

    /// Name of the well-known server FIFO, under `/tmp`.
    #[clap(env = "BANK_SERVER_FIFO")]
    pub server_fifo_name: String,

    #[clap(flatten)]
    pub timeouts: TimeoutArgs,
}

/// Every blocking operation's deadline, as an explicit parameter rather
/// than an ambient constant (`spec.md` §9). Defaults match §5's
/// approximate figures.
#[derive(Debug, Clone, Copy, Args)]
pub struct TimeoutArgs {
    /// Client's overall per-batch deadline, in milliseconds.
    #[clap(long, env = "BANK_CLIENT_BATCH_DEADLINE_MS", default_value = "30000")]
    pub client_batch_deadline_ms: u64,

    /// Client's per-FIFO readiness poll interval, in milliseconds.
    #[clap(long, env = "BANK_CLIENT_POLL_INTERVAL_MS", default_value = "250")]
    pub client_poll_interval_ms: u64,

    /// Teller's deadline waiting for the arbiter's response, in milliseconds.
    #[clap(long, env = "BANK_TELLER_RESPONSE_DEADLINE_MS", default_value = "3000")]
    pub teller_response_deadline_ms: u64,

    /// Teller's retry window opening the client's response FIFO, in milliseconds.
    #[clap(long, env = "BANK_TELLER_OPEN_RETRY_MS", default_value = "500")]
    pub teller_open_retry_ms: u64,

    /// Dispatcher's per-iteration readiness-poll deadline, in milliseconds.
    #[clap(long, env = "BANK_DISPATCHER_POLL_MS", default_value = "100")]
    pub dispatcher_poll_ms: u64,
}

impl TimeoutArgs {
    pub fn client_batch_deadline(&self) -> Duration {
        Duration::from_millis(self.client_batch_deadline_ms)
    }

    pub fn client_poll_interval(&self) -> Duration {
        Duration::from_millis(self.client_poll_interval_ms)
    }

    pub fn teller_response_deadline(&self) -> Duration {
        Duration::from_millis(self.teller_response_deadline_ms)
    }

    pub fn teller_open_retry(&self) -> Duration {
        Duration::from_millis(self.teller_open_retry_ms)
    }

    pub fn dispatcher_poll(&self) -> Duration {
        Duration::from_millis(self.dispatcher_poll_ms)
    }
}

impl Default for TimeoutArgs {
    fn default() -> Self {
        TimeoutArgs {
            client_batch_deadline_ms: 30_000,
            client_poll_interval_ms: 250,
            teller_response_deadline_ms: 3_000,
            teller_open_retry_ms: 500,
            dispatcher_poll_ms: 100,
        }
    }
}

/// Loads a `.env` file if present (no-op, not an error, if absent) and
/// initializes `pretty_env_logger`. Called once at the top of each `main`.
pub fn init_ambient_environment() {
    dotenv::dotenv().ok();
    let _ = pretty_env_logger::try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_spec_approximations() {
        let t = TimeoutArgs::default();
        assert_eq!(t.client_batch_deadline(), Duration::from_secs(30));
        assert_eq!(t.teller_response_deadline(), Duration::from_secs(3));
        assert_eq!(t.teller_open_retry(), Duration::from_millis(500));
    }
}

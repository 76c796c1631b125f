//! The arbiter and batch dispatcher (C6 of `spec.md` §4.6).
//!
//! Generalizes `account_hub.rs`'s `AccountHub::execute` shape — "spawn one
//! task per key, message it over an `mpsc::channel`, the task is the only
//! mutator of its state" — from one task per client key to a single
//! arbiter task owning the whole `Database` plus `LogStore`. Every teller
//! reaches the arbiter over a shared `mpsc::Sender`, and the arbiter
//! replies on a per-call `oneshot` channel, which is the in-process
//! analogue of the two named pipes (`server→teller`, `teller→server`) the
//! spec describes; only the client-facing FIFO, opened by a real OS
//! process boundary, remains a named pipe (see `teller.rs`).
//!
//! Per-batch fan-out uses `tokio::task::JoinSet`, the idiomatic tokio
//! equivalent of `spec.md` §4.6's "readiness loop... non-blocking reaping
//! of completed workers": `JoinSet::join_next` yields each teller as it
//! finishes, in whatever order they complete, never blocking on a
//! specific one.

#[cfg(feature = "simulate-delays")]
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::account::{AccountId, Database, Mutation};
use crate::batch::{Batch, MAX_BATCH_SIZE};
use crate::config::TimeoutArgs;
use crate::error::BankError;
use crate::log_store::LogStore;
use crate::teller;
use crate::wire::{ClientRequest, OpCode, ServerResponse, Target};

/// What a teller sends the arbiter: structurally identical to the
/// client→server wire record (`spec.md` §4.3/§4.6 call this a
/// "teller-request record").
pub type TellerRequest = ClientRequest;

type ArbiterMessage = (TellerRequest, oneshot::Sender<ServerResponse>);

#[derive(Clone)]
pub struct ArbiterHandle {
    sender: mpsc::Sender<ArbiterMessage>,
}

impl ArbiterHandle {
    /// Sends one teller request and awaits its response. Used by
    /// `teller::run` (`spec.md` §4.7 steps 4-5).
    pub async fn call(&self, request: TellerRequest) -> Option<ServerResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send((request, reply_tx)).await.is_err() {
            return None;
        }
        reply_rx.await.ok()
    }
}

/// Owns the database and log store exclusively; the sole writer, per
/// `spec.md` §4.2/§4.6.
pub struct Arbiter {
    db: Database,
    log: LogStore,
}

impl Arbiter {
    /// Spawns the arbiter as a background task and returns a cloneable
    /// handle to reach it, plus the task's `JoinHandle`. `MAX_BATCH_SIZE`
    /// bounds the channel since at most one batch's worth of tellers are
    /// live at a time under §5's one-batch-at-a-time ingress discipline.
    ///
    /// Mirrors `account_hub.rs`'s `AccountHub::summarize`: dropping every
    /// clone of the returned `ArbiterHandle` closes the channel, the task
    /// loop exits, and the `JoinHandle` yields back the owned `Database`
    /// and `LogStore` — the only way to reclaim them, since the task is
    /// their sole owner while it runs. `server.rs` uses this on shutdown
    /// to produce the snapshot.
    pub fn spawn(db: Database, log: LogStore) -> (ArbiterHandle, tokio::task::JoinHandle<(Database, LogStore)>) {
        let (sender, receiver) = mpsc::channel(MAX_BATCH_SIZE);
        let arbiter = Arbiter { db, log };
        let join_handle = tokio::spawn(arbiter.run(receiver));
        (ArbiterHandle { sender }, join_handle)
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<ArbiterMessage>) -> (Database, LogStore) {
        while let Some((request, reply)) = receiver.recv().await {
            let response = self.handle(request).await;
            // A teller that has already timed out and walked away simply
            // drops its receiver; a dropped reply is not an error here.
            let _ = reply.send(response);
        }
        (self.db, self.log)
    }

    async fn handle(&mut self, request: TellerRequest) -> ServerResponse {
        #[cfg(feature = "simulate-delays")]
        tokio::time::sleep(Duration::from_millis(1000)).await;

        let client_index = request.operation_index;

        if request.op == OpCode::Withdraw && request.target == Target::New {
            // Defensive fallback: `teller::run` rejects this before ever
            // reaching the arbiter (`spec.md` §4.7 step 3).
            return ServerResponse::failure(
                AccountId::new(1),
                &BankError::InvalidOperation("new clients cannot withdraw".into()),
                client_index,
            );
        }

        let outcome: Result<Mutation, BankError> = match (request.op, request.target) {
            (OpCode::Deposit, Target::New) => self.db.open(request.amount).map_err(BankError::from),
            (OpCode::Deposit, Target::Existing(id)) => {
                self.db.deposit(id, request.amount).map_err(BankError::from)
            }
            (OpCode::Withdraw, Target::Existing(id)) => {
                self.db.withdraw(id, request.amount).map_err(BankError::from)
            }
            (OpCode::Withdraw, Target::New) => unreachable!("handled above"),
        };

        match outcome {
            Ok(mutation) => {
                if let Err(err) = self.log.append(&mutation).await {
                    // spec.md §7: a log-write failure is fatal for the
                    // server process, since memory would now diverge from
                    // the durable record.
                    log::error!("fatal: log append failed, shutting down: {err}");
                    std::process::exit(1);
                }
                ServerResponse::success(mutation.id, mutation.balance_after, client_index)
            }
            Err(err) => {
                let id = match request.target {
                    Target::Existing(id) => id,
                    Target::New => AccountId::new(1),
                };
                ServerResponse::failure(id, &err, client_index)
            }
        }
    }

}

/// Fans a batch out to one teller task per operation, then waits for all
/// of them without ever blocking on a specific one (`spec.md` §4.6).
pub async fn dispatch_batch(
    batch: Batch,
    arbiter: ArbiterHandle,
    timeouts: TimeoutArgs,
    shutdown: CancellationToken,
) {
    let mut tellers: JoinSet<()> = JoinSet::new();
    let total = batch.requests.len();

    for request in batch.requests {
        let arbiter = arbiter.clone();
        let shutdown = shutdown.clone();
        tellers.spawn(async move {
            teller::run(request, arbiter, timeouts, shutdown).await;
        });
    }

    let mut completed = 0usize;
    loop {
        if completed == total {
            break;
        }
        tokio::select! {
            _ = shutdown.cancelled() => {
                tellers.abort_all();
                break;
            }
            joined = tokio::time::timeout(timeouts.dispatcher_poll(), tellers.join_next()) => {
                match joined {
                    Ok(Some(result)) => {
                        if let Err(join_err) = result {
                            log::warn!("teller task did not exit cleanly: {join_err}");
                        }
                        completed += 1;
                    }
                    Ok(None) => break, // JoinSet drained
                    Err(_elapsed) => continue, // poll timeout, loop and reap again
                }
            }
        }
    }
}

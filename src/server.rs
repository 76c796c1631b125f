//! Server lifecycle and shutdown (C8 of `spec.md` §4.8), plus the
//! "single server-scoped value" design encouraged by `spec.md` §9 in
//! place of ambient globals (the original C server keeps `bankDb`,
//! `logFile`, and `serverFifo` as file-scope globals — see
//! `examples/original_source/BankServer.c`): everything here is threaded
//! explicitly through `run_server`'s locals instead.
//!
//! Shutdown uses a `tokio_util::sync::CancellationToken` fanned to
//! ingress, the per-batch dispatch loop, and every teller, per the
//! redesign note in `spec.md` §9. `CancellationToken::cancel` is already
//! idempotent, which satisfies §4.8 step 1 ("becomes idempotent to
//! re-entry") for free.

use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::account::{AccountId, Database};
use crate::batch::Batch;
use crate::config::{ServerArgs, TimeoutArgs};
use crate::dispatcher::{self, Arbiter};
use crate::fifo;
use crate::ingress;
use crate::log_store::LogStore;

/// Runs the server to completion: boot, serve, and a clean shutdown once a
/// termination signal arrives. Returns once the shutdown sequence
/// (snapshot + FIFO cleanup) has finished.
pub async fn run_server(args: ServerArgs) {
    let ServerArgs {
        bank_name,
        server_fifo_name,
        timeouts,
    } = args;

    println!("bank_server {bank_name} #{server_fifo_name}");
    println!("{bank_name} is active...");

    let (log, replayed) = LogStore::open(&bank_name)
        .await
        .unwrap_or_else(|e| panic!("failed to open bank log: {e}"));

    if replayed.found_existing {
        let active = replayed.balances.values().filter(|&&b| b > 0).count();
        println!("Previous logs found. Restored {active} active accounts to the bank database.");
    } else {
        println!("No previous logs.. Creating the bank database");
    }

    let db = if replayed.found_existing {
        Database::from_replayed(replayed.balances, replayed.max_id_seen)
    } else {
        Database::new()
    };

    let (arbiter, arbiter_join) = Arbiter::spawn(db, log);
    let shutdown = CancellationToken::new();

    let (batch_tx, batch_rx) = mpsc::channel::<Batch>(16);

    let ingress_handle = tokio::spawn(ingress::run(
        server_fifo_name.clone(),
        batch_tx,
        shutdown.clone(),
    ));

    let dispatch_handle = tokio::spawn(dispatch_loop(
        batch_rx,
        arbiter.clone(),
        timeouts,
        shutdown.clone(),
    ));

    wait_for_termination_signal().await;
    log::info!("{bank_name} received shutdown signal");

    // §4.8 steps 2-3: fan cancellation out, give outstanding work a brief
    // window to wind down.
    shutdown.cancel();
    let _ = ingress_handle.await;
    let _ = dispatch_handle.await;

    // Drop our own handle to the arbiter so its channel can finally close
    // (every teller's clone is already gone, since dispatch_loop only
    // returns once every dispatched batch has drained its JoinSet).
    drop(arbiter);
    let (db, mut log) = arbiter_join
        .await
        .unwrap_or_else(|e| panic!("arbiter task panicked: {e}"));

    // §4.8 step 4: snapshot still-active accounts, then the end marker.
    let snapshot: Vec<(AccountId, u64)> = db
        .active_accounts()
        .map(|a| (a.id(), a.balance()))
        .collect();
    if let Err(e) = log.append_snapshot(snapshot.into_iter()).await {
        log::error!("failed to write shutdown snapshot: {e}");
    }

    // §4.8 step 5: remove the server fifo.
    fifo::remove_fifo(&fifo::server_fifo_path(&server_fifo_name));

    println!("{bank_name} says \"Bye\"...");
}

/// One batch at a time is *accepted* from ingress, but each batch's
/// dispatch runs concurrently with the next batch's acceptance — only the
/// framing is serial (`spec.md` §5: "the server processes the next batch
/// only after the current one has been dispatched", not after it
/// finishes). On shutdown, waits (bounded) for in-flight batches to drain
/// before returning, so every teller has released its `ArbiterHandle`
/// clone by the time the caller drops its own.
async fn dispatch_loop(
    mut batch_rx: mpsc::Receiver<Batch>,
    arbiter: dispatcher::ArbiterHandle,
    timeouts: TimeoutArgs,
    shutdown: CancellationToken,
) {
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            maybe_batch = batch_rx.recv() => {
                match maybe_batch {
                    Some(batch) => {
                        let arbiter = arbiter.clone();
                        let batch_shutdown = shutdown.clone();
                        in_flight.spawn(dispatcher::dispatch_batch(batch, arbiter, timeouts, batch_shutdown));
                    }
                    None => break,
                }
            }
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    log::warn!("batch dispatch task did not exit cleanly: {e}");
                }
            }
        }
    }

    let _ = tokio::time::timeout(Duration::from_secs(2), async {
        while in_flight.join_next().await.is_some() {}
    })
    .await;
}

async fn wait_for_termination_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

//! Server ingress (C5 of `spec.md` §4.5): reads the shared server FIFO and
//! reframes the stream of individual request records into per-client
//! batches.
//!
//! The reframing state machine follows `spec.md` §4.5 exactly: track a
//! current partial batch keyed by `client_pid`; a record from a different
//! pid (or no batch yet active) flushes any partial batch before starting
//! a new one; a batch completing (`received == total`) flushes and resets.

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::batch::{Batch, PartialBatch};
use crate::fifo;
use crate::wire::ClientRequest;

/// One iteration of the ingress loop: open the server FIFO for reading
/// (plus a self-held write end so the read side never observes EOF when
/// the last client disconnects, per `spec.md` §4.5), then read records
/// and reframe them into batches, handing each completed batch to
/// `batch_sender`.
pub async fn run(
    server_fifo_name: String,
    batch_sender: mpsc::Sender<Batch>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let path = fifo::server_fifo_path(&server_fifo_name);
    fifo::create_fifo(&path)?;

    // A descriptor this process holds open for writing guarantees the
    // read side never sees end-of-file, even when no client is connected.
    let _self_writer = fifo::open_write_blocking(&path).await?;
    let mut reader = fifo::open_read_blocking(&path).await?;

    let mut current: Option<PartialBatch> = None;
    let mut record_buf = vec![0u8; 512];

    loop {
        let read_result = tokio::select! {
            _ = shutdown.cancelled() => {
                log::info!("ingress shutting down");
                break;
            }
            result = reader.read(&mut record_buf) => result,
        };

        let n = match read_result {
            Ok(0) => continue, // no writer currently connected; keep polling
            Ok(n) => n,
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                log::warn!("ingress read error: {e}");
                continue;
            }
        };

        let request = match ClientRequest::decode(&record_buf[..n]) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("ingress discarding malformed record: {err}");
                continue;
            }
        };

        reframe(request, &mut current, &batch_sender).await;
    }

    if let Some(partial) = current.take() {
        if !partial.is_empty() {
            let _ = batch_sender.send(partial.into_batch()).await;
        }
    }

    fifo::remove_fifo(&path);
    Ok(())
}

async fn reframe(
    request: ClientRequest,
    current: &mut Option<PartialBatch>,
    batch_sender: &mpsc::Sender<Batch>,
) {
    let needs_new_batch = match current {
        None => true,
        Some(partial) => partial.client_pid != request.client_pid,
    };

    if needs_new_batch {
        if let Some(partial) = current.take() {
            if !partial.is_empty() {
                let _ = batch_sender.send(partial.into_batch()).await;
            }
        }
        *current = Some(PartialBatch {
            client_pid: request.client_pid,
            total: request.batch_size,
            requests: Vec::new(),
        });
    }

    let partial = current.as_mut().expect("just ensured Some");
    partial.requests.push(request);

    if partial.is_complete() {
        let partial = current.take().expect("checked Some above");
        let _ = batch_sender.send(partial.into_batch()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountId;
    use crate::wire::{OpCode, Target};

    fn req(pid: u32, total: u32, idx: u32) -> ClientRequest {
        ClientRequest {
            client_pid: pid,
            op: OpCode::Deposit,
            amount: 1,
            target: Target::Existing(AccountId::new(1)),
            batch_size: total,
            operation_index: idx,
        }
    }

    #[tokio::test]
    async fn reframes_one_complete_batch() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut current = None;
        reframe(req(1, 2, 1), &mut current, &tx).await;
        assert!(rx.try_recv().is_err());
        reframe(req(1, 2, 2), &mut current, &tx).await;
        let batch = rx.try_recv().unwrap();
        assert_eq!(batch.client_pid, 1);
        assert_eq!(batch.requests.len(), 2);
        assert!(current.is_none());
    }

    #[tokio::test]
    async fn new_client_flushes_prior_partial_batch() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut current = None;
        reframe(req(1, 3, 1), &mut current, &tx).await; // client 1 sends 1 of 3
        reframe(req(2, 1, 1), &mut current, &tx).await; // client 2 interleaves, flushing client 1's partial

        let flushed = rx.try_recv().unwrap();
        assert_eq!(flushed.client_pid, 1);
        assert_eq!(flushed.requests.len(), 1);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.client_pid, 2);
        assert_eq!(second.requests.len(), 1);
    }
}

//! The teller worker (C7 of `spec.md` §4.7): one task per operation,
//! carrying it between the client's response FIFO and the arbiter.
//!
//! Per `spec.md` §9's explicit allowance, a teller here is a `tokio::spawn`ed
//! task rather than a forked process — the per-operation response FIFO
//! still has to be a real, named, process-visible path, because it is the
//! client process that opens it by name, but the teller's own side of the
//! arbiter conversation is an in-process channel (`dispatcher::ArbiterHandle`).
//!
//! State machine: `OpenClientFifo → SendToArbiter → AwaitReply →
//! ReplyToClient → Exit`. Every failure path still attempts to deliver
//! *some* response to the client before exiting, exactly as `spec.md`
//! §4.7 requires.

use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::account::AccountId;
use crate::config::TimeoutArgs;
use crate::dispatcher::{ArbiterHandle, TellerRequest};
use crate::error::{BankError, TellerError};
use crate::fifo;
use crate::wire::{OpCode, ServerResponse, Target};

/// Runs one teller to completion. Never panics and never leaves a client
/// waiting silently if a response can be formed at all — the only case
/// with no response delivered is "the client's FIFO never opened"
/// (`spec.md` §4.7 step 2), which the client observes as its own timeout.
pub async fn run(
    request: TellerRequest,
    arbiter: ArbiterHandle,
    timeouts: TimeoutArgs,
    shutdown: CancellationToken,
) {
    let client_pid = request.client_pid;
    let operation_index = request.operation_index;
    let path = fifo::client_fifo_path(client_pid, operation_index);

    // Step: OpenClientFifo. The client creates this FIFO before sending
    // any request (`spec.md` §4.4 step 1), but may not have opened its
    // read end yet, so we retry non-blocking opens for a bounded window.
    let mut client_file = match tokio::select! {
        opened = fifo::open_write_with_retry(&path, timeouts.teller_open_retry()) => opened,
        _ = shutdown.cancelled() => {
            log::debug!("teller for {client_pid}/{operation_index} cancelled while opening client fifo");
            return;
        }
    } {
        Ok(file) => file,
        Err(err) => {
            log::warn!("teller could not open client fifo {path:?}: {err}; client will time out");
            return;
        }
    };

    // Step: reject illegal ops before ever bothering the arbiter.
    if request.op == OpCode::Withdraw && request.target == Target::New {
        let response = ServerResponse::failure(
            AccountId::new(1),
            &BankError::InvalidOperation("new clients cannot withdraw".into()),
            operation_index,
        );
        deliver(&mut client_file, &response).await;
        return;
    }

    // Step: SendToArbiter + AwaitReply, bounded by the response deadline.
    let response = match tokio::time::timeout(
        timeouts.teller_response_deadline(),
        arbiter.call(request),
    )
    .await
    {
        Ok(Some(response)) => response,
        Ok(None) => {
            log::warn!("arbiter channel closed on teller for {client_pid}/{operation_index}");
            ServerResponse::failure(
                AccountId::new(1),
                &BankError::from(TellerError::ArbiterChannelClosed),
                operation_index,
            )
        }
        Err(_elapsed) => ServerResponse::failure(
            AccountId::new(1),
            &BankError::from(TellerError::ArbiterTimeout),
            operation_index,
        ),
    };

    // Step: ReplyToClient, then Exit.
    deliver(&mut client_file, &response).await;
}

async fn deliver(client_file: &mut tokio::fs::File, response: &ServerResponse) {
    let bytes = match response.encode() {
        Ok(bytes) => bytes,
        Err(err) => {
            log::error!("failed to encode response, dropping it: {err}");
            return;
        }
    };
    if let Err(err) = client_file.write_all(&bytes).await {
        log::warn!("failed to deliver response to client: {err}");
    }
    let _ = client_file.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Database;
    use crate::dispatcher::Arbiter;
    use crate::log_store::LogStore;
    use crate::wire::ClientRequest;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    async fn test_arbiter() -> (ArbiterHandle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let bank = dir.path().join("TellerTestBank");
        let (log, _replayed) = LogStore::open(bank.to_str().unwrap()).await.unwrap();
        let (handle, _join) = Arbiter::spawn(Database::new(), log);
        (handle, dir)
    }

    #[tokio::test]
    async fn teller_delivers_response_to_waiting_client() {
        let (arbiter, _db_dir) = test_arbiter().await;
        let fifo_dir = tempfile::tempdir().unwrap();
        let path = fifo_dir.path().join("bank_cl_1_1");
        fifo::create_fifo(&path).unwrap();

        let request = ClientRequest {
            client_pid: 1,
            op: OpCode::Deposit,
            amount: 300,
            target: Target::New,
            batch_size: 1,
            operation_index: 1,
        };

        // Point the teller at our temp-dir fifo by constructing the same
        // path it would derive from (pid, index); since fifo::client_fifo_path
        // is rooted at /tmp, exercise the lower-level pieces directly here
        // instead of `teller::run`, which always targets /tmp.
        let reader_path = path.clone();
        let reader = tokio::spawn(async move {
            let mut file = tokio::time::timeout(Duration::from_secs(2), async {
                loop {
                    match fifo::try_open_read_nonblocking(&reader_path) {
                        Ok(f) => break tokio::fs::File::from_std(f),
                        Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
                    }
                }
            })
            .await
            .unwrap();
            let mut buf = Vec::new();
            file.read_to_end(&mut buf).await.unwrap();
            buf
        });

        let mut writer = fifo::open_write_with_retry(&path, Duration::from_secs(2))
            .await
            .unwrap();
        let response = arbiter.call(request).await.unwrap();
        deliver(&mut writer, &response).await;
        drop(writer);

        let bytes = reader.await.unwrap();
        let decoded = ServerResponse::decode(&bytes).unwrap();
        assert!(decoded.is_success());
        assert_eq!(decoded.balance, 300);
    }
}

//! The client batch driver (C4 of `spec.md` §4.4): reads an operations
//! file, opens one response FIFO per operation before sending anything,
//! submits the whole batch down the server FIFO, then multiplexes across
//! the per-operation FIFOs until every response has arrived or the
//! overall deadline expires.
//!
//! Mirrors `examples/original_source/BankClient.c`'s own shape: connect,
//! print one line per operation as it is read, submit, then poll; the
//! per-client console output (`Client%02d ...`) is this module's direct
//! descendant of that file's `printf` calls.

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;
use tokio::time::Instant;

use crate::account::AccountId;
use crate::config::{ClientArgs, TimeoutArgs};
use crate::fifo;
use crate::parser::{self, OperationKind, OperationLine};
use crate::wire::{ClientRequest, OpCode, ServerResponse, Target};

/// Runs one client process to completion: parse, connect, submit, collect,
/// print, clean up. Never returns an error for an individual operation's
/// failure — those are reported to the console per `spec.md` §4.4 step 6
/// and §7; this only returns `Err` for conditions that make the whole
/// batch impossible to run at all (bad file, no server).
pub async fn run(args: ClientArgs) -> std::io::Result<()> {
    let ClientArgs {
        client_file,
        server_fifo_name,
        timeouts,
    } = args;

    println!("Reading {client_file}..");
    let operations = parser::parse_operations_file(std::path::Path::new(&client_file))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;

    if operations.is_empty() {
        eprintln!("Error: No valid operations found in client file");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "empty client file",
        ));
    }

    println!("{} clients to connect.. creating clients..", operations.len());

    let client_pid = std::process::id();
    let batch_size = operations.len() as u32;

    // Step 1: create every per-operation response FIFO before sending
    // anything, so a teller's first non-blocking open attempt always has
    // somewhere to find (spec.md §4.4 step 1).
    let mut fifo_paths = Vec::with_capacity(operations.len());
    for idx in 0..operations.len() {
        let operation_index = (idx + 1) as u32;
        let path = fifo::client_fifo_path(client_pid, operation_index);
        fifo::create_fifo(&path)?;
        fifo_paths.push(path);
    }

    let cleanup = |paths: &[PathBuf]| {
        for path in paths {
            fifo::remove_fifo(path);
        }
    };

    // Step 2: open the server fifo for writing. This blocks until the
    // server has its read end open, matching BankClient.c's own blocking
    // `open(serverFifo, O_WRONLY)`.
    let server_path = fifo::server_fifo_path(&server_fifo_name);
    let mut server_file = match fifo::open_write_blocking(&server_path).await {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Cannot connect {server_fifo_name}...\nexiting..");
            cleanup(&fifo_paths);
            return Err(e);
        }
    };
    println!("Connected to Adabank..");

    // Step 3: submit every request in the batch.
    for (idx, op) in operations.iter().enumerate() {
        let operation_index = (idx + 1) as u32;
        print!("Client{operation_index:02} connected..");
        describe(op);
        let request = to_request(client_pid, batch_size, operation_index, op);
        let bytes = request
            .encode()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        server_file.write_all(&bytes).await?;
    }
    server_file.flush().await?;
    drop(server_file);

    // Step 4: multiplex across the per-operation fifos until every
    // response arrives or the overall deadline expires (spec.md §4.4
    // step 4: ~30s total, ~250ms per-fifo poll).
    let deadline = Instant::now() + timeouts.client_batch_deadline();
    let mut responses: Vec<Option<ServerResponse>> = vec![None; operations.len()];
    let mut pending: Vec<usize> = (0..operations.len()).collect();

    while !pending.is_empty() && Instant::now() < deadline {
        let mut still_pending = Vec::with_capacity(pending.len());
        for idx in pending.drain(..) {
            match try_read_response(&fifo_paths[idx]).await {
                Some(response) => responses[idx] = Some(response),
                None => still_pending.push(idx),
            }
        }
        pending = still_pending;
        if !pending.is_empty() {
            tokio::time::sleep(timeouts.client_poll_interval()).await;
        }
    }

    // Step 5: report each operation's outcome, in submission order.
    for (idx, op) in operations.iter().enumerate() {
        let operation_index = (idx + 1) as u32;
        match &responses[idx] {
            Some(response) if response.is_success() => {
                report_success(operation_index, op, response);
            }
            Some(response) => {
                println!("Client{operation_index:02} something went WRONG: {}", response.message);
            }
            None => {
                println!(
                    "Client{operation_index:02} something went WRONG: no response for operation {operation_index}"
                );
            }
        }
    }

    cleanup(&fifo_paths);
    println!("exiting..");
    Ok(())
}

fn describe(op: &OperationLine) {
    match op.kind {
        OperationKind::Deposit => println!("depositing {} credits", op.amount),
        OperationKind::Withdraw => println!("withdrawing {} credits", op.amount),
    }
}

fn to_request(
    client_pid: u32,
    batch_size: u32,
    operation_index: u32,
    op: &OperationLine,
) -> ClientRequest {
    ClientRequest {
        client_pid,
        op: match op.kind {
            OperationKind::Deposit => OpCode::Deposit,
            OperationKind::Withdraw => OpCode::Withdraw,
        },
        amount: op.amount,
        target: match op.target {
            Some(id) => Target::Existing(id),
            None => Target::New,
        },
        batch_size,
        operation_index,
    }
}

/// A success response with `balance == 0` on a `Withdraw` means the
/// account was just closed by this very withdrawal (`spec.md` §4.4 step
/// 5 / §7); everything else prints the served account id only, matching
/// `examples/original_source/BankClient.c`'s `processResponse`.
fn report_success(operation_index: u32, op: &OperationLine, response: &ServerResponse) {
    if op.kind == OperationKind::Withdraw && response.balance == 0 {
        println!("Client{operation_index:02} served.. account closed");
    } else {
        println!("Client{operation_index:02} served.. {}", response.id);
    }
}

/// One non-blocking attempt to read a complete response from `path`.
/// Returns `None` if no writer (the teller) has connected yet, or the
/// open/read otherwise didn't produce a full record this time around.
async fn try_read_response(path: &PathBuf) -> Option<ServerResponse> {
    let std_file = fifo::try_open_read_nonblocking(path).ok()?;
    let mut file = tokio::fs::File::from_std(std_file);
    let mut buf = vec![0u8; 512];
    use tokio::io::AsyncReadExt;
    let n = file.read(&mut buf).await.ok()?;
    if n == 0 {
        return None;
    }
    ServerResponse::decode(&buf[..n]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_success_detects_account_closure() {
        let op = OperationLine {
            kind: OperationKind::Withdraw,
            target: Some(AccountId::new(1)),
            amount: 500,
        };
        let response = ServerResponse::success(AccountId::new(1), 0, 1);
        // Smoke-test only: report_success prints rather than returning a
        // value, so just confirm it doesn't panic on the "closed" path.
        report_success(42, &op, &response);
    }
}

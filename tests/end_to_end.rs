//! End-to-end scenarios driving the real `bank_server`/`bank_client`
//! binaries over real FIFOs, mirroring the literal scenarios this system
//! is built around: open-and-grow, close-by-withdraw, insufficient
//! funds, unknown account, invalid new-client withdraw, and recovery
//! after a restart.
//!
//! Styled after `yvan-sraka-tx-csv-001`'s own `assert_cmd`-driven
//! `main.rs` test: locate the binary under test, feed it a file, assert
//! on its stdout. The server here additionally needs to be started as a
//! background process and stopped with `SIGTERM` once a batch has had
//! time to be served, since (unlike the client) it never exits on its
//! own.

use std::io::Write;
use std::process::{Child, Command};
use std::time::{Duration, Instant};

use assert_cmd::prelude::*;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use predicates::prelude::*;

struct Server {
    child: Child,
    fifo_name: String,
}

impl Server {
    fn start(dir: &std::path::Path, bank_name: &str, fifo_name: &str) -> Self {
        let child = Command::cargo_bin("bank_server")
            .unwrap()
            .current_dir(dir)
            .arg(bank_name)
            .arg(fifo_name)
            .spawn()
            .expect("failed to start bank_server");

        let path = format!("/tmp/{fifo_name}");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !std::path::Path::new(&path).exists() {
            assert!(Instant::now() < deadline, "server fifo never appeared");
            std::thread::sleep(Duration::from_millis(20));
        }

        Server {
            child,
            fifo_name: fifo_name.to_string(),
        }
    }

    fn shutdown(mut self) {
        let pid = Pid::from_raw(self.child.id() as i32);
        let _ = signal::kill(pid, Signal::SIGTERM);
        let _ = self.child.wait();
        let _ = std::fs::remove_file(format!("/tmp/{}", self.fifo_name));
    }
}

fn unique_name(tag: &str) -> String {
    format!("E2E_{tag}_{}", std::process::id())
}

fn write_ops_file(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

fn run_client(dir: &std::path::Path, ops_file: &std::path::Path, fifo_name: &str) -> assert_cmd::assert::Assert {
    let output = Command::cargo_bin("bank_client")
        .unwrap()
        .current_dir(dir)
        .arg(ops_file)
        .arg(fifo_name)
        .output()
        .expect("failed to run bank_client");
    output.assert()
}

#[test]
fn open_and_grow() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("OpenGrow");
    let fifo = unique_name("OpenGrowFifo");
    let server = Server::start(dir.path(), &bank, &fifo);

    let ops = write_ops_file(dir.path(), "ops1.txt", "N deposit 300\n");
    let assert = run_client(dir.path(), &ops, &fifo);
    assert
        .success()
        .stdout(predicate::str::contains("served.. BankID_1"));

    server.shutdown();
}

#[test]
fn close_by_withdraw() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("CloseBank");
    let fifo = unique_name("CloseFifo");
    let server = Server::start(dir.path(), &bank, &fifo);

    let ops = write_ops_file(dir.path(), "ops_open.txt", "N deposit 500\n");
    run_client(dir.path(), &ops, &fifo).success();

    let ops2 = write_ops_file(dir.path(), "ops_close.txt", "BankID_1 withdraw 500\n");
    run_client(dir.path(), &ops2, &fifo)
        .success()
        .stdout(predicate::str::contains("account closed"));

    server.shutdown();
}

#[test]
fn insufficient_funds_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("InsufficientBank");
    let fifo = unique_name("InsufficientFifo");
    let server = Server::start(dir.path(), &bank, &fifo);

    let ops = write_ops_file(dir.path(), "ops_open.txt", "N deposit 50\n");
    run_client(dir.path(), &ops, &fifo).success();

    let ops2 = write_ops_file(dir.path(), "ops_withdraw.txt", "BankID_1 withdraw 100\n");
    run_client(dir.path(), &ops2, &fifo)
        .success()
        .stdout(predicate::str::contains("insufficient funds"));

    server.shutdown();
}

#[test]
fn unknown_account_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("UnknownBank");
    let fifo = unique_name("UnknownFifo");
    let server = Server::start(dir.path(), &bank, &fifo);

    let ops = write_ops_file(dir.path(), "ops_unknown.txt", "BankID_99 deposit 10\n");
    run_client(dir.path(), &ops, &fifo)
        .success()
        .stdout(predicate::str::contains("no such account"));

    server.shutdown();
}

#[test]
fn new_client_withdraw_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("RejectBank");
    let fifo = unique_name("RejectFifo");
    let server = Server::start(dir.path(), &bank, &fifo);

    let ops = write_ops_file(dir.path(), "ops_invalid.txt", "N withdraw 10\n");
    run_client(dir.path(), &ops, &fifo)
        .success()
        .stdout(predicate::str::contains("something went WRONG"));

    server.shutdown();
}

#[test]
fn recovery_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let bank = unique_name("RecoveryBank");
    let fifo1 = unique_name("RecoveryFifoA");

    let server = Server::start(dir.path(), &bank, &fifo1);
    let ops = write_ops_file(
        dir.path(),
        "ops1.txt",
        "N deposit 300\nBankID_1 deposit 200\n",
    );
    run_client(dir.path(), &ops, &fifo1).success();
    server.shutdown();

    // Restart against the same bank log, under a fresh fifo name (the
    // previous one was already removed by the graceful shutdown).
    let fifo2 = unique_name("RecoveryFifoB");
    let server2 = Server::start(dir.path(), &bank, &fifo2);

    let ops2 = write_ops_file(dir.path(), "ops2.txt", "N deposit 1\n");
    run_client(dir.path(), &ops2, &fifo2)
        .success()
        .stdout(predicate::str::contains("served.. BankID_2"));

    server2.shutdown();

    let log = std::fs::read_to_string(dir.path().join(format!("{bank}.bankLog"))).unwrap();
    assert!(log.contains("BankID_1"));
}

//! FIFO lifecycle helpers shared by the client driver, server ingress, and
//! teller workers. Grounded directly in
//! `examples/original_source/BankServer.c` / `BankClient.c`: `umask(0)`
//! then `mkfifo(path, FIFO_PERM)` ignoring `EEXIST`, non-blocking opens
//! with a bounded retry window before switching to blocking mode.
//!
//! `tib888-accounter` has no FIFO code of its own (it never crosses a
//! process boundary); this module is the one place this rendition reaches
//! past the teacher into the rest of the pack, for `nix::unistd::mkfifo`
//! and `nix::fcntl` (both used for exactly this purpose by the libsql
//! `sqld` replication logger in the retrieval pack).

use std::os::unix::io::FromRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::stat::{umask, Mode};
use nix::unistd::mkfifo;
use tokio::fs::{File, OpenOptions};
use tokio::time::sleep;

/// `S_IRUSR | S_IWUSR | S_IWGRP`, matching `FIFO_PERM` in `bank_shared.h`.
fn fifo_mode() -> Mode {
    Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IWGRP
}

/// Server FIFO path: `/tmp/<ServerFifoName>` (`spec.md` §6).
pub fn server_fifo_path(server_fifo_name: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/{server_fifo_name}"))
}

/// Per-operation client FIFO path: `/tmp/bank_cl_<pid>_<index>` (`spec.md` §6).
pub fn client_fifo_path(client_pid: u32, operation_index: u32) -> PathBuf {
    PathBuf::from(format!("/tmp/bank_cl_{client_pid}_{operation_index}"))
}

/// Creates the FIFO at `path` with `FIFO_PERM`, ignoring "already exists"
/// (`spec.md` §4.4 step 1 / §4.8).
pub fn create_fifo(path: &Path) -> std::io::Result<()> {
    let previous = umask(Mode::empty());
    let result = mkfifo(path, fifo_mode());
    umask(previous);
    match result {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::EEXIST) => Ok(()),
        Err(e) => Err(std::io::Error::from(e)),
    }
}

pub fn remove_fifo(path: &Path) {
    let _ = std::fs::remove_file(path);
}

/// Ignores `SIGPIPE` for the whole process, mirroring the explicit
/// `signal(SIGPIPE, SIG_IGN)` every teller sets up in
/// `examples/original_source/BankServer.c`: a write to a client that has
/// already gone away should surface as an `Err` from `write`, not kill
/// the process. Rust's runtime already does this by default; called
/// anyway so both binaries don't depend on that default remaining true.
pub fn ignore_sigpipe() {
    unsafe {
        let _ = signal::signal(Signal::SIGPIPE, SigHandler::SigIgn);
    }
}

/// Opens `path` for blocking read. Used by the server ingress for the
/// shared server FIFO, which is always created before the server opens it.
pub async fn open_read_blocking(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().read(true).open(path).await
}

/// Opens `path` for blocking write. Used by the client to open the server
/// FIFO (blocks until a reader — the server — is present), per
/// `spec.md` §4.4 step 2.
pub async fn open_write_blocking(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().write(true).open(path).await
}

/// Opens `path` for writing, retrying non-blocking opens for up to
/// `timeout` before giving up. A teller uses this to open its client's
/// response FIFO without blocking forever if the client is slow to have
/// created it (`spec.md` §4.7 step 2): non-blocking open first, then a
/// regular blocking write once the peer is present.
pub async fn open_write_with_retry(path: &Path, timeout: Duration) -> std::io::Result<File> {
    let deadline = Instant::now() + timeout;
    loop {
        match nix::fcntl::open(
            path,
            OFlag::O_WRONLY | OFlag::O_NONBLOCK,
            Mode::empty(),
        ) {
            Ok(raw_fd) => {
                // Found a reader; hand the fd to tokio and drop O_NONBLOCK
                // so subsequent writes block normally.
                let std_file = unsafe { std::fs::File::from_raw_fd(raw_fd) };
                clear_nonblocking(&std_file)?;
                return Ok(File::from_std(std_file));
            }
            Err(nix::errno::Errno::ENXIO) => {
                // No reader yet (ENXIO on a FIFO opened write-only + nonblock).
                if Instant::now() >= deadline {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "client fifo never opened for reading",
                    ));
                }
                sleep(Duration::from_millis(20)).await;
            }
            Err(e) => return Err(std::io::Error::from(e)),
        }
    }
}

fn clear_nonblocking(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let fd = file.as_raw_fd();
    let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFL)
        .map_err(std::io::Error::from)?;
    let mut flags = OFlag::from_bits_truncate(flags);
    flags.remove(OFlag::O_NONBLOCK);
    nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFL(flags))
        .map_err(std::io::Error::from)?;
    Ok(())
}

/// Opens `path` for non-blocking read, used by the client's multiplexed
/// poll loop (`spec.md` §4.4 step 4). Returns `Err(ENXIO-equivalent)`
/// immediately if no writer is present yet; the caller retries opportunistically.
pub fn try_open_read_nonblocking(path: &Path) -> std::io::Result<std::fs::File> {
    let raw_fd = nix::fcntl::open(path, OFlag::O_RDONLY | OFlag::O_NONBLOCK, Mode::empty())
        .map_err(std::io::Error::from)?;
    Ok(unsafe { std::fs::File::from_raw_fd(raw_fd) })
}

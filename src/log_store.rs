//! The write-ahead log (C1 of `spec.md` §4.1): `<BankName>.bankLog`, a
//! line-oriented append-only journal that is the durable source of truth
//! across restarts.
//!
//! Grounded in the `Ledger` trait's shape in `ledger.rs`/`in_memory_ledger.rs`
//! (`insert`, fallible, async) generalized from an in-memory transaction
//! table to a real file the arbiter appends to and flushes on every commit.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::account::{AccountId, Mutation, MutationKind};
use crate::error::LogError;

/// Outcome of replaying a log file at boot.
pub struct Replayed {
    pub balances: BTreeMap<AccountId, u64>,
    pub max_id_seen: u64,
    pub found_existing: bool,
}

pub struct LogStore {
    path: PathBuf,
    file: File,
}

impl LogStore {
    /// Opens (creating if absent) `<bank_name>.bankLog`, replaying any
    /// existing content first. Malformed lines are skipped, never fatal
    /// (`spec.md` §4.1 "Failure handling").
    pub async fn open(bank_name: &str) -> Result<(Self, Replayed), LogError> {
        let path = PathBuf::from(format!("{bank_name}.bankLog"));
        let found_existing = path.exists();
        let replayed = if found_existing {
            Self::replay(&path).await?
        } else {
            Replayed {
                balances: BTreeMap::new(),
                max_id_seen: 0,
                found_existing: false,
            }
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| LogError::Open {
                path: path.display().to_string(),
                source,
            })?;

        if found_existing {
            let separator = format!("# {bank_name} log file reopened\n");
            file.write_all(separator.as_bytes())
                .await
                .map_err(LogError::Append)?;
            file.flush().await.map_err(LogError::Flush)?;
        } else {
            let header = format!("# {bank_name} bank log\n");
            file.write_all(header.as_bytes())
                .await
                .map_err(LogError::Append)?;
            file.flush().await.map_err(LogError::Flush)?;
        }

        Ok((
            LogStore { path, file },
            Replayed {
                found_existing,
                ..replayed
            },
        ))
    }

    async fn replay(path: &Path) -> Result<Replayed, LogError> {
        let file = File::open(path).await.map_err(|source| LogError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let mut lines = BufReader::new(file).lines();
        let mut balances: BTreeMap<AccountId, u64> = BTreeMap::new();
        let mut max_id_seen = 0u64;

        while let Some(line) = lines.next_line().await.map_err(LogError::Append)? {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((id, balance)) = parse_log_line(line) {
                max_id_seen = max_id_seen.max(id.value());
                balances.insert(id, balance);
            }
            // malformed lines are silently skipped; recovery never aborts.
        }

        Ok(Replayed {
            balances,
            max_id_seen,
            found_existing: true,
        })
    }

    /// Appends one mutation record and flushes before returning, per the
    /// write-ahead discipline in `spec.md` §9: the caller must not treat
    /// the in-memory mutation as committed until this returns `Ok`.
    pub async fn append(&mut self, mutation: &Mutation) -> Result<(), LogError> {
        let kind = match mutation.kind {
            MutationKind::Deposit => 'D',
            MutationKind::Withdraw => 'W',
        };
        let line = format!(
            "{} {} {} {}\n",
            mutation.id, kind, mutation.amount, mutation.balance_after
        );
        self.file
            .write_all(line.as_bytes())
            .await
            .map_err(LogError::Append)?;
        self.file.flush().await.map_err(LogError::Flush)
    }

    /// Appends the shutdown snapshot: one `<id> D 0 <balance>` line per
    /// still-active account, then the `## end of log.` marker. Replay
    /// ignores the `0` amount field and only looks at `balance_after`, so
    /// this simply reasserts last-known balances (`spec.md` §4.1).
    pub async fn append_snapshot<'a>(
        &mut self,
        active: impl Iterator<Item = (AccountId, u64)>,
    ) -> Result<(), LogError> {
        for (id, balance) in active {
            let line = format!("{id} D 0 {balance}\n");
            self.file
                .write_all(line.as_bytes())
                .await
                .map_err(LogError::Append)?;
        }
        self.file
            .write_all(b"## end of log.\n")
            .await
            .map_err(LogError::Append)?;
        self.file.flush().await.map_err(LogError::Flush)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Parses `<id> <D|W> <amount> <balance_after>`. Returns `None` (skip,
/// don't fail) on any malformed line.
fn parse_log_line(line: &str) -> Option<(AccountId, u64)> {
    let mut parts = line.split_whitespace();
    let id: AccountId = parts.next()?.parse().ok()?;
    let kind = parts.next()?;
    if kind != "D" && kind != "W" {
        return None;
    }
    let _amount: u64 = parts.next()?.parse().ok()?;
    let balance_after: u64 = parts.next()?.parse().ok()?;
    Some((id, balance_after))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_log_has_no_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let bank = dir.path().join("FreshBank");
        let name = bank.to_str().unwrap();
        let (store, replayed) = LogStore::open(name).await.unwrap();
        assert!(!replayed.found_existing);
        assert!(replayed.balances.is_empty());
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn append_then_reopen_replays_final_balances() {
        let dir = tempfile::tempdir().unwrap();
        let bank = dir.path().join("ReplayBank");
        let name = bank.to_str().unwrap();

        {
            let (mut store, _) = LogStore::open(name).await.unwrap();
            store
                .append(&Mutation {
                    id: AccountId::new(1),
                    kind: MutationKind::Deposit,
                    amount: 300,
                    balance_after: 300,
                })
                .await
                .unwrap();
            store
                .append(&Mutation {
                    id: AccountId::new(1),
                    kind: MutationKind::Deposit,
                    amount: 200,
                    balance_after: 500,
                })
                .await
                .unwrap();
        }

        let (_, replayed) = LogStore::open(name).await.unwrap();
        assert!(replayed.found_existing);
        assert_eq!(replayed.max_id_seen, 1);
        assert_eq!(replayed.balances.get(&AccountId::new(1)), Some(&500));
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Malformed.bankLog");
        tokio::fs::write(
            &path,
            b"# header\nBankID_1 D 100 100\nnot a valid line\nBankID_2 X 5 5\nBankID_1 D 50 150\n",
        )
        .await
        .unwrap();

        let name_path = dir.path().join("Malformed");
        let replayed = LogStore::replay(&path).await.unwrap();
        assert_eq!(replayed.balances.get(&AccountId::new(1)), Some(&150));
        assert_eq!(replayed.balances.get(&AccountId::new(2)), None);
        let _ = name_path; // only the .bankLog path above is read directly in this test
    }

    #[tokio::test]
    async fn snapshot_round_trips_active_balances() {
        let dir = tempfile::tempdir().unwrap();
        let bank = dir.path().join("SnapshotBank");
        let name = bank.to_str().unwrap();

        {
            let (mut store, _) = LogStore::open(name).await.unwrap();
            store
                .append(&Mutation {
                    id: AccountId::new(1),
                    kind: MutationKind::Deposit,
                    amount: 10,
                    balance_after: 10,
                })
                .await
                .unwrap();
            store
                .append_snapshot(std::iter::once((AccountId::new(1), 10)))
                .await
                .unwrap();
        }

        let (_, replayed) = LogStore::open(name).await.unwrap();
        assert_eq!(replayed.balances.get(&AccountId::new(1)), Some(&10));
    }
}

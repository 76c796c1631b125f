//! The account database (C2 of `spec.md` §4.2): the sole mutator of
//! balances, serialized by the arbiter task in `dispatcher.rs`.
//!
//! Structurally this generalizes `Account::execute`'s invariant from the
//! teacher crate ("the execution order of the transactions must be kept,
//! concurrent transaction processing is forbidden") from one account's
//! ledger to the whole bank's set of accounts: `Database` is plain,
//! synchronous, `&mut self` state, and whoever holds the `&mut Database`
//! is the only writer.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::DbError;

/// `BankID_<n>`, assigned only by the database, monotonically, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(u64);

impl AccountId {
    pub fn new(n: u64) -> Self {
        AccountId(n)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BankID_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseAccountIdError;

impl FromStr for AccountId {
    type Err = ParseAccountIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n = s.strip_prefix("BankID_").ok_or(ParseAccountIdError)?;
        let n: u64 = n.parse().map_err(|_| ParseAccountIdError)?;
        if n == 0 {
            return Err(ParseAccountIdError);
        }
        Ok(AccountId(n))
    }
}

/// One customer account. `active ⇔ balance > 0` is enforced by every
/// mutator below; it is never checked after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    balance: u64,
    active: bool,
}

impl Account {
    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// One record of a committed mutation, handed to the log store for
/// durable append (`spec.md` §4.1's `<id> <D|W> <amount> <balance_after>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub id: AccountId,
    pub kind: MutationKind,
    pub amount: u64,
    pub balance_after: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Deposit,
    Withdraw,
}

/// Ordered (insertion order), id-keyed collection of accounts, plus the
/// monotonic id allocator.
#[derive(Debug, Default)]
pub struct Database {
    accounts: BTreeMap<AccountId, Account>,
    order: Vec<AccountId>,
    next_id: u64,
}

impl Database {
    pub fn new() -> Self {
        Database {
            accounts: BTreeMap::new(),
            order: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuilds a database from replayed log state: every id's *final*
    /// balance (`spec.md` §4.1 replay semantics), with `next_id` set to one
    /// past the largest numeric suffix ever observed.
    pub fn from_replayed(balances: BTreeMap<AccountId, u64>, max_id_seen: u64) -> Self {
        let mut db = Database {
            accounts: BTreeMap::new(),
            order: Vec::new(),
            next_id: max_id_seen + 1,
        };
        for (id, balance) in balances {
            db.order.push(id);
            db.accounts.insert(
                id,
                Account {
                    id,
                    balance,
                    active: balance > 0,
                },
            );
        }
        db
    }

    pub fn next_id_preview(&self) -> u64 {
        self.next_id
    }

    /// Opens a new account with an initial deposit. `amount` must be > 0;
    /// callers validate this before calling (see `DbError::InvalidAmount`).
    pub fn open(&mut self, amount: u64) -> Result<Mutation, DbError> {
        if amount == 0 {
            return Err(DbError::InvalidAmount);
        }
        let id = AccountId::new(self.next_id);
        self.next_id += 1;
        self.order.push(id);
        self.accounts.insert(
            id,
            Account {
                id,
                balance: amount,
                active: true,
            },
        );
        Ok(Mutation {
            id,
            kind: MutationKind::Deposit,
            amount,
            balance_after: amount,
        })
    }

    pub fn deposit(&mut self, id: AccountId, amount: u64) -> Result<Mutation, DbError> {
        if amount == 0 {
            return Err(DbError::InvalidAmount);
        }
        let account = self.accounts.get_mut(&id).ok_or(DbError::NoAccount)?;
        if !account.active {
            return Err(DbError::NoAccount);
        }
        account.balance = account
            .balance
            .checked_add(amount)
            .expect("balance overflow");
        Ok(Mutation {
            id,
            kind: MutationKind::Deposit,
            amount,
            balance_after: account.balance,
        })
    }

    pub fn withdraw(&mut self, id: AccountId, amount: u64) -> Result<Mutation, DbError> {
        if amount == 0 {
            return Err(DbError::InvalidAmount);
        }
        let account = self.accounts.get_mut(&id).ok_or(DbError::NoAccount)?;
        if !account.active {
            return Err(DbError::NoAccount);
        }
        if amount > account.balance {
            return Err(DbError::InsufficientFunds);
        }
        account.balance -= amount;
        if account.balance == 0 {
            account.active = false;
        }
        Ok(Mutation {
            id,
            kind: MutationKind::Withdraw,
            amount,
            balance_after: account.balance,
        })
    }

    pub fn get(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    /// Accounts still active at this moment, in insertion order — the
    /// source for the shutdown snapshot (`spec.md` §4.1).
    pub fn active_accounts(&self) -> impl Iterator<Item = &Account> {
        self.order
            .iter()
            .filter_map(move |id| self.accounts.get(id))
            .filter(|a| a.active)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }
}

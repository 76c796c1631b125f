//! Batch framing types shared between the client driver, server ingress,
//! and dispatcher (`spec.md` §3 "Batch", §4.5).

use crate::wire::ClientRequest;

/// `MAX_BATCH_SIZE` from `examples/original_source/bank_utils.h`.
pub const MAX_BATCH_SIZE: usize = 500;

/// `spec.md` §3: "at least 100 simultaneously live accounts must be
/// supported" — a floor on `Database` capacity, independent of (and
/// smaller than) `MAX_BATCH_SIZE`.
pub const MIN_LIVE_ACCOUNTS: usize = 100;

/// A fully received batch, ready for dispatch (`spec.md` §4.6).
#[derive(Debug, Clone)]
pub struct Batch {
    pub client_pid: u32,
    pub requests: Vec<ClientRequest>,
}

/// The ingress reframer's in-progress accumulator (`spec.md` §4.5).
#[derive(Debug, Default)]
pub struct PartialBatch {
    pub client_pid: u32,
    pub total: u32,
    pub requests: Vec<ClientRequest>,
}

impl PartialBatch {
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.requests.is_empty() && self.requests.len() as u32 >= self.total
    }

    pub fn into_batch(self) -> Batch {
        Batch {
            client_pid: self.client_pid,
            requests: self.requests,
        }
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

    #[test]
    fn partial_batch_completes_when_all_received() {
        let mut pb = PartialBatch {
            client_pid: 10,
            total: 2,
            requests: vec![],
        };
        pb.requests.push(req(10, 2, 1));
        assert!(!pb.is_complete());
        pb.requests.push(req(10, 2, 2));
        assert!(pb.is_complete());
    }
}

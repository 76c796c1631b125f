//! Fixed-layout request/response records exchanged over FIFOs and the
//! internal teller↔arbiter channel (C3 of `spec.md` §4.3).
//!
//! Mirrors `examples/original_source/bank_shared.h`'s `ClientRequest` /
//! `ServerResponse` structs directly rather than reaching for a generic
//! serialization crate: the whole point of this layer is a small, bounded,
//! `PIPE_BUF`-sized record that a reader can validate by inspection.
//!
//! Encoding is length-prefixed UTF-8 fields over fixed-width integers, all
//! little-endian. Every record is well under `PIPE_BUF` (512 bytes is the
//! POSIX floor) so a single `read` on a FIFO always yields exactly one
//! record (`spec.md` §4.5).

use crate::account::AccountId;
use crate::error::{BankError, WireError};

/// Original source: `#define OP_DEPOSIT 1` / `#define OP_WITHDRAW 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Deposit = 1,
    Withdraw = 2,
}

impl OpCode {
    fn to_i32(self) -> i32 {
        self as i32
    }

    fn from_i32(v: i32) -> Result<Self, WireError> {
        match v {
            1 => Ok(OpCode::Deposit),
            2 => Ok(OpCode::Withdraw),
            other => Err(WireError::UnknownOpCode(other)),
        }
    }
}

/// Either "open a new account" or an existing account id
/// (`spec.md` §3 Operation.target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    New,
    Existing(AccountId),
}

pub const BANK_ID_FIELD_LIMIT: usize = 20;
pub const MESSAGE_FIELD_LIMIT: usize = 100;

/// Client → Server request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRequest {
    pub client_pid: u32,
    pub op: OpCode,
    pub amount: u64,
    pub target: Target,
    pub batch_size: u32,
    pub operation_index: u32,
}

/// Server → Client response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerResponse {
    /// 0 on success, negative error code otherwise (`spec.md` §4.3).
    pub status: i32,
    pub balance: u64,
    pub id: AccountId,
    pub message: String,
    pub client_index: u32,
}

impl ServerResponse {
    pub fn success(id: AccountId, balance: u64, client_index: u32) -> Self {
        ServerResponse {
            status: 0,
            balance,
            id,
            message: "ok".to_string(),
            client_index,
        }
    }

    pub fn failure(id: AccountId, err: &BankError, client_index: u32) -> Self {
        ServerResponse {
            status: err.status_code(),
            balance: 0,
            id,
            message: err.message(),
            client_index,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 0
    }

    pub fn error(&self) -> Option<BankError> {
        BankError::from_status_code(self.status, &self.message)
    }
}

fn push_length_prefixed(buf: &mut Vec<u8>, field: &'static str, limit: usize, s: &str) -> Result<(), WireError> {
    if s.len() > limit {
        return Err(WireError::FieldTooLong { field, limit });
    }
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

fn read_length_prefixed<'a>(
    buf: &'a [u8],
    field: &'static str,
    cursor: &mut usize,
) -> Result<&'a str, WireError> {
    let len_bytes = buf
        .get(*cursor..*cursor + 2)
        .ok_or(WireError::Truncated { need: *cursor + 2, got: buf.len() })?;
    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    *cursor += 2;
    let bytes = buf
        .get(*cursor..*cursor + len)
        .ok_or(WireError::Truncated { need: *cursor + len, got: buf.len() })?;
    *cursor += len;
    std::str::from_utf8(bytes).map_err(|_| WireError::InvalidUtf8(field))
}

impl ClientRequest {
    /// Encodes this request as bytes suitable for one atomic FIFO write.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.client_pid.to_le_bytes());
        buf.extend_from_slice(&self.op.to_i32().to_le_bytes());
        buf.extend_from_slice(&self.amount.to_le_bytes());
        let (is_new, id_str) = match self.target {
            Target::New => (1u8, String::new()),
            Target::Existing(id) => (0u8, id.to_string()),
        };
        buf.push(is_new);
        push_length_prefixed(&mut buf, "target_id", BANK_ID_FIELD_LIMIT, &id_str)?;
        buf.extend_from_slice(&self.batch_size.to_le_bytes());
        buf.extend_from_slice(&self.operation_index.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut c = 0usize;
        let need = |c: usize, n: usize| -> Result<(), WireError> {
            if buf.len() < c + n {
                Err(WireError::Truncated { need: c + n, got: buf.len() })
            } else {
                Ok(())
            }
        };

        need(c, 4)?;
        let client_pid = u32::from_le_bytes(buf[c..c + 4].try_into().unwrap());
        c += 4;

        need(c, 4)?;
        let op = OpCode::from_i32(i32::from_le_bytes(buf[c..c + 4].try_into().unwrap()))?;
        c += 4;

        need(c, 8)?;
        let amount = u64::from_le_bytes(buf[c..c + 8].try_into().unwrap());
        c += 8;

        need(c, 1)?;
        let is_new = buf[c];
        c += 1;

        let id_str = read_length_prefixed(buf, "target_id", &mut c)?;
        let target = if is_new != 0 {
            Target::New
        } else {
            Target::Existing(
                id_str
                    .parse()
                    .map_err(|_| WireError::MalformedAccountId(id_str.to_string()))?,
            )
        };

        need(c, 4)?;
        let batch_size = u32::from_le_bytes(buf[c..c + 4].try_into().unwrap());
        c += 4;

        need(c, 4)?;
        let operation_index = u32::from_le_bytes(buf[c..c + 4].try_into().unwrap());

        Ok(ClientRequest {
            client_pid,
            op,
            amount,
            target,
            batch_size,
            operation_index,
        })
    }
}

impl ServerResponse {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.status.to_le_bytes());
        buf.extend_from_slice(&self.balance.to_le_bytes());
        push_length_prefixed(&mut buf, "id", BANK_ID_FIELD_LIMIT, &self.id.to_string())?;
        push_length_prefixed(&mut buf, "message", MESSAGE_FIELD_LIMIT, &self.message)?;
        buf.extend_from_slice(&self.client_index.to_le_bytes());
        Ok(buf)
    }

    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        let mut c = 0usize;
        if buf.len() < 4 {
            return Err(WireError::Truncated { need: 4, got: buf.len() });
        }
        let status = i32::from_le_bytes(buf[c..c + 4].try_into().unwrap());
        c += 4;

        if buf.len() < c + 8 {
            return Err(WireError::Truncated { need: c + 8, got: buf.len() });
        }
        let balance = u64::from_le_bytes(buf[c..c + 8].try_into().unwrap());
        c += 8;

        let id_str = read_length_prefixed(buf, "id", &mut c)?;
        let id: AccountId = id_str
            .parse()
            .map_err(|_| WireError::MalformedAccountId(id_str.to_string()))?;

        let message = read_length_prefixed(buf, "message", &mut c)?.to_string();

        if buf.len() < c + 4 {
            return Err(WireError::Truncated { need: c + 4, got: buf.len() });
        }
        let client_index = u32::from_le_bytes(buf[c..c + 4].try_into().unwrap());

        Ok(ServerResponse {
            status,
            balance,
            id,
            message,
            client_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trips_new_account() {
        let req = ClientRequest {
            client_pid: 4242,
            op: OpCode::Deposit,
            amount: 300,
            target: Target::New,
            batch_size: 2,
            operation_index: 1,
        };
        let bytes = req.encode().unwrap();
        assert!(bytes.len() < 512, "record must fit in one PIPE_BUF write");
        let decoded = ClientRequest::decode(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn request_round_trips_existing_account() {
        let req = ClientRequest {
            client_pid: 1,
            op: OpCode::Withdraw,
            amount: 500,
            target: Target::Existing(AccountId::new(1)),
            batch_size: 1,
            operation_index: 1,
        };
        let bytes = req.encode().unwrap();
        let decoded = ClientRequest::decode(&bytes).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_round_trips_success_and_failure() {
        let ok = ServerResponse::success(AccountId::new(1), 500, 1);
        let bytes = ok.encode().unwrap();
        assert_eq!(ServerResponse::decode(&bytes).unwrap(), ok);

        let err = ServerResponse::failure(AccountId::new(2), &BankError::InsufficientFunds, 3);
        let bytes = err.encode().unwrap();
        let decoded = ServerResponse::decode(&bytes).unwrap();
        assert_eq!(decoded, err);
        assert_eq!(decoded.error(), Some(BankError::InsufficientFunds));
    }

    #[test]
    fn truncated_buffer_is_rejected() {
        let req = ClientRequest {
            client_pid: 1,
            op: OpCode::Deposit,
            amount: 1,
            target: Target::New,
            batch_size: 1,
            operation_index: 1,
        };
        let mut bytes = req.encode().unwrap();
        bytes.truncate(bytes.len() - 2);
        assert!(ClientRequest::decode(&bytes).is_err());
    }
}

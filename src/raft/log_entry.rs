use crate::commitlog;
use crate::raft::{MemberId, Term};
use crate::service::{OperationId, SessionId, WallClockMillis};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;

/// Byte representation:
///
/// ```text
/// | 0 | 1 | 2 | ...                                                    |
/// +---+------------------------------------------------------------...-+
/// |Vrs|  bincode(LogEntry) (variable size)                         ... |
/// +---+------------------------------------------------------------...-+
/// ```
///
/// * `Vrs` - version of the serialized payload
///
/// Not needed:
///
/// * Checksum is not needed, it's guaranteed by underlying commitlog.
/// * Size/length is not needed; the underlying commitlog will give us the correctly allocated array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term of the leader that appended the entry.
    pub term: Term,
    /// Leader's wall clock when the entry was appended. Drives the service layer's wall clock.
    pub timestamp: WallClockMillis,
    pub kind: EntryKind,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntryKind {
    /// Appended by every new leader so that entries of earlier terms can be committed.
    Initialize,
    Configuration {
        members: Vec<MemberId>,
    },
    OpenSession {
        client: String,
        service_name: String,
        service_type: String,
        timeout_millis: u64,
    },
    KeepAlive {
        session_ids: Vec<SessionId>,
    },
    CloseSession {
        session_id: SessionId,
    },
    Command {
        session_id: SessionId,
        operation: OperationId,
        operand: Bytes,
    },
}

const LOG_ENTRY_FORMAT_VERSION: u8 = 1;

impl commitlog::Entry for LogEntry {
    fn encode(&self) -> Result<Vec<u8>, io::Error> {
        let mut bytes = vec![LOG_ENTRY_FORMAT_VERSION];
        bincode::serialize_into(&mut bytes, self).map_err(into_io_error)?;
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self, io::Error> {
        match bytes.split_first() {
            Some((&LOG_ENTRY_FORMAT_VERSION, payload)) => bincode::deserialize(payload).map_err(into_io_error),
            Some((version, _)) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown log entry format version {}", version),
            )),
            None => Err(io::Error::new(io::ErrorKind::InvalidData, "empty log entry")),
        }
    }
}

fn into_io_error(e: bincode::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

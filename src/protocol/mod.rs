//! Wire Protocol Definitions
//!
//! The datagram messages exchanged between workers and the coordinator,
//! serialized with `bincode`. Every exchange is a single request datagram
//! answered by a single reply datagram; loss, duplication and reordering
//! are handled above this layer by retries and idempotent ledger
//! operations, never by transport state.

use serde::{Deserialize, Serialize};

/// Receive buffer size. A `Work` reply carrying the base primes is the
/// largest message and must fit a single UDP datagram.
pub const MAX_DATAGRAM: usize = 65536;

/// Session identity a worker picks at startup. Combined with the sender
/// address on the coordinator side, so two workers sharing an address
/// (e.g. behind NAT) still get distinct identities.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WorkerId(pub String);

impl WorkerId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Messages a worker sends to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerMessage {
    /// Ask for the next block.
    Request { worker: WorkerId },

    /// Report a finished block. `prime_count` and `checksum` always travel;
    /// the full prime list only when the coordinator asked for it.
    Submit {
        block_id: u64,
        worker: WorkerId,
        prime_count: u64,
        checksum: u64,
        primes: Option<Vec<u64>>,
    },
}

/// Replies the coordinator sends back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CoordinatorReply {
    /// A block assignment. Base primes cover everything up to the square
    /// root of the range end, so the worker can sieve any block without a
    /// second round-trip.
    Work {
        block_id: u64,
        lo: u64,
        hi: u64,
        base_primes: Vec<u64>,
        collect_primes: bool,
    },

    /// Nothing assignable right now, but undecided blocks remain.
    Wait,

    /// Every block is settled; the worker may terminate.
    Done,

    /// The submit was accepted (or was a duplicate of an accepted one).
    Ack { block_id: u64 },

    /// The submit was not accepted.
    Rejected { block_id: u64, reason: RejectReason },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RejectReason {
    /// The block id is outside the partition.
    UnknownBlock,
    /// The block is completed with a different result.
    AlreadyCompleted,
    /// The block is not currently assigned to this worker.
    NotAssigned,
    /// The block exceeded its reassignment budget.
    Failed,
}

use crate::protocol::{RejectReason, WorkerId};
use anyhow::Result;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::Path;

/// Identity a submit must match: the sender's transport address plus its
/// session token. Two workers behind one NAT address stay distinct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    pub addr: SocketAddr,
    pub worker: WorkerId,
}

/// What a worker reports for a finished block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResult {
    pub prime_count: u64,
    pub checksum: u64,
    pub primes: Option<Vec<u64>>,
}

impl BlockResult {
    /// Duplicate submits are matched on the integrity pair alone, never by
    /// recomputing the block.
    pub fn matches(&self, other: &BlockResult) -> bool {
        self.prime_count == other.prime_count && self.checksum == other.checksum
    }
}

/// Lifecycle state of one block. Exactly one variant holds at any instant;
/// `Completed` is terminal and its result is never replaced.
#[derive(Debug, Clone, PartialEq)]
pub enum BlockState {
    /// Created or requeued, waiting for a worker.
    Pending,
    /// Handed to a worker until `deadline_ms`; the sweep re-decides
    /// ownership once the deadline passes.
    Assigned {
        worker: WorkerHandle,
        deadline_ms: u64,
    },
    /// A valid result arrived.
    Completed { result: BlockResult },
    /// Requeued more times than the run allows.
    Failed { attempts: u32 },
}

/// One contiguous sub-range of the target interval, assigned as a unit.
/// `id` is the block's position in partition order.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: u64,
    pub lo: u64,
    pub hi: u64,
    pub state: BlockState,
}

/// Outcome of asking the ledger for work.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Work { block_id: u64, lo: u64, hi: u64 },
    /// Nothing pending, but assigned blocks are still within deadline.
    Wait,
    /// Every block is terminal.
    AllDone,
}

/// Outcome of a submit.
#[derive(Debug, Clone, PartialEq)]
pub enum CompleteOutcome {
    Ack,
    Rejected(RejectReason),
}

/// What one sweep pass changed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepOutcome {
    pub requeued: Vec<u64>,
    pub failed: Vec<u64>,
}

/// End-of-run summary surfaced to the operator and optionally written to
/// disk as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionReport {
    pub range_end: u64,
    pub block_size: u64,
    pub total_blocks: usize,
    pub completed_blocks: usize,
    pub failed_blocks: Vec<u64>,
    /// True when the run settled with at least one failed block.
    pub partial: bool,
    pub total_primes: u64,
    /// Merged ascending prime list, present when the run collected them.
    pub primes: Option<Vec<u64>>,
}

impl CompletionReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Current system time in milliseconds.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

//! Block Ledger
//!
//! The authoritative state machine over every block of the run. All
//! mutation goes through `&mut self`, so whoever owns the ledger (the
//! service keeps it behind a mutex) serializes assignment, completion and
//! the timeout sweep against each other.
//!
//! The ledger never reads the clock or touches a socket: `now` is a
//! parameter of the time-dependent operations, which keeps every lifecycle
//! transition deterministic under test.

use super::partitioner;
use super::types::{
    Assignment, Block, BlockResult, BlockState, CompleteOutcome, CompletionReport, SweepOutcome,
    WorkerHandle,
};
use crate::error::SieveError;
use crate::protocol::RejectReason;
use std::collections::BTreeSet;

pub struct BlockLedger {
    /// All blocks, indexed by id (ids are positions in partition order).
    blocks: Vec<Block>,
    /// Ids currently `Pending`, ordered so assignment is lowest-id-first.
    pending: BTreeSet<u64>,
    /// Ids currently `Assigned`, scanned by the sweep.
    assigned: BTreeSet<u64>,
    /// Times each block has been requeued by the sweep.
    requeue_counts: Vec<u32>,
    completed: usize,
    failed: Vec<u64>,
    assignment_timeout_ms: u64,
    max_reassignments: u32,
    range_end: u64,
    block_size: u64,
}

impl BlockLedger {
    pub fn new(
        range_end: u64,
        block_size: u64,
        assignment_timeout_ms: u64,
        max_reassignments: u32,
    ) -> Result<Self, SieveError> {
        let blocks = partitioner::partition(range_end, block_size)?;
        let pending = blocks.iter().map(|b| b.id).collect();
        let requeue_counts = vec![0; blocks.len()];

        Ok(Self {
            blocks,
            pending,
            assigned: BTreeSet::new(),
            requeue_counts,
            completed: 0,
            failed: Vec::new(),
            assignment_timeout_ms,
            max_reassignments,
            range_end,
            block_size,
        })
    }

    /// Hands the lowest-id pending block to `worker`, with a deadline of
    /// `now_ms + assignment_timeout`. `Wait` when everything left is still
    /// assigned within deadline, `AllDone` once every block is terminal.
    pub fn assign_next(&mut self, worker: WorkerHandle, now_ms: u64) -> Assignment {
        let Some(&id) = self.pending.iter().next() else {
            if self.assigned.is_empty() {
                return Assignment::AllDone;
            }
            return Assignment::Wait;
        };

        self.pending.remove(&id);
        self.assigned.insert(id);

        let block = &mut self.blocks[id as usize];
        block.state = BlockState::Assigned {
            worker,
            deadline_ms: now_ms + self.assignment_timeout_ms,
        };

        Assignment::Work {
            block_id: id,
            lo: block.lo,
            hi: block.hi,
        }
    }

    /// Records a submitted result. Accepted only from the block's current
    /// assignee; a duplicate of an already accepted result is re-acked so a
    /// worker whose first ack got lost can settle. A `Completed` block's
    /// result is never replaced.
    pub fn complete(
        &mut self,
        block_id: u64,
        worker: &WorkerHandle,
        result: BlockResult,
    ) -> CompleteOutcome {
        let Some(block) = self.blocks.get_mut(block_id as usize) else {
            return CompleteOutcome::Rejected(RejectReason::UnknownBlock);
        };

        match &block.state {
            BlockState::Assigned { worker: assignee, .. } => {
                if assignee != worker {
                    // A stale assignment is re-decided by the sweep, not by
                    // whoever submits last.
                    return CompleteOutcome::Rejected(RejectReason::NotAssigned);
                }

                block.state = BlockState::Completed { result };
                self.assigned.remove(&block_id);
                self.completed += 1;
                CompleteOutcome::Ack
            }
            BlockState::Completed { result: accepted } => {
                if accepted.matches(&result) {
                    CompleteOutcome::Ack
                } else {
                    CompleteOutcome::Rejected(RejectReason::AlreadyCompleted)
                }
            }
            BlockState::Pending => CompleteOutcome::Rejected(RejectReason::NotAssigned),
            BlockState::Failed { .. } => CompleteOutcome::Rejected(RejectReason::Failed),
        }
    }

    /// Requeues every assigned block whose deadline has passed. A block
    /// over its requeue budget becomes `Failed` instead and is reported,
    /// never assigned again.
    pub fn sweep_timeouts(&mut self, now_ms: u64) -> SweepOutcome {
        let expired: Vec<u64> = self
            .assigned
            .iter()
            .copied()
            .filter(|&id| match &self.blocks[id as usize].state {
                BlockState::Assigned { deadline_ms, .. } => *deadline_ms <= now_ms,
                _ => false,
            })
            .collect();

        let mut outcome = SweepOutcome::default();
        for id in expired {
            self.assigned.remove(&id);

            let count = &mut self.requeue_counts[id as usize];
            *count += 1;
            let attempts = *count;

            let block = &mut self.blocks[id as usize];
            if attempts > self.max_reassignments {
                block.state = BlockState::Failed { attempts };
                self.failed.push(id);
                outcome.failed.push(id);
            } else {
                block.state = BlockState::Pending;
                self.pending.insert(id);
                outcome.requeued.push(id);
            }
        }

        outcome
    }

    /// True iff every block is `Completed`.
    pub fn is_done(&self) -> bool {
        self.completed == self.blocks.len()
    }

    /// True once no block is `Pending` or `Assigned`. The run ends here;
    /// whether it ended cleanly is `is_done` / the report's `partial` flag.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty() && self.assigned.is_empty()
    }

    /// (pending, assigned, completed, failed) block counts.
    pub fn status_counts(&self) -> (usize, usize, usize, usize) {
        (
            self.pending.len(),
            self.assigned.len(),
            self.completed,
            self.failed.len(),
        )
    }

    pub fn block(&self, block_id: u64) -> Option<&Block> {
        self.blocks.get(block_id as usize)
    }

    pub fn report(&self) -> CompletionReport {
        let mut total_primes = 0u64;
        let mut merged: Vec<u64> = Vec::new();
        let mut have_lists = true;

        for block in &self.blocks {
            if let BlockState::Completed { result } = &block.state {
                total_primes += result.prime_count;
                match &result.primes {
                    // Blocks are visited in id order and ranges ascend, so
                    // extending keeps the list sorted.
                    Some(primes) => merged.extend_from_slice(primes),
                    None => have_lists = false,
                }
            }
        }

        CompletionReport {
            range_end: self.range_end,
            block_size: self.block_size,
            total_blocks: self.blocks.len(),
            completed_blocks: self.completed,
            failed_blocks: self.failed.clone(),
            partial: !self.failed.is_empty(),
            total_primes,
            primes: if have_lists && self.completed > 0 {
                Some(merged)
            } else {
                None
            },
        }
    }
}

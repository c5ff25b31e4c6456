//! Coordinator Module
//!
//! Owns the authoritative partition of the target range and arbitrates all
//! work distribution. Workers pull from it over UDP; it never pushes.
//!
//! ## Architecture Overview
//! The coordinator follows a **Pull-based** model with **Lease** management:
//! 1. **Partitioning**: at startup the range `[2, N]` is split once into
//!    fixed-size blocks with stable ids.
//! 2. **Assignment**: a worker request leases the lowest pending block to
//!    that worker until a deadline.
//! 3. **Completion**: a submit from the current assignee settles the block
//!    permanently; duplicate submits are re-acked, late ones rejected.
//! 4. **Sweeping**: a periodic pass requeues expired leases so crashed
//!    workers only delay their blocks (at-least-once execution); blocks
//!    over their requeue budget are marked failed and reported.
//!
//! ## Submodules
//! - **`partitioner`**: deterministic range-to-blocks split.
//! - **`ledger`**: the block state machine, serialized behind one owner.
//! - **`service`**: UDP front end, sweep timer, operator stats.
//! - **`types`**: blocks, results, reports and the shared time helper.

pub mod ledger;
pub mod partitioner;
pub mod service;
pub mod types;

#[cfg(test)]
mod tests;

//! Distributed Prime Sieve Library
//!
//! This library crate defines the core modules of the system. It serves as
//! the foundation for the binary executable (`main.rs`), which runs either
//! side of the protocol.
//!
//! ## Architecture Modules
//! The system is composed of loosely coupled subsystems around one star
//! topology: many workers, one coordinator, UDP datagrams in between.
//!
//! - **`coordinator`**: owns the partition of `[2, N]` into blocks and the
//!   ledger tracking each block's lifecycle (assignment, completion,
//!   timeout-driven requeueing). Serves workers over UDP.
//! - **`worker`**: the client loop. Requests a block, sieves it, submits
//!   the result, retries under packet loss, stops when told the run is
//!   settled.
//! - **`sieve`**: the segmented-sieve compute engine shared by both sides.
//! - **`protocol`**: the bincode wire messages and worker identity.
//! - **`config`**: the tunables the CLI layer feeds into both cores.
//! - **`error`**: the typed failures that end a run.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod protocol;
pub mod sieve;
pub mod worker;

//! Run Configuration
//!
//! The tunables consumed by the coordinator and worker cores. The CLI layer
//! (`main.rs`) fills these in; nothing here affects protocol correctness
//! except the timing and retry budgets it carries.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// UDP port to listen on. Port 0 picks a free one.
    pub port: u16,
    /// Upper bound of the target range [2, range_end], inclusive.
    pub range_end: u64,
    /// Numbers per block. The final block may be shorter.
    pub block_size: u64,
    /// How long a worker holds a block before the sweep may requeue it.
    pub assignment_timeout: Duration,
    /// Period of the timeout sweep. Must be below `assignment_timeout`
    /// to bound the time a lost block stays unassignable.
    pub sweep_interval: Duration,
    /// How many times a block may be requeued before it is marked failed.
    pub max_reassignments: u32,
    /// Whether workers ship the full prime list or only count + checksum.
    pub collect_primes: bool,
    /// Where to write the JSON completion report, if anywhere.
    pub report_path: Option<PathBuf>,
    /// Emit per-block lifecycle events and periodic stats.
    pub verbose: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            range_end: 1_000_000,
            block_size: 1_000,
            assignment_timeout: Duration::from_secs(30),
            sweep_interval: Duration::from_secs(2),
            max_reassignments: 3,
            collect_primes: false,
            report_path: None,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Address of the coordinator.
    pub coordinator: SocketAddr,
    /// How long to wait for a reply before resending.
    pub request_timeout: Duration,
    /// Send attempts per exchange before giving up on the coordinator.
    pub max_retries: u32,
    /// Sleep between requests while the coordinator answers `Wait`.
    pub wait_backoff: Duration,
    pub verbose: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            coordinator: SocketAddr::from(([127, 0, 0, 1], 5000)),
            request_timeout: Duration::from_millis(500),
            max_retries: 5,
            wait_backoff: Duration::from_millis(500),
            verbose: false,
        }
    }
}

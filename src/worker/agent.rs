//! Worker Agent
//!
//! The datagram client loop: request a block, sieve it, submit the result,
//! repeat until the coordinator reports the run settled. One block in
//! flight at a time; every network wait is bounded by a timeout and a
//! retry budget, and late replies to the agent's own retries are discarded
//! instead of re-processed.

use crate::config::WorkerConfig;
use crate::error::SieveError;
use crate::protocol::{CoordinatorReply, WorkerId, WorkerMessage, MAX_DATAGRAM};
use crate::sieve;
use anyhow::Result;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info};

/// What a finished session computed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WorkerSummary {
    pub blocks_completed: u64,
    pub primes_found: u64,
}

pub struct WorkerAgent {
    socket: UdpSocket,
    config: WorkerConfig,
    id: WorkerId,
}

impl WorkerAgent {
    pub async fn connect(config: WorkerConfig) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(config.coordinator).await?;

        let id = WorkerId::new();
        info!("Worker {} targeting coordinator {}", id.0, config.coordinator);

        Ok(Self { socket, config, id })
    }

    /// Runs until the coordinator answers `Done`. Fails only when the
    /// coordinator stays unreachable past the retry budget.
    pub async fn run(&self) -> Result<WorkerSummary> {
        let mut summary = WorkerSummary::default();

        loop {
            let request = WorkerMessage::Request {
                worker: self.id.clone(),
            };

            match self.exchange(&request).await? {
                CoordinatorReply::Work {
                    block_id,
                    lo,
                    hi,
                    base_primes,
                    collect_primes,
                } => {
                    debug!("Sieving block {} [{}, {}]", block_id, lo, hi);
                    let primes = sieve::sieve_segment(&base_primes, lo, hi);
                    let prime_count = primes.len() as u64;
                    let checksum = sieve::checksum(&primes);

                    let submit = WorkerMessage::Submit {
                        block_id,
                        worker: self.id.clone(),
                        prime_count,
                        checksum,
                        primes: if collect_primes { Some(primes) } else { None },
                    };

                    match self.exchange(&submit).await? {
                        CoordinatorReply::Ack { .. } => {
                            summary.blocks_completed += 1;
                            summary.primes_found += prime_count;
                            info!("Block {} accepted ({} primes)", block_id, prime_count);
                        }
                        CoordinatorReply::Rejected { reason, .. } => {
                            // The block no longer needs this result, e.g. it
                            // was requeued past us or our own duplicate
                            // landed first. Move on to fresh work.
                            debug!("Submit for block {} rejected: {:?}", block_id, reason);
                        }
                        other => {
                            debug!("Ignoring unexpected reply to submit: {}", kind(&other));
                        }
                    }
                }

                CoordinatorReply::Wait => {
                    debug!("No work assignable yet, backing off");
                    tokio::time::sleep(self.config.wait_backoff).await;
                }

                CoordinatorReply::Done => {
                    info!(
                        "Coordinator reports the run settled, worker {} finishing",
                        self.id.0
                    );
                    return Ok(summary);
                }

                CoordinatorReply::Ack { .. } | CoordinatorReply::Rejected { .. } => {
                    // Filtered out by await_reply for a Request; nothing to do.
                }
            }
        }
    }

    /// Sends `msg` and waits for a reply that answers it, retrying with a
    /// doubling, jittered delay. Exhausting the budget means the
    /// coordinator is unreachable, which is fatal for this worker.
    async fn exchange(&self, msg: &WorkerMessage) -> Result<CoordinatorReply> {
        let encoded = bincode::serialize(msg)?;
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut delay_ms = 150u64;

        for attempt in 0..self.config.max_retries {
            if let Err(e) = self.socket.send(&encoded).await {
                tracing::warn!("Send failed (attempt {}): {}", attempt + 1, e);
            } else if let Some(reply) = self.await_reply(msg, &mut buf).await {
                return Ok(reply);
            }

            let jitter = rand::random::<u64>() % 50;
            tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
            delay_ms = (delay_ms * 2).min(1200);
        }

        Err(SieveError::NetworkUnavailable {
            attempts: self.config.max_retries,
        }
        .into())
    }

    /// Listens until the request timeout for a reply matching `sent`.
    /// Replies to messages this agent already moved past (duplicates of
    /// its own retries) are dropped here.
    async fn await_reply(&self, sent: &WorkerMessage, buf: &mut [u8]) -> Option<CoordinatorReply> {
        let deadline = tokio::time::Instant::now() + self.config.request_timeout;

        loop {
            let remaining = deadline.checked_duration_since(tokio::time::Instant::now())?;

            match timeout(remaining, self.socket.recv(buf)).await {
                Ok(Ok(len)) => match bincode::deserialize::<CoordinatorReply>(&buf[..len]) {
                    Ok(reply) if answers(sent, &reply) => return Some(reply),
                    Ok(stale) => debug!("Ignoring stale reply: {}", kind(&stale)),
                    Err(e) => tracing::warn!("Dropping malformed reply: {}", e),
                },
                Ok(Err(e)) => {
                    tracing::warn!("Receive failed: {}", e);
                    return None;
                }
                // Timed out locally; the datagram may still arrive later
                // and will be filtered on the next exchange.
                Err(_) => return None,
            }
        }
    }
}

/// Whether `reply` is a response to `sent`, as opposed to a late duplicate
/// from an earlier exchange.
fn answers(sent: &WorkerMessage, reply: &CoordinatorReply) -> bool {
    match sent {
        WorkerMessage::Request { .. } => matches!(
            reply,
            CoordinatorReply::Work { .. } | CoordinatorReply::Wait | CoordinatorReply::Done
        ),
        WorkerMessage::Submit { block_id, .. } => match reply {
            CoordinatorReply::Ack { block_id: id }
            | CoordinatorReply::Rejected { block_id: id, .. } => id == block_id,
            _ => false,
        },
    }
}

/// Compact description for logs; `Work` drags its base primes along and
/// must not be debug-printed whole.
fn kind(reply: &CoordinatorReply) -> &'static str {
    match reply {
        CoordinatorReply::Work { .. } => "Work",
        CoordinatorReply::Wait => "Wait",
        CoordinatorReply::Done => "Done",
        CoordinatorReply::Ack { .. } => "Ack",
        CoordinatorReply::Rejected { .. } => "Rejected",
    }
}

//! Coordinator Service
//!
//! Datagram front of the ledger. Binds one UDP socket, decodes inbound
//! worker messages, maps them onto ledger operations and sends the reply
//! back to the sender. A periodic sweep requeues timed-out assignments so
//! a crashed worker only delays its blocks, never loses them.

use super::ledger::BlockLedger;
use super::types::{
    now_ms, Assignment, BlockResult, CompleteOutcome, CompletionReport, WorkerHandle,
};
use crate::config::CoordinatorConfig;
use crate::protocol::{CoordinatorReply, WorkerMessage, WorkerId, MAX_DATAGRAM};
use crate::sieve;
use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::info;

const STATS_INTERVAL: Duration = Duration::from_secs(5);

/// Per-worker bookkeeping for diagnostics; no effect on the protocol.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub addr: SocketAddr,
    pub blocks_completed: u64,
    pub last_seen_ms: u64,
}

pub struct CoordinatorService {
    socket: Arc<UdpSocket>,
    /// Locked per ledger operation, never across socket I/O.
    pub ledger: Arc<Mutex<BlockLedger>>,
    /// Primes up to isqrt(range_end), computed once at bind time and
    /// shipped inside every `Work` reply.
    pub base_primes: Arc<Vec<u64>>,
    /// Workers seen so far, keyed by session token.
    pub workers: Arc<DashMap<String, WorkerInfo>>,
    config: CoordinatorConfig,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl CoordinatorService {
    /// Binds the socket, partitions the range and bootstraps the base
    /// primes. Port 0 picks a free port; see `local_addr`.
    pub async fn bind(config: CoordinatorConfig) -> Result<Arc<Self>> {
        let socket = UdpSocket::bind(("0.0.0.0", config.port)).await?;
        info!("Coordinator listening on {}", socket.local_addr()?);

        let ledger = BlockLedger::new(
            config.range_end,
            config.block_size,
            config.assignment_timeout.as_millis() as u64,
            config.max_reassignments,
        )?;
        let (pending, _, _, _) = ledger.status_counts();

        let base_primes = sieve::simple_sieve(sieve::isqrt(config.range_end));
        info!(
            "Partitioned [2, {}] into {} blocks of {} ({} base primes)",
            config.range_end,
            pending,
            config.block_size,
            base_primes.len()
        );

        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            ledger: Arc::new(Mutex::new(ledger)),
            base_primes: Arc::new(base_primes),
            workers: Arc::new(DashMap::new()),
            config,
            tasks: Mutex::new(Vec::new()),
        }))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Spawns the receive and sweep loops (and the stats loop when
    /// verbose) and returns immediately.
    pub async fn start(self: Arc<Self>) {
        let mut tasks = self.tasks.lock().await;

        let receive_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.receive_loop().await;
            })
        };
        tasks.push(receive_handle);

        let sweep_handle = {
            let service = self.clone();
            tokio::spawn(async move {
                service.sweep_loop().await;
            })
        };
        tasks.push(sweep_handle);

        if self.config.verbose {
            let service = self.clone();
            tasks.push(tokio::spawn(async move {
                service.stats_loop().await;
            }));
        }

        info!("Coordinator loops started");
    }

    /// Aborts the background loops. Idempotent.
    pub async fn stop(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    /// Waits until every block is terminal, then returns the report and
    /// writes it to the configured path, if any.
    pub async fn run_until_settled(&self) -> CompletionReport {
        loop {
            tokio::time::sleep(self.config.sweep_interval).await;

            let ledger = self.ledger.lock().await;
            if !ledger.is_settled() {
                continue;
            }

            let report = ledger.report();
            drop(ledger);

            if let Some(path) = &self.config.report_path {
                match report.save(path) {
                    Ok(()) => info!("Report written to {}", path.display()),
                    Err(e) => tracing::error!("Failed to write report: {}", e),
                }
            }
            return report;
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => match bincode::deserialize::<WorkerMessage>(&buf[..len]) {
                    Ok(msg) => {
                        let reply = self.handle_packet(msg, src).await;
                        match bincode::serialize(&reply) {
                            Ok(encoded) => {
                                if let Err(e) = self.socket.send_to(&encoded, src).await {
                                    tracing::warn!("Failed to reply to {}: {}", src, e);
                                }
                            }
                            Err(e) => tracing::error!("Failed to serialize reply: {}", e),
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed datagram from {}: {}", src, e);
                    }
                },
                Err(e) => {
                    tracing::error!("Failed to receive UDP packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// Maps one decoded message onto a ledger operation and builds the
    /// reply. Malformed datagrams never reach this point.
    pub async fn handle_packet(&self, msg: WorkerMessage, src: SocketAddr) -> CoordinatorReply {
        match msg {
            WorkerMessage::Request { worker } => {
                self.touch_worker(&worker, src);
                let handle = WorkerHandle {
                    addr: src,
                    worker,
                };

                let assignment = { self.ledger.lock().await.assign_next(handle, now_ms()) };
                match assignment {
                    Assignment::Work { block_id, lo, hi } => {
                        tracing::debug!("Assigned block {} [{}, {}] to {}", block_id, lo, hi, src);
                        CoordinatorReply::Work {
                            block_id,
                            lo,
                            hi,
                            base_primes: self.base_primes.as_ref().clone(),
                            collect_primes: self.config.collect_primes,
                        }
                    }
                    Assignment::Wait => CoordinatorReply::Wait,
                    Assignment::AllDone => CoordinatorReply::Done,
                }
            }

            WorkerMessage::Submit {
                block_id,
                worker,
                prime_count,
                checksum,
                primes,
            } => {
                self.touch_worker(&worker, src);
                let handle = WorkerHandle {
                    addr: src,
                    worker: worker.clone(),
                };
                let result = BlockResult {
                    prime_count,
                    checksum,
                    primes,
                };

                let outcome = { self.ledger.lock().await.complete(block_id, &handle, result) };
                match outcome {
                    CompleteOutcome::Ack => {
                        if let Some(mut entry) = self.workers.get_mut(&worker.0) {
                            entry.blocks_completed += 1;
                        }
                        info!(
                            "Block {} completed by {} ({} primes)",
                            block_id, src, prime_count
                        );
                        CoordinatorReply::Ack { block_id }
                    }
                    CompleteOutcome::Rejected(reason) => {
                        tracing::debug!(
                            "Rejected submit for block {} from {}: {:?}",
                            block_id,
                            src,
                            reason
                        );
                        CoordinatorReply::Rejected { block_id, reason }
                    }
                }
            }
        }
    }

    fn touch_worker(&self, worker: &WorkerId, addr: SocketAddr) {
        match self.workers.get_mut(&worker.0) {
            Some(mut entry) => {
                entry.last_seen_ms = now_ms();
                entry.addr = addr;
            }
            None => {
                info!("New worker {} at {}", worker.0, addr);
                self.workers.insert(
                    worker.0.clone(),
                    WorkerInfo {
                        addr,
                        blocks_completed: 0,
                        last_seen_ms: now_ms(),
                    },
                );
            }
        }
    }

    async fn sweep_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.sweep_interval);

        loop {
            interval.tick().await;

            let outcome = { self.ledger.lock().await.sweep_timeouts(now_ms()) };
            for id in &outcome.requeued {
                tracing::warn!("Block {} timed out, requeued", id);
            }
            for id in &outcome.failed {
                tracing::error!("Block {} exceeded its reassignment budget, marked failed", id);
            }
        }
    }

    async fn stats_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(STATS_INTERVAL);

        loop {
            interval.tick().await;

            let (pending, assigned, completed, failed) =
                { self.ledger.lock().await.status_counts() };
            info!(
                "Ledger: {} pending, {} assigned, {} completed, {} failed ({} workers seen)",
                pending,
                assigned,
                completed,
                failed,
                self.workers.len()
            );
        }
    }
}

//! Coordinator Module Tests
//!
//! Unit tests for the block ledger lifecycle and scenario tests driving
//! the service's packet handler directly, so packet loss, duplication and
//! timeouts are exercised deterministically without real sockets.

#[cfg(test)]
mod tests {
    use crate::config::CoordinatorConfig;
    use crate::coordinator::ledger::BlockLedger;
    use crate::coordinator::service::CoordinatorService;
    use crate::coordinator::types::{
        now_ms, Assignment, BlockResult, BlockState, CompleteOutcome, WorkerHandle,
    };
    use crate::protocol::{CoordinatorReply, RejectReason, WorkerId, WorkerMessage};
    use crate::sieve;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    fn ledger(range_end: u64, block_size: u64, timeout_ms: u64, max_re: u32) -> BlockLedger {
        BlockLedger::new(range_end, block_size, timeout_ms, max_re).unwrap()
    }

    fn handle(port: u16) -> WorkerHandle {
        WorkerHandle {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            worker: WorkerId::new(),
        }
    }

    fn result_for(lo: u64, hi: u64) -> BlockResult {
        let primes = sieve::sieve_segment(&sieve::simple_sieve(sieve::isqrt(hi)), lo, hi);
        BlockResult {
            prime_count: primes.len() as u64,
            checksum: sieve::checksum(&primes),
            primes: Some(primes),
        }
    }

    // ============================================================
    // TEST 1: Assignment order and exhaustion
    // ============================================================

    #[test]
    fn test_assign_lowest_pending_first() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        assert_eq!(
            ledger.assign_next(worker.clone(), 0),
            Assignment::Work { block_id: 0, lo: 2, hi: 11 }
        );
        assert_eq!(
            ledger.assign_next(worker.clone(), 0),
            Assignment::Work { block_id: 1, lo: 12, hi: 21 }
        );
        assert_eq!(
            ledger.assign_next(worker.clone(), 0),
            Assignment::Work { block_id: 2, lo: 22, hi: 30 }
        );

        // Everything is leased and within deadline: not assignable, not done.
        assert_eq!(ledger.assign_next(worker, 0), Assignment::Wait);
        assert!(!ledger.is_settled());
    }

    // ============================================================
    // TEST 2: Completed blocks are terminal
    // ============================================================

    #[test]
    fn test_completed_block_never_reassigned() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        for (id, lo, hi) in [(0u64, 2u64, 11u64), (1, 12, 21), (2, 22, 30)] {
            assert_eq!(
                ledger.assign_next(worker.clone(), 0),
                Assignment::Work { block_id: id, lo, hi }
            );
            assert_eq!(
                ledger.complete(id, &worker, result_for(lo, hi)),
                CompleteOutcome::Ack
            );
        }

        assert!(ledger.is_done());
        assert!(ledger.is_settled());

        // Even a sweep far in the future resurrects nothing.
        let outcome = ledger.sweep_timeouts(u64::MAX);
        assert!(outcome.requeued.is_empty());
        assert!(outcome.failed.is_empty());
        assert_eq!(ledger.assign_next(worker, u64::MAX), Assignment::AllDone);
    }

    // ============================================================
    // TEST 3: Idempotent completion
    // ============================================================

    #[test]
    fn test_complete_is_idempotent() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        ledger.assign_next(worker.clone(), 0);
        let result = result_for(2, 11);

        assert_eq!(
            ledger.complete(0, &worker, result.clone()),
            CompleteOutcome::Ack
        );
        let counts = ledger.status_counts();

        // The duplicate is re-acked and changes nothing.
        assert_eq!(ledger.complete(0, &worker, result), CompleteOutcome::Ack);
        assert_eq!(ledger.status_counts(), counts);
    }

    #[test]
    fn test_mismatched_duplicate_is_rejected() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        ledger.assign_next(worker.clone(), 0);
        ledger.complete(0, &worker, result_for(2, 11));

        let mut wrong = result_for(2, 11);
        wrong.prime_count += 1;
        assert_eq!(
            ledger.complete(0, &worker, wrong),
            CompleteOutcome::Rejected(RejectReason::AlreadyCompleted)
        );

        // The accepted result is untouched.
        match &ledger.block(0).unwrap().state {
            BlockState::Completed { result } => {
                assert_eq!(result.prime_count, 5);
            }
            state => panic!("unexpected state: {:?}", state),
        }
    }

    // ============================================================
    // TEST 4: Submit validation
    // ============================================================

    #[test]
    fn test_submit_from_wrong_worker_rejected() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let assignee = handle(9001);
        let intruder = handle(9002);

        ledger.assign_next(assignee.clone(), 0);

        assert_eq!(
            ledger.complete(0, &intruder, result_for(2, 11)),
            CompleteOutcome::Rejected(RejectReason::NotAssigned)
        );

        // Same address but a different session token is a different worker.
        let reused_addr = WorkerHandle {
            addr: assignee.addr,
            worker: WorkerId::new(),
        };
        assert_eq!(
            ledger.complete(0, &reused_addr, result_for(2, 11)),
            CompleteOutcome::Rejected(RejectReason::NotAssigned)
        );

        assert_eq!(
            ledger.complete(0, &assignee, result_for(2, 11)),
            CompleteOutcome::Ack
        );
    }

    #[test]
    fn test_submit_unknown_or_unassigned_block_rejected() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        assert_eq!(
            ledger.complete(99, &worker, result_for(2, 11)),
            CompleteOutcome::Rejected(RejectReason::UnknownBlock)
        );
        // Block 0 exists but was never assigned.
        assert_eq!(
            ledger.complete(0, &worker, result_for(2, 11)),
            CompleteOutcome::Rejected(RejectReason::NotAssigned)
        );
    }

    // ============================================================
    // TEST 5: Timeout sweep and requeueing
    // ============================================================

    #[test]
    fn test_expired_assignment_is_requeued() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        ledger.assign_next(worker.clone(), 0);

        // Still within deadline: nothing happens.
        assert_eq!(ledger.sweep_timeouts(500).requeued, Vec::<u64>::new());

        let outcome = ledger.sweep_timeouts(1_000);
        assert_eq!(outcome.requeued, vec![0]);
        assert_eq!(ledger.block(0).unwrap().state, BlockState::Pending);

        // Reassigned with identical bounds.
        assert_eq!(
            ledger.assign_next(worker, 2_000),
            Assignment::Work { block_id: 0, lo: 2, hi: 11 }
        );
    }

    #[test]
    fn test_late_submit_before_sweep_still_wins() {
        let mut ledger = ledger(10, 100, 1_000, 3);
        let worker = handle(9001);

        ledger.assign_next(worker.clone(), 0);

        // The deadline has passed but no sweep ran yet: the assignment
        // stands, so the submit is still the valid one.
        assert_eq!(
            ledger.complete(0, &worker, result_for(2, 10)),
            CompleteOutcome::Ack
        );
        assert!(ledger.is_done());
    }

    #[test]
    fn test_stale_submit_after_reassignment_rejected() {
        let mut ledger = ledger(10, 100, 1_000, 3);
        let old = handle(9001);
        let new = handle(9002);

        ledger.assign_next(old.clone(), 0);
        ledger.sweep_timeouts(1_000);
        ledger.assign_next(new.clone(), 1_100);

        assert_eq!(
            ledger.complete(0, &old, result_for(2, 10)),
            CompleteOutcome::Rejected(RejectReason::NotAssigned)
        );
        assert_eq!(
            ledger.complete(0, &new, result_for(2, 10)),
            CompleteOutcome::Ack
        );
    }

    // ============================================================
    // TEST 6: Reassignment budget and partial completion
    // ============================================================

    #[test]
    fn test_block_fails_after_reassignment_budget() {
        let mut ledger = ledger(10, 100, 1_000, 1);
        let worker = handle(9001);

        ledger.assign_next(worker.clone(), 0);
        assert_eq!(ledger.sweep_timeouts(1_000).requeued, vec![0]);

        ledger.assign_next(worker.clone(), 2_000);
        let outcome = ledger.sweep_timeouts(3_000);
        assert_eq!(outcome.failed, vec![0]);
        assert_eq!(
            ledger.block(0).unwrap().state,
            BlockState::Failed { attempts: 2 }
        );

        // The run settles without being done, and the failure is visible.
        assert!(ledger.is_settled());
        assert!(!ledger.is_done());
        assert_eq!(ledger.assign_next(worker.clone(), 4_000), Assignment::AllDone);
        assert_eq!(
            ledger.complete(0, &worker, result_for(2, 10)),
            CompleteOutcome::Rejected(RejectReason::Failed)
        );

        let report = ledger.report();
        assert!(report.partial);
        assert_eq!(report.failed_blocks, vec![0]);
        assert_eq!(report.completed_blocks, 0);
    }

    // ============================================================
    // TEST 7: Completion report
    // ============================================================

    #[test]
    fn test_report_totals_and_merged_primes() {
        let mut ledger = ledger(30, 10, 1_000, 3);
        let worker = handle(9001);

        for (id, lo, hi) in [(0u64, 2u64, 11u64), (1, 12, 21), (2, 22, 30)] {
            ledger.assign_next(worker.clone(), 0);
            ledger.complete(id, &worker, result_for(lo, hi));
        }

        let report = ledger.report();
        assert!(!report.partial);
        assert_eq!(report.total_blocks, 3);
        assert_eq!(report.completed_blocks, 3);
        assert_eq!(report.total_primes, 10);
        assert_eq!(
            report.primes,
            Some(vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29])
        );
    }

    // ============================================================
    // TEST 8: Service scenarios through the packet handler
    // ============================================================

    async fn test_service(range_end: u64, block_size: u64) -> Arc<CoordinatorService> {
        let config = CoordinatorConfig {
            port: 0,
            range_end,
            block_size,
            assignment_timeout: Duration::from_secs(1),
            sweep_interval: Duration::from_millis(50),
            max_reassignments: 3,
            collect_primes: false,
            report_path: None,
            verbose: false,
        };
        // Loops stay unspawned: tests drive handle_packet directly.
        CoordinatorService::bind(config).await.unwrap()
    }

    fn submit_for(worker: &WorkerId, block_id: u64, lo: u64, hi: u64, base: &[u64]) -> WorkerMessage {
        let primes = sieve::sieve_segment(base, lo, hi);
        WorkerMessage::Submit {
            block_id,
            worker: worker.clone(),
            prime_count: primes.len() as u64,
            checksum: sieve::checksum(&primes),
            primes: None,
        }
    }

    #[tokio::test]
    async fn test_lost_and_duplicated_submits_still_complete() {
        let service = test_service(30, 10).await;
        let src: SocketAddr = SocketAddr::from(([127, 0, 0, 1], 40001));
        let worker = WorkerId::new();
        let request = WorkerMessage::Request {
            worker: worker.clone(),
        };

        // Block 0: the ack gets "lost", the worker resubmits, the duplicate
        // is re-acked without disturbing the ledger.
        let reply = service.handle_packet(request.clone(), src).await;
        let (b0, lo0, hi0, base) = match reply {
            CoordinatorReply::Work { block_id, lo, hi, base_primes, .. } => {
                (block_id, lo, hi, base_primes)
            }
            other => panic!("expected work, got {:?}", other),
        };
        assert_eq!((b0, lo0, hi0), (0, 2, 11));

        let submit0 = submit_for(&worker, b0, lo0, hi0, &base);
        assert_eq!(
            service.handle_packet(submit0.clone(), src).await,
            CoordinatorReply::Ack { block_id: 0 }
        );
        assert_eq!(
            service.handle_packet(submit0, src).await,
            CoordinatorReply::Ack { block_id: 0 }
        );

        // Block 1: the submit itself gets lost. The sweep requeues the
        // block and the next request hands it out again, same bounds.
        let reply = service.handle_packet(request.clone(), src).await;
        assert!(matches!(
            reply,
            CoordinatorReply::Work { block_id: 1, lo: 12, hi: 21, .. }
        ));

        service.ledger.lock().await.sweep_timeouts(now_ms() + 2_000);

        let reply = service.handle_packet(request.clone(), src).await;
        assert!(matches!(
            reply,
            CoordinatorReply::Work { block_id: 1, lo: 12, hi: 21, .. }
        ));
        assert_eq!(
            service
                .handle_packet(submit_for(&worker, 1, 12, 21, &base), src)
                .await,
            CoordinatorReply::Ack { block_id: 1 }
        );

        // Block 2 goes through cleanly, then the run is done.
        let reply = service.handle_packet(request.clone(), src).await;
        assert!(matches!(reply, CoordinatorReply::Work { block_id: 2, .. }));
        assert_eq!(
            service
                .handle_packet(submit_for(&worker, 2, 22, 30, &base), src)
                .await,
            CoordinatorReply::Ack { block_id: 2 }
        );

        assert_eq!(
            service.handle_packet(request, src).await,
            CoordinatorReply::Done
        );
        assert!(service.ledger.lock().await.is_done());
    }

    #[tokio::test]
    async fn test_two_workers_race_for_one_block() {
        let service = test_service(10, 100).await;

        let first = WorkerMessage::Request { worker: WorkerId::new() };
        let second = WorkerMessage::Request { worker: WorkerId::new() };
        let addr_a = SocketAddr::from(([127, 0, 0, 1], 40001));
        let addr_b = SocketAddr::from(([127, 0, 0, 1], 40002));

        let (reply_a, reply_b) = tokio::join!(
            service.handle_packet(first, addr_a),
            service.handle_packet(second, addr_b)
        );

        let works = [&reply_a, &reply_b]
            .iter()
            .filter(|r| matches!(r, CoordinatorReply::Work { .. }))
            .count();
        let waits = [&reply_a, &reply_b]
            .iter()
            .filter(|r| matches!(r, CoordinatorReply::Wait))
            .count();

        assert_eq!(works, 1);
        assert_eq!(waits, 1);
    }

    #[tokio::test]
    async fn test_submit_for_unknown_block_rejected() {
        let service = test_service(10, 100).await;
        let src = SocketAddr::from(([127, 0, 0, 1], 40001));
        let worker = WorkerId::new();

        let reply = service
            .handle_packet(submit_for(&worker, 42, 2, 10, &[2, 3]), src)
            .await;
        assert_eq!(
            reply,
            CoordinatorReply::Rejected {
                block_id: 42,
                reason: RejectReason::UnknownBlock
            }
        );
    }

    // ============================================================
    // TEST 9: Wire format
    // ============================================================

    #[test]
    fn test_garbage_datagram_does_not_decode() {
        assert!(bincode::deserialize::<WorkerMessage>(b"definitely not bincode").is_err());
    }

    #[test]
    fn test_submit_roundtrip() {
        let msg = WorkerMessage::Submit {
            block_id: 7,
            worker: WorkerId::new(),
            prime_count: 4,
            checksum: 17,
            primes: Some(vec![2, 3, 5, 7]),
        };

        let encoded = bincode::serialize(&msg).unwrap();
        match bincode::deserialize::<WorkerMessage>(&encoded).unwrap() {
            WorkerMessage::Submit { block_id, prime_count, checksum, primes, .. } => {
                assert_eq!(block_id, 7);
                assert_eq!(prime_count, 4);
                assert_eq!(checksum, 17);
                assert_eq!(primes, Some(vec![2, 3, 5, 7]));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}

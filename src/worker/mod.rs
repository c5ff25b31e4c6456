//! Worker Module
//!
//! An independent process that pulls one block at a time from the
//! coordinator, sieves it and reports back. Workers never talk to each
//! other; the coordinator is the only peer, which keeps the topology a
//! star and the failure model per-worker.

pub mod agent;

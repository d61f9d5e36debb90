//! Deterministic synthetic operations

use std::time::Duration;

use bytes::Bytes;
use contracts::{Operation, Priority};

/// Priority mix over a 20-operation period:
/// 1 critical, 3 high, 6 medium, 7 low, 3 background
const MIX: [Priority; 20] = [
    Priority::Low,
    Priority::Medium,
    Priority::High,
    Priority::Low,
    Priority::Background,
    Priority::Medium,
    Priority::Low,
    Priority::Critical,
    Priority::Medium,
    Priority::Low,
    Priority::High,
    Priority::Background,
    Priority::Medium,
    Priority::Low,
    Priority::Medium,
    Priority::Low,
    Priority::High,
    Priority::Background,
    Priority::Medium,
    Priority::Low,
];

/// Produces a repeatable stream of mixed-priority operations
#[derive(Debug, Clone)]
pub struct LoadGenerator {
    next_seq: u64,
    fail_every: u64,
    work_cost: Duration,
}

impl LoadGenerator {
    /// `fail_every = n` makes every n-th operation fail on every attempt
    pub fn new(fail_every: u64, work_cost: Duration) -> Self {
        Self {
            next_seq: 0,
            fail_every,
            work_cost,
        }
    }

    /// Priority of the operation with sequence number `seq`
    pub fn priority_for(seq: u64) -> Priority {
        MIX[(seq % MIX.len() as u64) as usize]
    }

    /// Operations produced so far
    pub fn generated(&self) -> u64 {
        self.next_seq
    }

    pub fn next_operation(&mut self) -> Operation {
        let seq = self.next_seq;
        self.next_seq += 1;

        let fails = self.fail_every > 0 && (seq + 1) % self.fail_every == 0;
        let cost = self.work_cost;

        Operation::new(
            format!("sim-{seq}"),
            Self::priority_for(seq),
            "synthetic",
            Bytes::copy_from_slice(&seq.to_be_bytes()),
        )
        .with_work(move |payload| {
            if !cost.is_zero() {
                std::thread::sleep(cost);
            }
            if fails {
                anyhow::bail!("synthetic failure ({} byte payload)", payload.len());
            }
            Ok(())
        })
    }
}

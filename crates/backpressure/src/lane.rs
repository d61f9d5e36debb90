//! Priority lanes - one bounded queue per priority tier
//!
//! Each lane is a bounded `mpsc` channel: any number of producers push with
//! `try_send` (never blocking), and the dispatch loop is the only consumer.

use std::sync::{Mutex, PoisonError};

use contracts::{LaneCapacities, LaneDepths, Operation, Priority, MAX_LANE_CAPACITY};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Why a push did not land in the lane
#[derive(Debug)]
pub(crate) enum PushError {
    /// Lane at capacity
    Full(Operation),
    /// Consumer side gone
    Closed(Operation),
}

/// A bounded FIFO lane for a single priority
pub struct Lane {
    priority: Priority,
    capacity: usize,
    tx: mpsc::Sender<Operation>,
    rx: Mutex<mpsc::Receiver<Operation>>,
}

impl Lane {
    /// Create a lane holding between 1 and `MAX_LANE_CAPACITY` operations
    pub fn new(priority: Priority, capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_LANE_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            priority,
            capacity,
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current occupancy
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue without waiting; fails fast when full
    pub(crate) fn try_push(&self, operation: Operation) -> Result<(), PushError> {
        self.tx.try_send(operation).map_err(|e| match e {
            TrySendError::Full(op) => PushError::Full(op),
            TrySendError::Closed(op) => PushError::Closed(op),
        })
    }

    /// Dequeue the oldest operation, if any.
    ///
    /// A concurrent `try_push` reserves its slot before writing the value, so
    /// `try_recv` can briefly report `Empty` while `len()` is non-zero. One
    /// retry covers the common case; if the write is still in flight the
    /// operation is picked up on the next cycle.
    pub(crate) fn pop(&self) -> Option<Operation> {
        let mut rx = self.rx.lock().unwrap_or_else(PoisonError::into_inner);
        match rx.try_recv() {
            Ok(operation) => Some(operation),
            Err(TryRecvError::Empty) if self.len() > 0 => {
                std::hint::spin_loop();
                rx.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

/// The five lanes, indexed by priority
pub struct LaneSet {
    lanes: [Lane; Priority::COUNT],
}

impl LaneSet {
    pub fn new(capacities: &LaneCapacities) -> Self {
        Self {
            lanes: Priority::ALL.map(|p| Lane::new(p, capacities.capacity(p))),
        }
    }

    /// Lane serving `priority`
    pub fn lane(&self, priority: Priority) -> &Lane {
        &self.lanes[priority.index()]
    }

    /// Lanes in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &Lane> {
        self.lanes.iter()
    }

    /// Occupancy snapshot of every lane
    pub fn depths(&self) -> LaneDepths {
        self.lanes.iter().map(|l| (l.priority(), l.len())).collect()
    }

    pub fn total_len(&self) -> usize {
        self.lanes.iter().map(Lane::len).sum()
    }

    pub fn total_capacity(&self) -> usize {
        self.lanes.iter().map(Lane::capacity).sum()
    }

    /// Aggregate occupancy ratio in [0, 1]
    pub fn utilization(&self) -> f64 {
        let capacity = self.total_capacity();
        if capacity == 0 {
            0.0
        } else {
            self.total_len() as f64 / capacity as f64
        }
    }
}

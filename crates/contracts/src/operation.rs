//! Operation - one unit of admitted work
//!
//! Created once by the caller and handed over to the manager on submit. After
//! that only the dispatch loop touches it (retry bookkeeping).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::{Priority, WorkFn};

/// Default retry budget
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A unit of work with a priority and retry budget
pub struct Operation {
    id: String,
    priority: Priority,
    op_type: String,
    payload: Bytes,
    submitted_at: Instant,
    retry_count: u32,
    max_retries: u32,
    work: Option<WorkFn>,
}

impl Operation {
    /// Create an operation without a work unit
    pub fn new(
        id: impl Into<String>,
        priority: Priority,
        op_type: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            op_type: op_type.into(),
            payload: payload.into(),
            submitted_at: Instant::now(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            work: None,
        }
    }

    /// Attach the work unit invoked at dispatch time
    pub fn with_work<F>(mut self, work: F) -> Self
    where
        F: Fn(Bytes) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.work = Some(Arc::new(work));
        self
    }

    /// Attach an already shared work unit
    pub fn with_shared_work(mut self, work: WorkFn) -> Self {
        self.work = Some(work);
        self
    }

    /// Override the retry budget
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Free-form type tag, opaque to the manager
    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Monotonic submission timestamp
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Time since the operation was created
    pub fn age(&self) -> Duration {
        self.submitted_at.elapsed()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn has_work(&self) -> bool {
        self.work.is_some()
    }

    /// Consume one retry from the budget.
    ///
    /// Returns `false` without changing anything once the budget is spent.
    pub fn record_retry(&mut self) -> bool {
        if self.retry_count < self.max_retries {
            self.retry_count += 1;
            true
        } else {
            false
        }
    }

    /// Invoke the work unit with the payload.
    ///
    /// An operation without a work unit succeeds trivially.
    pub fn invoke(&self) -> anyhow::Result<()> {
        match &self.work {
            Some(work) => work(self.payload.clone()),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("op_type", &self.op_type)
            .field("payload_len", &self.payload.len())
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("has_work", &self.work.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_operation_defaults() {
        let op = Operation::new("op-1", Priority::High, "quote", "payload");
        assert_eq!(op.id(), "op-1");
        assert_eq!(op.priority(), Priority::High);
        assert_eq!(op.op_type(), "quote");
        assert_eq!(op.payload().as_ref(), b"payload");
        assert_eq!(op.retry_count(), 0);
        assert_eq!(op.max_retries(), DEFAULT_MAX_RETRIES);
        assert!(!op.has_work());
        assert!(op.invoke().is_ok());
    }

    #[test]
    fn test_retry_budget() {
        let mut op = Operation::new("op", Priority::Low, "t", Bytes::new()).with_max_retries(2);
        assert!(op.record_retry());
        assert!(op.record_retry());
        assert!(!op.record_retry());
        assert_eq!(op.retry_count(), 2);
    }

    #[test]
    fn test_invoke_passes_payload() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::new("op", Priority::Medium, "t", vec![1u8, 2, 3]).with_work(
            move |payload| {
                assert_eq!(payload.as_ref(), &[1, 2, 3]);
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
        );

        op.invoke().unwrap();
        op.invoke().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_invoke_surfaces_error() {
        let op = Operation::new("op", Priority::Medium, "t", Bytes::new())
            .with_work(|_| anyhow::bail!("boom"));
        let err = op.invoke().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}

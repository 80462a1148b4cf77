//! Write-once, ordinal-indexed result slots.
//!
//! Each ordinal owns its own `OnceLock`, so workers finishing different jobs
//! never contend and output order never depends on completion order.

use std::sync::OnceLock;

use thiserror::Error;

use super::job::EnrichmentResult;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlotError {
    #[error("Result slot {0} is already filled")]
    AlreadyFilled(usize),

    #[error("Result slot {ordinal} is out of range (len {len})")]
    OutOfRange { ordinal: usize, len: usize },
}

/// One write-once slot per input record.
#[derive(Debug)]
pub struct ResultSlots {
    slots: Vec<OnceLock<EnrichmentResult>>,
}

impl ResultSlots {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stores the result for its ordinal. A second write is rejected.
    pub fn fill(&self, result: EnrichmentResult) -> Result<(), SlotError> {
        let ordinal = result.ordinal;
        let slot = self.slots.get(ordinal).ok_or(SlotError::OutOfRange {
            ordinal,
            len: self.slots.len(),
        })?;
        slot.set(result)
            .map_err(|_| SlotError::AlreadyFilled(ordinal))
    }

    pub fn get(&self, ordinal: usize) -> Option<&EnrichmentResult> {
        self.slots.get(ordinal).and_then(OnceLock::get)
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_some()).count()
    }

    /// Results in ordinal order; `None` where no job ran.
    pub fn into_results(self) -> Vec<Option<EnrichmentResult>> {
        self.slots.into_iter().map(OnceLock::into_inner).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::Arc;

    #[test]
    fn test_write_once() {
        let slots = ResultSlots::new(3);
        slots
            .fill(EnrichmentResult::unattempted(1))
            .expect("first write");
        assert_eq!(
            slots.fill(EnrichmentResult::failure(1, ErrorKind::Transient, "late", 1)),
            Err(SlotError::AlreadyFilled(1))
        );
        // The first value survives.
        assert_eq!(
            slots.get(1).and_then(|r| r.error_kind),
            Some(ErrorKind::Unattempted)
        );
        assert_eq!(slots.filled(), 1);
    }

    #[test]
    fn test_out_of_range() {
        let slots = ResultSlots::new(2);
        assert_eq!(
            slots.fill(EnrichmentResult::unattempted(2)),
            Err(SlotError::OutOfRange { ordinal: 2, len: 2 })
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_out_of_order_completion_keeps_input_order() {
        let slots = Arc::new(ResultSlots::new(64));
        let mut handles = Vec::new();
        for ordinal in (0..64).rev() {
            let slots = Arc::clone(&slots);
            handles.push(tokio::spawn(async move {
                slots
                    .fill(EnrichmentResult::unattempted(ordinal))
                    .expect("fill");
            }));
        }
        for handle in handles {
            handle.await.expect("task");
        }

        let slots = Arc::try_unwrap(slots).expect("sole owner");
        let results = slots.into_results();
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.as_ref().map(|r| r.ordinal), Some(i));
        }
    }
}

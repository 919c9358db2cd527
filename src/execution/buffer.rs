//! Replay buffer of recent execution results

use crate::core::error::BufferError;
use crate::execution::ExecutionResult;
use std::sync::{Arc, Mutex, MutexGuard};

/// Fixed-capacity ring of results, oldest evicted first
///
/// Slots are allocated once; `written` counts every push ever made, so the
/// next slot is `written % capacity`.
#[derive(Debug)]
pub struct OutputBuffer {
    ring: Mutex<Ring>,
    capacity: usize,
}

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<Arc<ExecutionResult>>>,
    written: u64,
}

impl OutputBuffer {
    /// Create a buffer holding `capacity` results (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                slots: vec![None; capacity],
                written: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        let ring = self.lock();
        (ring.written as usize).min(self.capacity)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().written == 0
    }

    /// Store a result, evicting the oldest when full
    pub fn push(&self, result: impl Into<Arc<ExecutionResult>>) {
        let mut ring = self.lock();
        let slot = (ring.written % self.capacity as u64) as usize;
        ring.slots[slot] = Some(result.into());
        ring.written += 1;
    }

    /// The `n`-th most recent result; 1 is the latest
    pub fn get(&self, n: usize) -> Result<Arc<ExecutionResult>, BufferError> {
        let ring = self.lock();
        let available = (ring.written as usize).min(self.capacity);
        if n == 0 || n > available {
            return Err(BufferError::NotFound { index: n, available });
        }
        let slot = ((ring.written - n as u64) % self.capacity as u64) as usize;
        ring.slots[slot]
            .clone()
            .ok_or(BufferError::NotFound { index: n, available })
    }

    /// Every stored result, newest first
    pub fn recent(&self) -> Vec<Arc<ExecutionResult>> {
        let available = self.len();
        (1..=available).filter_map(|n| self.get(n).ok()).collect()
    }

    fn lock(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner())
    }
}

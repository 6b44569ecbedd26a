use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::types::ExecutionRecord;

/// Bounded FIFO of execution records. Oldest entries are evicted first.
#[derive(Debug)]
pub struct ExecutionHistory {
    records: Mutex<VecDeque<ExecutionRecord>>,
    capacity: usize,
}

impl ExecutionHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn push(&self, record: ExecutionRecord) {
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Copy of all records, oldest first.
    pub fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

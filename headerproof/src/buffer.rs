//! FIFO buffer of headers waiting to be committed.

use std::{collections::VecDeque, num::NonZeroUsize};

use headerproof_merkle_tree::Hash;

use crate::{Error, HeaderRecord};

/// Headers not yet committed to a tree, in arrival order.
///
/// Holds at most `capacity` records. Records only leave through
/// [`drain_batch`](Self::drain_batch).
#[derive(Debug, Clone)]
pub struct BatchBuffer {
    capacity: NonZeroUsize,
    records: VecDeque<HeaderRecord>,
}

impl BatchBuffer {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.get()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity.get()
    }

    /// Append a record at the tail.
    ///
    /// Returns `true` when the buffer has just become full and must be
    /// drained. A full buffer rejects the record and stays unchanged.
    pub fn append(&mut self, record: HeaderRecord) -> Result<bool, Error> {
        if self.is_full() {
            return Err(Error::BufferFull {
                capacity: self.capacity(),
            });
        }
        self.records.push_back(record);
        Ok(self.is_full())
    }

    /// Remove and return the first `capacity` records in order.
    ///
    /// Fails without touching the buffer if fewer are buffered.
    pub fn drain_batch(&mut self) -> Result<Vec<HeaderRecord>, Error> {
        if !self.is_full() {
            return Err(Error::BatchNotReady {
                len: self.len(),
                capacity: self.capacity(),
            });
        }
        Ok(self.records.drain(..self.capacity.get()).collect())
    }

    /// First buffered record at height `number`.
    pub fn find_by_number(&self, number: u64) -> Option<&HeaderRecord> {
        self.records.iter().find(|r| r.number == number)
    }

    /// First buffered record with canonical hash `hash`.
    pub fn find_by_hash(&self, hash: &Hash) -> Option<&HeaderRecord> {
        self.records.iter().find(|r| &r.hash == hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderRecord> {
        self.records.iter()
    }
}

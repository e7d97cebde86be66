//! A [`PageSource`] over batches that are already in memory.

use std::collections::VecDeque;

use arrow_array::RecordBatch;

use crate::page::{Page, PageSource};
use crate::DeltaResult;

pub struct InMemoryPageSource {
    batches: VecDeque<RecordBatch>,
    completed_positions: u64,
    completed_bytes: u64,
    finished: bool,
}

impl InMemoryPageSource {
    pub fn new(batches: impl IntoIterator<Item = RecordBatch>) -> Self {
        Self {
            batches: batches.into_iter().collect(),
            completed_positions: 0,
            completed_bytes: 0,
            finished: false,
        }
    }
}

impl PageSource for InMemoryPageSource {
    fn next_page(&mut self) -> DeltaResult<Option<Page>> {
        if self.finished {
            return Ok(None);
        }
        match self.batches.pop_front() {
            Some(batch) => {
                self.completed_positions += batch.num_rows() as u64;
                self.completed_bytes += batch.get_array_memory_size() as u64;
                Ok(Some(Page::new(batch)))
            }
            None => {
                self.finished = true;
                Ok(None)
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }

    fn completed_positions(&self) -> u64 {
        self.completed_positions
    }

    fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    fn close(&mut self) -> DeltaResult<()> {
        self.batches.clear();
        self.finished = true;
        Ok(())
    }
}

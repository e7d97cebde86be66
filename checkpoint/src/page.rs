//! The block-oriented page stream the iterator consumes.
//!
//! A [`Page`] is one batch of checkpoint rows; each channel holds the column block of one
//! projected action kind. The [`PageSource`] owning the underlying file is handed to the
//! iterator, which closes it on end-of-stream, explicit close, or any failure.

use arrow_array::{ArrayRef, RecordBatch};

use crate::DeltaResult;

/// One batch of materialized checkpoint rows
#[derive(Debug, Clone)]
pub struct Page {
    batch: RecordBatch,
}

impl Page {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Number of column blocks in this page
    pub fn channel_count(&self) -> usize {
        self.batch.num_columns()
    }

    /// Number of rows in this page
    pub fn position_count(&self) -> usize {
        self.batch.num_rows()
    }

    /// The column block for one channel
    pub fn block(&self, channel: usize) -> &ArrayRef {
        self.batch.column(channel)
    }

    /// The channel carrying the named column, if any
    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.batch.schema_ref().index_of(name).ok()
    }

    pub fn record_batch(&self) -> &RecordBatch {
        &self.batch
    }
}

impl From<RecordBatch> for Page {
    fn from(batch: RecordBatch) -> Self {
        Page::new(batch)
    }
}

/// A pull-based source of [`Page`]s over one checkpoint file.
///
/// `close` must be idempotent; every implementation is owned by exactly one iterator, so no
/// locking is required.
pub trait PageSource {
    /// The next page, or `None` once the source is exhausted
    fn next_page(&mut self) -> DeltaResult<Option<Page>>;

    fn is_finished(&self) -> bool;

    /// Rows handed out so far
    fn completed_positions(&self) -> u64;

    /// Decoded bytes handed out so far
    fn completed_bytes(&self) -> u64;

    /// Release the underlying file. Further `next_page` calls return `None`.
    fn close(&mut self) -> DeltaResult<()>;
}

//! The default [`PageSource`]: a Parquet reader with projection and row-group pruning driven by
//! a [`PushdownPlan`].

use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::arrow::ProjectionMask;
use parquet::file::reader::ChunkReader;
use parquet::schema::types::Type;
use tracing::debug;
use url::Url;

use crate::actions::ADD_NAME;
use crate::page::{Page, PageSource};
use crate::pushdown::PushdownPlan;
use crate::stats::START_OF_MODERN_ERA_EPOCH_DAY;
use crate::{DeltaResult, Error};

/// Tuning knobs for reading a checkpoint file
#[derive(Debug, Clone)]
pub struct ParquetReaderOptions {
    /// Rows per materialized page
    pub batch_size: usize,
    /// Discrete partition-value sets wider than this are not pushed into the Parquet predicate
    pub domain_compaction_threshold: usize,
    /// Timestamp statistics whose epoch day predates this are dropped as untrusted
    pub modern_era_cutoff_epoch_day: i64,
}

impl Default for ParquetReaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 1024,
            domain_compaction_threshold: 100,
            modern_era_cutoff_epoch_day: *START_OF_MODERN_ERA_EPOCH_DAY,
        }
    }
}

impl ParquetReaderOptions {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_domain_compaction_threshold(mut self, threshold: usize) -> Self {
        self.domain_compaction_threshold = threshold;
        self
    }

    pub fn with_modern_era_cutoff_epoch_day(mut self, epoch_day: i64) -> Self {
        self.modern_era_cutoff_epoch_day = epoch_day;
        self
    }
}

/// Streams projected pages out of one checkpoint Parquet file
pub struct ParquetPageSource {
    reader: Option<ParquetRecordBatchReader>,
    add_has_parsed_stats: bool,
    completed_positions: u64,
    completed_bytes: u64,
}

impl ParquetPageSource {
    /// Open `input`, project the action columns the plan asks for, and select only the row
    /// groups whose statistics do not rule out every requested kind.
    pub fn try_new<R: ChunkReader + 'static>(
        input: R,
        location: &Url,
        plan: &PushdownPlan,
        options: &ParquetReaderOptions,
    ) -> DeltaResult<Self> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(input)?;
        let metadata = builder.metadata().clone();
        let schema_descr = metadata.file_metadata().schema_descr();

        let root_fields = schema_descr.root_schema().get_fields();
        let root_indices = plan
            .projected_columns()
            .map(|name| {
                root_fields
                    .iter()
                    .position(|field| field.name() == name)
                    .ok_or_else(|| {
                        Error::schema(format!(
                            "Checkpoint file {location} has no '{name}' column"
                        ))
                    })
            })
            .collect::<DeltaResult<Vec<_>>>()?;
        let projection = ProjectionMask::roots(schema_descr, root_indices);
        let add_has_parsed_stats = root_fields
            .iter()
            .find(|field| field.name() == ADD_NAME)
            .is_some_and(|field| match field.as_ref() {
                Type::GroupType { fields, .. } => fields
                    .iter()
                    .any(|sub_field| sub_field.name() == "stats_parsed"),
                Type::PrimitiveType { .. } => false,
            });

        let row_groups: Vec<usize> = metadata
            .row_groups()
            .iter()
            .enumerate()
            .filter(|(_, row_group)| plan.row_group_may_match(row_group))
            .map(|(index, _)| index)
            .collect();
        debug!(
            "Reading checkpoint {location}: {} of {} row groups survive pruning",
            row_groups.len(),
            metadata.num_row_groups()
        );

        let reader = builder
            .with_projection(projection)
            .with_batch_size(options.batch_size)
            .with_row_groups(row_groups)
            .build()?;
        Ok(Self {
            reader: Some(reader),
            add_has_parsed_stats,
            completed_positions: 0,
            completed_bytes: 0,
        })
    }

    /// Whether the file's `add` column carries a `stats_parsed` sub-row
    pub fn file_has_add_parsed_stats(&self) -> bool {
        self.add_has_parsed_stats
    }
}

impl PageSource for ParquetPageSource {
    fn next_page(&mut self) -> DeltaResult<Option<Page>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };
        match reader.next() {
            Some(Ok(batch)) => {
                self.completed_positions += batch.num_rows() as u64;
                self.completed_bytes += batch.get_array_memory_size() as u64;
                Ok(Some(Page::new(batch)))
            }
            Some(Err(error)) => {
                self.reader = None;
                Err(error.into())
            }
            None => {
                self.reader = None;
                Ok(None)
            }
        }
    }

    fn is_finished(&self) -> bool {
        self.reader.is_none()
    }

    fn completed_positions(&self) -> u64 {
        self.completed_positions
    }

    fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    fn close(&mut self) -> DeltaResult<()> {
        self.reader = None;
        Ok(())
    }
}

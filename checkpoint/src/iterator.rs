//! The iterator core: drives page advancement, fans each row out across the requested
//! extractors in order, and owns the page source for its lifetime.
//!
//! Entries are emitted in row order and, within one row, in the caller-specified order of
//! action kinds. The page source is closed exactly once: on exhaustion, on explicit close, and
//! on any error during construction or iteration.

use std::collections::VecDeque;
use std::sync::Arc;

use itertools::Itertools;
use parquet::file::reader::ChunkReader;
use tracing::{debug, warn};
use url::Url;

use crate::actions::extractors::{
    AddExtractor, EntryExtractor, MetadataExtractor, ProtocolExtractor, RemoveExtractor,
    SidecarExtractor, TxnExtractor,
};
use crate::actions::{ActionKind, CheckpointEntry, MetadataEntry, ProtocolEntry};
use crate::engine::parquet::{ParquetPageSource, ParquetReaderOptions};
use crate::page::{Page, PageSource};
use crate::partition::PartitionConstraint;
use crate::pushdown::PushdownPlan;
use crate::schema_manager::{CheckpointSchemaManager, DefaultSchemaManager};
use crate::stats::{StatsColumnFilter, StatsExtractor};
use crate::utils::require;
use crate::{DeltaResult, Error};

/// Configures and opens a [`CheckpointEntryIterator`].
pub struct CheckpointReadBuilder {
    location: Url,
    kinds: Vec<ActionKind>,
    schema_manager: Arc<dyn CheckpointSchemaManager>,
    metadata: Option<MetadataEntry>,
    protocol: Option<ProtocolEntry>,
    options: ParquetReaderOptions,
    partition_constraint: PartitionConstraint,
    stats_filter: Option<StatsColumnFilter>,
    preserve_row_stats: bool,
    parsed_stats: Option<bool>,
}

impl CheckpointReadBuilder {
    /// Start a read of the checkpoint at `location` for the given action kinds. The kind order
    /// given here is the order entries of one row are emitted in; duplicate kinds collapse to
    /// their first occurrence.
    pub fn new(location: Url, kinds: impl IntoIterator<Item = ActionKind>) -> Self {
        Self {
            location,
            kinds: kinds.into_iter().unique().collect(),
            schema_manager: Arc::new(DefaultSchemaManager::new()),
            metadata: None,
            protocol: None,
            options: ParquetReaderOptions::default(),
            partition_constraint: PartitionConstraint::all(),
            stats_filter: None,
            preserve_row_stats: false,
            parsed_stats: None,
        }
    }

    pub fn with_schema_manager(mut self, manager: Arc<dyn CheckpointSchemaManager>) -> Self {
        self.schema_manager = manager;
        self
    }

    /// The table metadata entry; required when `add` entries are requested, because the `add`
    /// row type cannot be resolved without it.
    pub fn with_metadata(mut self, metadata: MetadataEntry) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// The protocol entry; required when `add` entries are requested. Its reader features
    /// decide whether deletion-vector sub-rows are expected.
    pub fn with_protocol(mut self, protocol: ProtocolEntry) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_options(mut self, options: ParquetReaderOptions) -> Self {
        self.options = options;
        self
    }

    /// Prune `add` entries to the partitions satisfying the constraint, both at the row-group
    /// level and row by row.
    pub fn with_partition_constraint(mut self, constraint: PartitionConstraint) -> Self {
        self.partition_constraint = constraint;
        self
    }

    /// Which columns min/max statistics are decoded for; required when `add` is requested.
    pub fn with_stats_filter(mut self, filter: StatsColumnFilter) -> Self {
        self.stats_filter = Some(filter);
        self
    }

    /// Carry row-typed statistics verbatim so a rewrite can preserve their bytes.
    pub fn with_row_stats_preserved(mut self, preserve: bool) -> Self {
        self.preserve_row_stats = preserve;
        self
    }

    /// Force whether a `stats_parsed` sub-row is expected. When not set, reading a Parquet file
    /// detects it from the file schema and an externally supplied page source defaults to
    /// expecting none.
    pub fn with_parsed_stats(mut self, parsed_stats: bool) -> Self {
        self.parsed_stats = Some(parsed_stats);
        self
    }

    /// The projection and row-group pruning plan this read will use.
    pub fn plan(&self) -> DeltaResult<PushdownPlan> {
        require!(
            !self.kinds.is_empty(),
            Error::invalid_configuration("No action kinds requested")
        );
        Ok(PushdownPlan::new(
            &self.kinds,
            &self.partition_constraint,
            self.options.domain_compaction_threshold,
        ))
    }

    /// Open the checkpoint Parquet file and build the iterator over it.
    pub fn build<R: ChunkReader + 'static>(
        self,
        file: R,
    ) -> DeltaResult<CheckpointEntryIterator> {
        let plan = self.plan()?;
        let source = ParquetPageSource::try_new(file, &self.location, &plan, &self.options)?;
        let parsed_stats = self
            .parsed_stats
            .unwrap_or_else(|| source.file_has_add_parsed_stats());
        self.into_iterator(Box::new(source), parsed_stats)
    }

    /// Build the iterator over an already-opened page source. The source must deliver pages
    /// whose channels are exactly the requested action columns.
    pub fn build_with_source(
        self,
        source: Box<dyn PageSource>,
    ) -> DeltaResult<CheckpointEntryIterator> {
        let parsed_stats = self.parsed_stats.unwrap_or(false);
        self.into_iterator(source, parsed_stats)
    }

    fn into_iterator(
        self,
        mut source: Box<dyn PageSource>,
        parsed_stats: bool,
    ) -> DeltaResult<CheckpointEntryIterator> {
        match self.build_extractors(parsed_stats) {
            Ok(extractors) => Ok(CheckpointEntryIterator {
                source,
                location: self.location,
                page: None,
                page_position: 0,
                channels: None,
                next_entries: VecDeque::new(),
                extractors,
                closed: false,
            }),
            Err(error) => {
                // construction failures must release the source before propagating
                if let Err(close_error) = source.close() {
                    warn!("Error closing page source after failed construction: {close_error}");
                }
                Err(error)
            }
        }
    }

    fn build_extractors(
        &self,
        parsed_stats: bool,
    ) -> DeltaResult<Vec<Box<dyn EntryExtractor>>> {
        require!(
            !self.kinds.is_empty(),
            Error::invalid_configuration("No action kinds requested")
        );
        let deletion_vectors_enabled = self
            .protocol
            .as_ref()
            .is_some_and(ProtocolEntry::supports_deletion_vectors);
        self.kinds
            .iter()
            .map(|&kind| {
                let extractor: Box<dyn EntryExtractor> = match kind {
                    ActionKind::Txn => {
                        Box::new(TxnExtractor::new(self.schema_manager.txn_entry_type()))
                    }
                    ActionKind::Metadata => Box::new(MetadataExtractor::new(
                        self.schema_manager.metadata_entry_type(),
                    )),
                    ActionKind::Protocol => Box::new(ProtocolExtractor::new(
                        self.schema_manager.protocol_entry_type(true, true),
                    )),
                    ActionKind::Sidecar => Box::new(SidecarExtractor::new(
                        self.schema_manager.sidecar_entry_type(),
                    )),
                    ActionKind::Remove => Box::new(RemoveExtractor::new(
                        self.schema_manager
                            .remove_entry_type(deletion_vectors_enabled),
                        deletion_vectors_enabled,
                    )),
                    ActionKind::Add => {
                        let metadata = self.metadata.as_ref().ok_or_else(|| {
                            Error::invalid_configuration(
                                "Reading 'add' entries requires the table metadata entry",
                            )
                        })?;
                        let protocol = self.protocol.as_ref().ok_or_else(|| {
                            Error::invalid_configuration(
                                "Reading 'add' entries requires the table protocol entry",
                            )
                        })?;
                        let stats_filter = self.stats_filter.as_ref().ok_or_else(|| {
                            Error::invalid_configuration(
                                "Reading 'add' entries requires a stats column filter",
                            )
                        })?;
                        let entry_type = self.schema_manager.add_entry_type(
                            metadata,
                            protocol,
                            stats_filter,
                            parsed_stats,
                            deletion_vectors_enabled,
                            self.preserve_row_stats,
                        )?;
                        Box::new(AddExtractor::new(
                            entry_type,
                            self.partition_constraint.clone(),
                            deletion_vectors_enabled,
                            StatsExtractor::new(
                                stats_filter.clone(),
                                self.preserve_row_stats,
                                self.options.modern_era_cutoff_epoch_day,
                            ),
                        ))
                    }
                };
                Ok(extractor)
            })
            .collect()
    }
}

/// A lazy, finite, non-restartable stream of typed checkpoint log entries.
pub struct CheckpointEntryIterator {
    source: Box<dyn PageSource>,
    location: Url,
    page: Option<Page>,
    page_position: usize,
    /// Channel carrying each extractor's action column, resolved against the first page
    channels: Option<Vec<usize>>,
    next_entries: VecDeque<CheckpointEntry>,
    extractors: Vec<Box<dyn EntryExtractor>>,
    closed: bool,
}

impl CheckpointEntryIterator {
    /// Release the underlying page source. Idempotent; after closing, the iterator yields
    /// nothing.
    pub fn close(&mut self) -> DeltaResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.page = None;
        self.next_entries.clear();
        self.source.close()
    }

    /// Rows the underlying source has delivered so far
    pub fn completed_positions(&self) -> u64 {
        self.source.completed_positions()
    }

    /// Decoded bytes the underlying source has delivered so far
    pub fn completed_bytes(&self) -> u64 {
        self.source.completed_bytes()
    }

    fn close_quietly(&mut self) {
        if let Err(error) = self.close() {
            warn!("Error closing page source for {}: {error}", self.location);
        }
    }

    fn resolve_channels(&self, page: &Page) -> DeltaResult<Vec<usize>> {
        require!(
            page.channel_count() == self.extractors.len(),
            Error::schema(format!(
                "Page has {} channels where {} action columns were requested",
                page.channel_count(),
                self.extractors.len()
            ))
        );
        self.extractors
            .iter()
            .map(|extractor| {
                let name = extractor.kind().column_name();
                page.channel_index(name).ok_or_else(|| {
                    Error::schema(format!("Page carries no '{name}' column"))
                })
            })
            .collect()
    }

    fn extract_row(
        page: &Page,
        channels: &[usize],
        extractors: &[Box<dyn EntryExtractor>],
        position: usize,
    ) -> DeltaResult<Vec<CheckpointEntry>> {
        let mut entries = Vec::new();
        for (extractor, &channel) in extractors.iter().zip(channels) {
            if let Some(entry) = extractor.extract(position, page.block(channel))? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Attach the checkpoint location to data-shape errors before they surface.
    fn located(&self, error: Error) -> Error {
        let location = &self.location;
        match error {
            Error::Schema(msg) => Error::Schema(format!("{msg} in checkpoint file {location}")),
            Error::MissingData(msg) => {
                Error::MissingData(format!("{msg} in checkpoint file {location}"))
            }
            Error::UnexpectedColumnType(msg) => {
                Error::UnexpectedColumnType(format!("{msg} in checkpoint file {location}"))
            }
            other => other,
        }
    }
}

impl Iterator for CheckpointEntryIterator {
    type Item = DeltaResult<CheckpointEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        loop {
            if let Some(entry) = self.next_entries.pop_front() {
                return Some(Ok(entry));
            }

            let page_ready = self
                .page
                .as_ref()
                .is_some_and(|page| self.page_position < page.position_count());
            if !page_ready {
                match self.source.next_page() {
                    Ok(Some(page)) => {
                        if self.channels.is_none() {
                            match self.resolve_channels(&page) {
                                Ok(channels) => self.channels = Some(channels),
                                Err(error) => {
                                    let error = self.located(error);
                                    self.close_quietly();
                                    return Some(Err(error));
                                }
                            }
                        }
                        debug!(
                            "Advancing to a page of {} rows from {}",
                            page.position_count(),
                            self.location
                        );
                        self.page = Some(page);
                        self.page_position = 0;
                    }
                    Ok(None) => {
                        self.close_quietly();
                        return None;
                    }
                    Err(error) => {
                        self.close_quietly();
                        return Some(Err(error));
                    }
                }
                continue;
            }

            let row_result = match (self.page.as_ref(), self.channels.as_ref()) {
                (Some(page), Some(channels)) => {
                    Self::extract_row(page, channels, &self.extractors, self.page_position)
                }
                _ => Err(Error::internal_error(
                    "Page and channels must be resolved before row extraction",
                )),
            };
            match row_result {
                Ok(entries) => {
                    self.next_entries.extend(entries);
                    self.page_position += 1;
                }
                Err(error) => {
                    let error = self.located(error);
                    self.close_quietly();
                    return Some(Err(error));
                }
            }
        }
    }
}

impl Drop for CheckpointEntryIterator {
    fn drop(&mut self) {
        self.close_quietly();
    }
}

//! delta-checkpoint: a streaming reader for Delta Lake checkpoint Parquet files.
//!
//! A checkpoint is a columnar snapshot of a table's transaction log: one Parquet file (or a set
//! of sidecar files) whose top-level columns are the Delta action kinds (`txn`, `add`,
//! `remove`, `metadata`, `protocol`, `sidecar`), with at most one action populated per row.
//! [`CheckpointReadBuilder`] projects the caller's subset of action kinds, pushes per-kind
//! not-null domains and partition-value domains into the Parquet reader, and yields a lazy
//! stream of typed [`CheckpointEntry`] records:
//!
//! ```no_run
//! use delta_checkpoint::{ActionKind, CheckpointReadBuilder};
//! use url::Url;
//!
//! # fn main() -> delta_checkpoint::DeltaResult<()> {
//! let location =
//!     Url::parse("file:///table/_delta_log/00000000000000000010.checkpoint.parquet").unwrap();
//! let file = std::fs::File::open(location.path())?;
//! let iter = CheckpointReadBuilder::new(
//!     location,
//!     [ActionKind::Metadata, ActionKind::Protocol],
//! )
//! .build(file)?;
//! for entry in iter {
//!     println!("{}", entry?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Reading `add` entries additionally requires the table's metadata and protocol entries (the
//! `add` row type cannot be resolved without them) and a stats-column filter; see
//! [`CheckpointReadBuilder`].

pub mod actions;
pub mod engine;
mod error;
pub mod iterator;
pub mod page;
pub mod partition;
pub mod pushdown;
pub mod row;
pub mod schema;
pub mod schema_manager;
pub mod stats;
mod utils;

pub use actions::{
    ActionKind, AddFileEntry, CheckpointEntry, DeletionVectorDescriptor, FormatEntry,
    MetadataEntry, ProtocolEntry, RemoveFileEntry, SidecarEntry, TxnEntry,
};
pub use engine::parquet::ParquetReaderOptions;
pub use error::{DeltaResult, Error};
pub use iterator::{CheckpointEntryIterator, CheckpointReadBuilder};
pub use partition::{PartitionConstraint, PartitionDomain};
pub use stats::{ParsedStats, Scalar, StatsColumnFilter};

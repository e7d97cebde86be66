//! Page-source implementations: the default Parquet-backed source and an in-memory one for
//! embedders that already hold materialized batches.

pub mod memory;
pub mod parquet;

pub use self::memory::InMemoryPageSource;
pub use self::parquet::ParquetPageSource;

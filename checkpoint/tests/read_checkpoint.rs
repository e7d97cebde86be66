//! End-to-end reads of checkpoint Parquet files written in memory.

use std::sync::Arc;

use test_log::test;
use url::Url;

use delta_checkpoint::engine::memory::InMemoryPageSource;
use delta_checkpoint::schema::{DataType, StructField, StructType};
use delta_checkpoint::schema_manager::{CheckpointSchemaManager, DefaultSchemaManager};
use delta_checkpoint::{
    ActionKind, CheckpointEntry, CheckpointReadBuilder, DeltaResult, Error, ParquetReaderOptions,
    PartitionConstraint, PartitionDomain, Scalar, StatsColumnFilter,
};
use test_utils::{
    basic_protocol_entry, checkpoint_batch, deletion_vector_protocol_entry, metadata_entry,
    write_checkpoint_file,
};

fn location() -> Url {
    Url::parse("memory://table/_delta_log/00000000000000000010.checkpoint.parquet").unwrap()
}

const METADATA_ROW: &str = r#"{"metadata":{"id":"t1","name":"t","description":"","format":{"provider":"parquet","options":{}},"schemaString":"{\"type\":\"struct\",\"fields\":[]}","partitionColumns":[],"configuration":{},"createdTime":0}}"#;
const PROTOCOL_ROW: &str = r#"{"protocol":{"minReaderVersion":1,"minWriterVersion":2}}"#;
const TXN_ROW: &str = r#"{"txn":{"appId":"app-1","version":4,"lastUpdated":10}}"#;

/// The outer checkpoint row type for the given kinds, with `add` resolved for `metadata`
fn checkpoint_row_type(kinds: &[ActionKind], add_type: Option<StructType>) -> StructType {
    let manager = DefaultSchemaManager::new();
    StructType::new(kinds.iter().map(|kind| {
        let entry_type = match kind {
            ActionKind::Txn => manager.txn_entry_type().as_ref().clone(),
            ActionKind::Metadata => manager.metadata_entry_type().as_ref().clone(),
            ActionKind::Protocol => manager.protocol_entry_type(true, true).as_ref().clone(),
            ActionKind::Remove => manager.remove_entry_type(true).as_ref().clone(),
            ActionKind::Sidecar => manager.sidecar_entry_type().as_ref().clone(),
            ActionKind::Add => add_type.clone().expect("an add row type"),
        };
        StructField::nullable(kind.column_name(), entry_type)
    }))
}

#[test]
fn metadata_only_checkpoint_round_trips() -> DeltaResult<()> {
    let kinds = [ActionKind::Metadata];
    let row_type = checkpoint_row_type(&kinds, None);
    let file = write_checkpoint_file(&[checkpoint_batch(&row_type, &[METADATA_ROW])]);

    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build(file)?
        .collect::<DeltaResult<_>>()?;

    assert_eq!(entries.len(), 1);
    let CheckpointEntry::Metadata(metadata) = &entries[0] else {
        panic!("expected a metadata entry");
    };
    assert_eq!(metadata.id, "t1");
    assert_eq!(metadata.name.as_deref(), Some("t"));
    assert_eq!(metadata.description.as_deref(), Some(""));
    assert_eq!(metadata.format.provider, "parquet");
    assert!(metadata.format.options.is_empty());
    assert!(metadata.partition_columns.is_empty());
    assert!(metadata.configuration.is_empty());
    assert_eq!(metadata.created_time, Some(0));
    Ok(())
}

#[test]
fn multi_kind_checkpoint_emits_in_row_then_kind_order() -> DeltaResult<()> {
    let kinds = [ActionKind::Txn, ActionKind::Metadata, ActionKind::Protocol];
    let row_type = checkpoint_row_type(&kinds, None);
    let file = write_checkpoint_file(&[checkpoint_batch(
        &row_type,
        &[PROTOCOL_ROW, METADATA_ROW, TXN_ROW],
    )]);

    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build(file)?
        .collect::<DeltaResult<_>>()?;

    let kinds_seen: Vec<_> = entries.iter().map(CheckpointEntry::kind).collect();
    assert_eq!(
        kinds_seen,
        vec![ActionKind::Protocol, ActionKind::Metadata, ActionKind::Txn]
    );
    Ok(())
}

const PARTITIONED_SCHEMA_STRING: &str = r#"{"type":"struct","fields":[{"name":"country","type":"string","nullable":true,"metadata":{}},{"name":"value","type":"long","nullable":true,"metadata":{}}]}"#;

fn partitioned_add_fixture() -> bytes::Bytes {
    let metadata = metadata_entry(PARTITIONED_SCHEMA_STRING, &["country"]);
    let add_type = DefaultSchemaManager::new()
        .add_entry_type(
            &metadata,
            &basic_protocol_entry(),
            &StatsColumnFilter::All,
            false,
            false,
            false,
        )
        .unwrap();
    let row_type = checkpoint_row_type(&[ActionKind::Add], Some(add_type.as_ref().clone()));
    let us_row = r#"{"add":{"path":"c=US/1.parquet","partitionValues":{"country":"US"},"partitionvalues_parsed":{"country":"US"},"size":452,"modificationTime":1,"dataChange":true}}"#;
    let de_row = r#"{"add":{"path":"c=DE/2.parquet","partitionValues":{"country":"DE"},"partitionvalues_parsed":{"country":"DE"},"size":452,"modificationTime":2,"dataChange":true}}"#;
    // one row group per partition so file-level pruning is observable
    write_checkpoint_file(&[
        checkpoint_batch(&row_type, &[us_row]),
        checkpoint_batch(&row_type, &[de_row]),
    ])
}

#[test]
fn partition_constraint_prunes_row_groups_and_rows() -> DeltaResult<()> {
    let file = partitioned_add_fixture();
    let metadata = metadata_entry(PARTITIONED_SCHEMA_STRING, &["country"]);

    let mut iter = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata)
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .with_partition_constraint(PartitionConstraint::new([(
            "country",
            PartitionDomain::single("US"),
        )]))
        .build(file)?;

    let entries: Vec<_> = iter.by_ref().collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 1);
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    assert_eq!(add.path, "c=US/1.parquet");
    assert_eq!(
        add.canonical_partition_values.get("country"),
        Some(&Some("US".to_string()))
    );
    // the DE row group never left the file: only one row was materialized
    assert_eq!(iter.completed_positions(), 1);
    Ok(())
}

#[test]
fn constraint_on_checkpoint_without_parsed_partition_values_drops_nothing() -> DeltaResult<()> {
    // older checkpoints carry no partitionvalues_parsed column; the file-level predicate then
    // has nothing to prune on and every matching add must survive via row-level pruning
    let add_type = StructType::new([
        StructField::nullable("path", DataType::STRING),
        StructField::nullable("partitionValues", DataType::string_map()),
        StructField::nullable("size", DataType::LONG),
        StructField::nullable("modificationTime", DataType::LONG),
        StructField::nullable("dataChange", DataType::BOOLEAN),
        StructField::nullable("tags", DataType::string_map()),
        StructField::nullable("stats", DataType::STRING),
    ]);
    let row_type = checkpoint_row_type(&[ActionKind::Add], Some(add_type));
    let us_row = r#"{"add":{"path":"c=US/1.parquet","partitionValues":{"country":"US"},"size":452,"modificationTime":1,"dataChange":true}}"#;
    let de_row = r#"{"add":{"path":"c=DE/2.parquet","partitionValues":{"country":"DE"},"size":452,"modificationTime":2,"dataChange":true}}"#;
    let file = write_checkpoint_file(&[
        checkpoint_batch(&row_type, &[us_row]),
        checkpoint_batch(&row_type, &[de_row]),
    ]);

    let mut iter = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata_entry(PARTITIONED_SCHEMA_STRING, &["country"]))
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .with_partition_constraint(PartitionConstraint::new([(
            "country",
            PartitionDomain::single("US"),
        )]))
        .build(file)?;

    let entries: Vec<_> = iter.by_ref().collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 1);
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    assert_eq!(add.path, "c=US/1.parquet");
    // no row group could be ruled out, so both rows were materialized
    assert_eq!(iter.completed_positions(), 2);
    Ok(())
}

#[test]
fn unconstrained_read_sees_both_partitions() -> DeltaResult<()> {
    let file = partitioned_add_fixture();
    let metadata = metadata_entry(PARTITIONED_SCHEMA_STRING, &["country"]);

    let mut iter = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata)
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .build(file)?;
    let entries: Vec<_> = iter.by_ref().collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 2);
    assert_eq!(iter.completed_positions(), 2);
    Ok(())
}

const PLAIN_SCHEMA_STRING: &str = r#"{"type":"struct","fields":[{"name":"value","type":"long","nullable":true,"metadata":{}}]}"#;

fn add_with_deletion_vector_file() -> bytes::Bytes {
    let metadata = metadata_entry(PLAIN_SCHEMA_STRING, &[]);
    let add_type = DefaultSchemaManager::new()
        .add_entry_type(
            &metadata,
            &deletion_vector_protocol_entry(),
            &StatsColumnFilter::All,
            false,
            true,
            false,
        )
        .unwrap();
    let row_type = checkpoint_row_type(&[ActionKind::Add], Some(add_type.as_ref().clone()));
    let row = r#"{"add":{"path":"1.parquet","partitionValues":{},"size":1,"modificationTime":1,"dataChange":true,"deletionVector":{"storageType":"u","pathOrInlineDv":"ab^-aqEH.-t@S}K{vb[*k^","offset":4,"sizeInBytes":40,"cardinality":6}}}"#;
    write_checkpoint_file(&[checkpoint_batch(&row_type, &[row])])
}

#[test]
fn deletion_vector_is_parsed_only_when_the_feature_is_enabled() -> DeltaResult<()> {
    let file = add_with_deletion_vector_file();
    let metadata = metadata_entry(PLAIN_SCHEMA_STRING, &[]);

    let entries: Vec<_> = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata.clone())
        .with_protocol(deletion_vector_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .build(file.clone())?
        .collect::<DeltaResult<_>>()?;
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    let descriptor = add.deletion_vector.as_ref().expect("a deletion vector");
    assert_eq!(descriptor.storage_type, "u");
    assert_eq!(descriptor.path_or_inline_dv, "ab^-aqEH.-t@S}K{vb[*k^");
    assert_eq!(descriptor.offset, Some(4));
    assert_eq!(descriptor.size_in_bytes, 40);
    assert_eq!(descriptor.cardinality, 6);

    // same file, feature off: the descriptor is not even read
    let entries: Vec<_> = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata)
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    assert!(add.deletion_vector.is_none());
    Ok(())
}

#[test]
fn protocol_with_five_fields_fails_the_scan() {
    let five_field_protocol = StructType::new([
        StructField::nullable("minReaderVersion", DataType::INTEGER),
        StructField::nullable("minWriterVersion", DataType::INTEGER),
        StructField::nullable("readerFeatures", DataType::string_list()),
        StructField::nullable("writerFeatures", DataType::string_list()),
        StructField::nullable("surprise", DataType::STRING),
    ]);
    let row_type = StructType::new([StructField::nullable("protocol", five_field_protocol)]);
    let file = write_checkpoint_file(&[checkpoint_batch(
        &row_type,
        &[r#"{"protocol":{"minReaderVersion":3,"minWriterVersion":7}}"#],
    )]);

    let mut iter = CheckpointReadBuilder::new(location(), [ActionKind::Protocol])
        .build(file)
        .unwrap();
    let error = iter.next().unwrap().unwrap_err();
    assert!(matches!(error, Error::Schema(_)), "got {error}");
    assert!(error.to_string().contains("checkpoint file"));
    // a schema violation ends the stream
    assert!(iter.next().is_none());
}

#[test]
fn protocol_feature_lists_round_trip() -> DeltaResult<()> {
    let kinds = [ActionKind::Protocol];
    let row_type = checkpoint_row_type(&kinds, None);
    let file = write_checkpoint_file(&[checkpoint_batch(
        &row_type,
        &[r#"{"protocol":{"minReaderVersion":3,"minWriterVersion":7,"readerFeatures":["deletionVectors"],"writerFeatures":["deletionVectors"]}}"#],
    )]);
    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    let CheckpointEntry::Protocol(protocol) = &entries[0] else {
        panic!("expected a protocol entry");
    };
    assert_eq!(protocol.min_reader_version, 3);
    assert!(protocol.supports_deletion_vectors());
    Ok(())
}

const TIMESTAMP_SCHEMA_STRING: &str = r#"{"type":"struct","fields":[{"name":"event_time","type":"timestamp","nullable":true,"metadata":{}},{"name":"value","type":"long","nullable":true,"metadata":{}}]}"#;

fn stats_checkpoint_file() -> bytes::Bytes {
    let metadata = metadata_entry(TIMESTAMP_SCHEMA_STRING, &[]);
    let add_type = DefaultSchemaManager::new()
        .add_entry_type(
            &metadata,
            &basic_protocol_entry(),
            &StatsColumnFilter::All,
            true,
            false,
            false,
        )
        .unwrap();
    let row_type = checkpoint_row_type(&[ActionKind::Add], Some(add_type.as_ref().clone()));
    // 1970-01-01T02:30:00Z is 9_000_000_000 microseconds since the epoch
    let row = r#"{"add":{"path":"1.parquet","partitionValues":{},"size":1,"modificationTime":1,"dataChange":true,
        "stats_parsed":{"numRecords":10,
            "minValues":{"event_time":"1970-01-01T02:30:00Z","value":5},
            "maxValues":{"event_time":"1970-01-01T03:30:00Z","value":9},
            "nullCount":{"event_time":0,"value":0}}}}"#;
    write_checkpoint_file(&[checkpoint_batch(&row_type, &[row])])
}

fn read_stats_checkpoint(options: ParquetReaderOptions) -> DeltaResult<Vec<CheckpointEntry>> {
    CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_metadata(metadata_entry(TIMESTAMP_SCHEMA_STRING, &[]))
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .with_options(options)
        .build(stats_checkpoint_file())?
        .collect()
}

#[test]
fn parsed_timestamp_stats_pack_as_utc_millis() -> DeltaResult<()> {
    let entries = read_stats_checkpoint(ParquetReaderOptions::default())?;
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    // stats_parsed is auto-detected from the file schema
    let stats = add.parsed_stats.as_ref().expect("parsed statistics");
    assert_eq!(stats.num_records, 10);
    let min_values = stats.min_values.as_ref().unwrap();
    assert_eq!(min_values["event_time"], Scalar::Timestamp(9_000_000));
    assert_eq!(min_values["value"], Scalar::Long(5));
    assert_eq!(
        stats.max_values.as_ref().unwrap()["event_time"],
        Scalar::Timestamp(12_600_000)
    );
    // the parsed form supersedes the raw JSON string
    assert!(add.stats.is_none());
    Ok(())
}

#[test]
fn pre_modern_era_timestamp_stats_are_omitted() -> DeltaResult<()> {
    // raise the cutoff past the fixture's epoch day; the value becomes untrusted
    let options = ParquetReaderOptions::default().with_modern_era_cutoff_epoch_day(1);
    let entries = read_stats_checkpoint(options)?;
    let CheckpointEntry::Add(add) = &entries[0] else {
        panic!("expected an add entry");
    };
    let stats = add.parsed_stats.as_ref().expect("parsed statistics");
    assert!(!stats.min_values.as_ref().unwrap().contains_key("event_time"));
    assert_eq!(stats.min_values.as_ref().unwrap()["value"], Scalar::Long(5));
    Ok(())
}

#[test]
fn requesting_add_without_metadata_fails_at_construction() {
    let file = partitioned_add_fixture();
    let result = CheckpointReadBuilder::new(location(), [ActionKind::Add])
        .with_protocol(basic_protocol_entry())
        .with_stats_filter(StatsColumnFilter::All)
        .build(file);
    assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
}

#[test]
fn sidecar_and_remove_entries_round_trip() -> DeltaResult<()> {
    let kinds = [ActionKind::Remove, ActionKind::Sidecar];
    let manager = DefaultSchemaManager::new();
    let row_type = StructType::new([
        StructField::nullable("remove", manager.remove_entry_type(false).as_ref().clone()),
        StructField::nullable("sidecar", manager.sidecar_entry_type().as_ref().clone()),
    ]);
    let rows = [
        r#"{"remove":{"path":"old.parquet","partitionValues":{"c":"1"},"deletionTimestamp":123,"dataChange":true}}"#,
        r#"{"sidecar":{"path":"00000000000000000010.checkpoint.0000000001.parquet","sizeInBytes":1024,"modificationTime":456,"tags":{"k":"v"}}}"#,
    ];
    let file = write_checkpoint_file(&[checkpoint_batch(&row_type, &rows)]);

    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 2);
    let CheckpointEntry::Remove(remove) = &entries[0] else {
        panic!("expected a remove entry");
    };
    assert_eq!(remove.path, "old.parquet");
    assert_eq!(remove.deletion_timestamp, 123);
    assert_eq!(remove.partition_values["c"], "1");
    assert!(remove.deletion_vector.is_none());
    let CheckpointEntry::Sidecar(sidecar) = &entries[1] else {
        panic!("expected a sidecar entry");
    };
    assert_eq!(sidecar.size_in_bytes, 1024);
    assert_eq!(sidecar.tags.as_ref().unwrap()["k"], "v");
    Ok(())
}

#[test]
fn reads_a_checkpoint_file_from_disk() -> DeltaResult<()> {
    let kinds = [ActionKind::Metadata, ActionKind::Protocol];
    let row_type = checkpoint_row_type(&kinds, None);
    let bytes = write_checkpoint_file(&[checkpoint_batch(&row_type, &[METADATA_ROW, PROTOCOL_ROW])]);

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("00000000000000000010.checkpoint.parquet");
    std::fs::write(&path, &bytes)?;
    let location = Url::from_file_path(&path).unwrap();

    let entries: Vec<_> = CheckpointReadBuilder::new(location, kinds)
        .build(std::fs::File::open(&path)?)?
        .collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 2);
    Ok(())
}

#[test]
fn parquet_and_in_memory_sources_agree() -> DeltaResult<()> {
    let kinds = [ActionKind::Metadata, ActionKind::Protocol];
    let row_type = checkpoint_row_type(&kinds, None);
    let batch = checkpoint_batch(&row_type, &[METADATA_ROW, PROTOCOL_ROW]);
    let file = write_checkpoint_file(&[batch.clone()]);

    let from_parquet: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    let from_memory: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .build_with_source(Box::new(InMemoryPageSource::new(vec![batch])))?
        .collect::<DeltaResult<_>>()?;

    assert_eq!(from_parquet, from_memory);
    Ok(())
}

#[test]
fn small_batch_size_pages_through_the_file() -> DeltaResult<()> {
    let kinds = [ActionKind::Txn];
    let row_type = checkpoint_row_type(&kinds, None);
    let rows: Vec<String> = (0..10)
        .map(|i| format!(r#"{{"txn":{{"appId":"app-{i}","version":{i},"lastUpdated":{i}}}}}"#))
        .collect();
    let row_refs: Vec<&str> = rows.iter().map(String::as_str).collect();
    let file = write_checkpoint_file(&[checkpoint_batch(&row_type, &row_refs)]);

    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .with_options(ParquetReaderOptions::default().with_batch_size(3))
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 10);
    let CheckpointEntry::Txn(last) = &entries[9] else {
        panic!("expected a txn entry");
    };
    assert_eq!(last.app_id, "app-9");
    assert_eq!(last.version, 9);
    Ok(())
}

// keep the helper arc-typed signature honest: a custom schema manager can be plugged in
#[test]
fn custom_schema_manager_is_used() -> DeltaResult<()> {
    struct Fixed(DefaultSchemaManager);
    impl CheckpointSchemaManager for Fixed {
        fn txn_entry_type(&self) -> delta_checkpoint::schema::SchemaRef {
            self.0.txn_entry_type()
        }
        fn add_entry_type(
            &self,
            metadata: &delta_checkpoint::MetadataEntry,
            protocol: &delta_checkpoint::ProtocolEntry,
            stats_filter: &StatsColumnFilter,
            with_parsed_stats: bool,
            with_deletion_vector: bool,
            with_physical_column_stats: bool,
        ) -> DeltaResult<delta_checkpoint::schema::SchemaRef> {
            self.0.add_entry_type(
                metadata,
                protocol,
                stats_filter,
                with_parsed_stats,
                with_deletion_vector,
                with_physical_column_stats,
            )
        }
        fn remove_entry_type(
            &self,
            with_deletion_vector: bool,
        ) -> delta_checkpoint::schema::SchemaRef {
            self.0.remove_entry_type(with_deletion_vector)
        }
        fn metadata_entry_type(&self) -> delta_checkpoint::schema::SchemaRef {
            self.0.metadata_entry_type()
        }
        fn protocol_entry_type(
            &self,
            with_reader_features: bool,
            with_writer_features: bool,
        ) -> delta_checkpoint::schema::SchemaRef {
            self.0
                .protocol_entry_type(with_reader_features, with_writer_features)
        }
        fn sidecar_entry_type(&self) -> delta_checkpoint::schema::SchemaRef {
            self.0.sidecar_entry_type()
        }
    }

    let kinds = [ActionKind::Txn];
    let row_type = checkpoint_row_type(&kinds, None);
    let file = write_checkpoint_file(&[checkpoint_batch(&row_type, &[TXN_ROW])]);
    let entries: Vec<_> = CheckpointReadBuilder::new(location(), kinds)
        .with_schema_manager(Arc::new(Fixed(DefaultSchemaManager::new())))
        .build(file)?
        .collect::<DeltaResult<_>>()?;
    assert_eq!(entries.len(), 1);
    Ok(())
}

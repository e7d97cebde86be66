//! Plans which columns to project and which row groups can be skipped.
//!
//! For every requested action kind there is one primitive sub-field the Delta protocol
//! guarantees to be populated whenever the action is present. Constraining that sub-field to
//! "not null" gives a per-kind tuple domain; the list of per-kind domains forms a disjunction,
//! so a row group survives pruning when at least one requested kind may be present in it. For
//! `add` the caller's partition-value domains are AND-ed in, projected onto the typed
//! `partitionvalues_parsed` sub-row.

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use parquet::file::metadata::{ColumnChunkMetaData, RowGroupMetaData};
use parquet::file::statistics::Statistics;

use crate::actions::ActionKind;
use crate::partition::{PartitionConstraint, PartitionDomain};

pub(crate) const PARTITION_VALUES_PARSED_NAME: &str = "partitionvalues_parsed";

/// A dotted path to a leaf column inside the checkpoint schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnPath(Vec<String>);

impl ColumnPath {
    pub fn new(parts: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(parts.into_iter().map(Into::into).collect())
    }

    fn matches(&self, parts: &[String]) -> bool {
        self.0 == parts
    }
}

impl Display for ColumnPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

/// The constraint applied to one leaf column
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    /// At least one non-null value
    NotNull,
    /// A discrete set of acceptable string values, optionally together with null
    StringValues {
        values: BTreeSet<String>,
        null_allowed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDomain {
    pub column: ColumnPath,
    pub domain: Domain,
}

impl ColumnDomain {
    /// Whether a row group may contain a row satisfying this domain. Missing statistics keep
    /// the group; only statistics that prove the domain unsatisfiable reject it.
    fn may_match(&self, row_group: &RowGroupMetaData) -> bool {
        let Some(chunk) = row_group
            .columns()
            .iter()
            .find(|chunk| self.matches_chunk(chunk))
        else {
            // the file carries no chunk for this column, so there is nothing to disprove the
            // domain with; older checkpoints lack optional columns like
            // `partitionvalues_parsed`, and row-level pruning still sees every row
            return true;
        };
        match &self.domain {
            Domain::NotNull => may_have_non_null(chunk),
            Domain::StringValues {
                values,
                null_allowed,
            } => {
                if *null_allowed && may_have_null(chunk) {
                    return true;
                }
                if let Some(Statistics::ByteArray(stats)) = chunk.statistics() {
                    if let (Some(min), Some(max)) = (stats.min_opt(), stats.max_opt()) {
                        let (min, max) = (min.data(), max.data());
                        return values
                            .iter()
                            .any(|value| min <= value.as_bytes() && value.as_bytes() <= max);
                    }
                }
                may_have_non_null(chunk)
            }
        }
    }

    fn matches_chunk(&self, chunk: &ColumnChunkMetaData) -> bool {
        self.column.matches(chunk.column_path().parts())
    }
}

fn may_have_non_null(chunk: &ColumnChunkMetaData) -> bool {
    match chunk.statistics().and_then(Statistics::null_count_opt) {
        Some(null_count) => null_count < chunk.num_values() as u64,
        None => true,
    }
}

fn may_have_null(chunk: &ColumnChunkMetaData) -> bool {
    match chunk.statistics().and_then(Statistics::null_count_opt) {
        Some(null_count) => null_count > 0,
        None => true,
    }
}

/// The conjunction of column domains for one action kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleDomain {
    kind: ActionKind,
    conjuncts: Vec<ColumnDomain>,
}

impl TupleDomain {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    pub fn conjuncts(&self) -> &[ColumnDomain] {
        &self.conjuncts
    }

    fn may_match(&self, row_group: &RowGroupMetaData) -> bool {
        self.conjuncts
            .iter()
            .all(|conjunct| conjunct.may_match(row_group))
    }
}

/// The projection and pruning plan for one checkpoint read
#[derive(Debug, Clone)]
pub struct PushdownPlan {
    kinds: Vec<ActionKind>,
    disjunction: Vec<TupleDomain>,
}

impl PushdownPlan {
    pub fn new(
        kinds: &[ActionKind],
        partition_constraint: &PartitionConstraint,
        domain_compaction_threshold: usize,
    ) -> Self {
        let disjunction = kinds
            .iter()
            .map(|&kind| {
                let mut conjuncts = vec![ColumnDomain {
                    column: ColumnPath::new([kind.column_name(), required_sub_field(kind)]),
                    domain: Domain::NotNull,
                }];
                if kind == ActionKind::Add {
                    let partition_domains =
                        partition_constraint.domains().filter_map(|(column, domain)| {
                            Some(ColumnDomain {
                                column: ColumnPath::new([
                                    kind.column_name(),
                                    PARTITION_VALUES_PARSED_NAME,
                                    column.as_str(),
                                ]),
                                domain: compact(domain, domain_compaction_threshold)?,
                            })
                        });
                    conjuncts.extend(partition_domains);
                }
                TupleDomain { kind, conjuncts }
            })
            .collect();
        Self {
            kinds: kinds.to_vec(),
            disjunction,
        }
    }

    pub fn kinds(&self) -> &[ActionKind] {
        &self.kinds
    }

    /// The top-level checkpoint columns to project, in kind order
    pub fn projected_columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.iter().map(|kind| kind.column_name())
    }

    pub fn domains(&self) -> &[TupleDomain] {
        &self.disjunction
    }

    /// Whether the row group can contain any row of interest: the disjunction over the
    /// per-kind tuple domains.
    pub fn row_group_may_match(&self, row_group: &RowGroupMetaData) -> bool {
        self.disjunction
            .iter()
            .any(|domain| domain.may_match(row_group))
    }
}

/// The primitive sub-field the Delta protocol populates whenever the action is present
fn required_sub_field(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Txn => "version",
        ActionKind::Add | ActionKind::Remove | ActionKind::Sidecar => "path",
        ActionKind::Metadata => "id",
        ActionKind::Protocol => "minReaderVersion",
    }
}

/// Project one partition domain into a pushdown domain, collapsing discrete sets wider than the
/// compaction threshold to the weakest constraint that is still sound.
fn compact(domain: &PartitionDomain, threshold: usize) -> Option<Domain> {
    match domain.allowed_values() {
        None => match domain.null_allowed() {
            true => None,
            false => Some(Domain::NotNull),
        },
        Some(values) if values.len() > threshold => match domain.null_allowed() {
            true => None,
            false => Some(Domain::NotNull),
        },
        Some(values) => Some(Domain::StringValues {
            values: values.clone(),
            null_allowed: domain.null_allowed(),
        }),
    }
}

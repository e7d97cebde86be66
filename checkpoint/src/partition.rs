//! Canonical partition values and the partition constraint used to prune `add` entries.
//!
//! Pruning happens at two sites: file-level, where the constraint is projected into the Parquet
//! tuple-domain disjunction (see [`crate::pushdown`]), and row-level, where each decoded `add`
//! row is checked against the constraint before the rest of the row is touched. Both are needed
//! because the Parquet predicate can only reject entire row groups.

use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Make nulls in raw partition values explicit. The Delta protocol serializes a null partition
/// value as either a null map entry or an empty string.
pub fn canonicalize_partition_values(
    raw: &HashMap<String, Option<String>>,
) -> HashMap<String, Option<String>> {
    raw.iter()
        .map(|(column, value)| {
            let canonical = value
                .as_deref()
                .filter(|value| !value.is_empty())
                .map(str::to_string);
            (column.clone(), canonical)
        })
        .collect()
}

/// The set of canonical values one partition column is allowed to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionDomain {
    /// `None` means any non-null value is acceptable
    allowed: Option<BTreeSet<String>>,
    null_allowed: bool,
}

impl PartitionDomain {
    /// Exactly one value
    pub fn single(value: impl Into<String>) -> Self {
        Self::of([value])
    }

    /// Any of the given values
    pub fn of(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: Some(values.into_iter().map(Into::into).collect()),
            null_allowed: false,
        }
    }

    /// Any non-null value
    pub fn not_null() -> Self {
        Self {
            allowed: None,
            null_allowed: false,
        }
    }

    /// Only null
    pub fn only_null() -> Self {
        Self {
            allowed: Some(BTreeSet::new()),
            null_allowed: true,
        }
    }

    pub fn with_null_allowed(mut self) -> Self {
        self.null_allowed = true;
        self
    }

    pub fn allowed_values(&self) -> Option<&BTreeSet<String>> {
        self.allowed.as_ref()
    }

    pub fn null_allowed(&self) -> bool {
        self.null_allowed
    }

    pub fn matches(&self, value: Option<&str>) -> bool {
        match value {
            None => self.null_allowed,
            Some(value) => self
                .allowed
                .as_ref()
                .map_or(true, |allowed| allowed.contains(value)),
        }
    }
}

/// A conjunction of per-partition-column domains. The empty constraint matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PartitionConstraint {
    domains: BTreeMap<String, PartitionDomain>,
}

impl PartitionConstraint {
    /// The constraint that matches every row
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(
        domains: impl IntoIterator<Item = (impl Into<String>, PartitionDomain)>,
    ) -> Self {
        Self {
            domains: domains
                .into_iter()
                .map(|(column, domain)| (column.into(), domain))
                .collect(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domains(&self) -> impl Iterator<Item = (&String, &PartitionDomain)> {
        self.domains.iter()
    }

    /// Whether a row with the given canonical partition values satisfies the constraint. A
    /// partition column with no entry in the map is treated as null.
    pub fn matches(&self, canonical_values: &HashMap<String, Option<String>>) -> bool {
        self.domains.iter().all(|(column, domain)| {
            let value = canonical_values.get(column).and_then(|v| v.as_deref());
            domain.matches(value)
        })
    }
}

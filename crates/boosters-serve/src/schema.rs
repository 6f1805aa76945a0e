//! Feature contract and schema guard.
//!
//! The [`FeatureContract`] records which columns (and of which kind) a
//! pipeline was fit against. The [`SchemaGuard`] checks an incoming table
//! against it before any inference work is spent.

use thiserror::Error;

use crate::table::{ColumnKind, TabularTable};

// =============================================================================
// Feature contract
// =============================================================================

/// How a feature is consumed by the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FeatureKind {
    /// Passed through as a number. Missing values: `NaN`.
    #[default]
    Numeric,
    /// Target-encoded from its category key.
    Categorical,
}

impl FeatureKind {
    #[inline]
    pub fn is_categorical(&self) -> bool {
        matches!(self, FeatureKind::Categorical)
    }

    #[inline]
    pub fn is_numeric(&self) -> bool {
        matches!(self, FeatureKind::Numeric)
    }
}

/// One required input column.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeatureSpec {
    pub name: String,
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric,
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical,
        }
    }
}

/// Ordered input columns a fitted pipeline expects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FeatureContract {
    features: Vec<FeatureSpec>,
}

impl FeatureContract {
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self { features }
    }

    /// Derive a contract from a training table: numeric columns pass through,
    /// text columns are categorical.
    pub fn from_table(table: &TabularTable) -> Self {
        let features = table
            .columns()
            .iter()
            .map(|c| match c.kind() {
                ColumnKind::Numeric => FeatureSpec::numeric(c.name()),
                ColumnKind::Text => FeatureSpec::categorical(c.name()),
            })
            .collect();
        Self { features }
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn numeric(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter().filter(|f| f.kind.is_numeric())
    }

    pub fn categorical(&self) -> impl Iterator<Item = &FeatureSpec> {
        self.features.iter().filter(|f| f.kind.is_categorical())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.features.iter().map(|f| f.name.as_str())
    }
}

// =============================================================================
// Schema guard
// =============================================================================

/// Rejections raised by the [`SchemaGuard`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardError {
    #[error("uploaded file contains no rows")]
    EmptyInput,

    #[error("{}", mismatch_message(.missing, .invalid))]
    SchemaMismatch {
        /// Required columns that are absent.
        missing: Vec<String>,
        /// Numeric columns holding values that are not numbers.
        invalid: Vec<String>,
    },
}

pub(crate) fn mismatch_message(missing: &[String], invalid: &[String]) -> String {
    let mut parts = Vec::new();
    if !missing.is_empty() {
        parts.push(format!("missing required columns: {}", missing.join(", ")));
    }
    if !invalid.is_empty() {
        parts.push(format!("columns must be numeric: {}", invalid.join(", ")));
    }
    parts.join("; ")
}

/// Gate that validates tables against a [`FeatureContract`].
#[derive(Clone, Debug)]
pub struct SchemaGuard {
    contract: FeatureContract,
}

impl SchemaGuard {
    pub fn new(contract: FeatureContract) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &FeatureContract {
        &self.contract
    }

    /// Validate a table, returning it unchanged on success.
    ///
    /// Checks run in order: the table must have rows, every contract column
    /// must be present, and numeric features must hold numbers. A categorical
    /// feature accepts either column kind. Extra columns are ignored.
    pub fn validate(&self, table: TabularTable) -> Result<TabularTable, GuardError> {
        if table.n_rows() == 0 {
            return Err(GuardError::EmptyInput);
        }

        let mut missing = Vec::new();
        let mut invalid = Vec::new();
        for spec in self.contract.features() {
            match table.column(&spec.name) {
                None => missing.push(spec.name.clone()),
                Some(column) => {
                    if spec.kind.is_numeric()
                        && column.kind() == ColumnKind::Text
                        && column.data().first_non_numeric().is_some()
                    {
                        invalid.push(spec.name.clone());
                    }
                }
            }
        }

        if missing.is_empty() && invalid.is_empty() {
            Ok(table)
        } else {
            Err(GuardError::SchemaMismatch { missing, invalid })
        }
    }
}

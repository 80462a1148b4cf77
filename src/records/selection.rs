//! Record selection applied before the enrichment core.
//!
//! Order: explicit rows, then not-yet-imported filtering, then organisation
//! and source filtering, then the limit.

use std::collections::{BTreeSet, HashSet};

use tracing::{debug, info, warn};

use super::source::SourceType;
use super::types::RepositoryRecord;
use crate::error::SelectionError;

/// A set of 1-based row numbers, e.g. parsed from `2,5-8,10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSelection {
    rows: Vec<usize>,
}

impl RowSelection {
    /// Parses individual rows and inclusive ranges separated by commas.
    ///
    /// Duplicates are removed and rows are returned in ascending order.
    pub fn parse(spec: &str) -> Result<Self, SelectionError> {
        let invalid = |reason: String| SelectionError::InvalidRowSpec {
            spec: spec.to_string(),
            reason,
        };

        let mut rows = BTreeSet::new();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            if let Some((start, end)) = part.split_once('-') {
                let start: usize = start
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{part}' is not a valid range")))?;
                let end: usize = end
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{part}' is not a valid range")))?;
                if start > end {
                    return Err(invalid(format!(
                        "range '{part}' starts ({start}) after it ends ({end})"
                    )));
                }
                rows.extend(start..=end);
            } else {
                let row: usize = part
                    .parse()
                    .map_err(|_| invalid(format!("'{part}' is not a row number")))?;
                rows.insert(row);
            }
        }

        if rows.is_empty() {
            return Err(invalid("no rows given".to_string()));
        }

        Ok(Self {
            rows: rows.into_iter().collect(),
        })
    }

    /// Selected row numbers, ascending.
    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Keeps only the selected rows of `records`.
    ///
    /// Fails if any row is outside `1..=records.len()`.
    pub fn apply(
        &self,
        records: Vec<RepositoryRecord>,
    ) -> Result<Vec<RepositoryRecord>, SelectionError> {
        let available = records.len();
        let invalid: Vec<usize> = self
            .rows
            .iter()
            .copied()
            .filter(|&r| r == 0 || r > available)
            .collect();
        if !invalid.is_empty() {
            return Err(SelectionError::RowsOutOfRange {
                rows: invalid,
                available,
            });
        }

        let wanted: HashSet<usize> = self.rows.iter().map(|r| r - 1).collect();
        Ok(records
            .into_iter()
            .enumerate()
            .filter(|(i, _)| wanted.contains(i))
            .map(|(_, r)| r)
            .collect())
    }
}

/// Options controlling which records enter a run.
#[derive(Debug, Clone)]
pub struct SelectionOptions {
    /// Integration type of the run.
    pub source_type: SourceType,
    /// Explicit rows; takes precedence over every other filter.
    pub rows: Option<RowSelection>,
    /// Keep only records not imported into any organisation yet.
    pub empty_org_only: bool,
    /// Maximum number of records after filtering.
    pub limit: Option<usize>,
}

impl SelectionOptions {
    /// Options that keep every record of the given source type.
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            rows: None,
            empty_org_only: false,
            limit: None,
        }
    }

    /// Sets the explicit row selection.
    pub fn with_rows(mut self, rows: RowSelection) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Keeps only records without an organisation.
    pub fn with_empty_org_only(mut self, empty_org_only: bool) -> Self {
        self.empty_org_only = empty_org_only;
        self
    }

    /// Sets the limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Applies the selection rules to the raw input records.
///
/// When `known_applications` is given, records whose application has no
/// organisation are dropped with a warning.
pub fn select_records(
    records: Vec<RepositoryRecord>,
    options: &SelectionOptions,
    known_applications: Option<&HashSet<String>>,
) -> Result<Vec<RepositoryRecord>, SelectionError> {
    if options.limit == Some(0) {
        return Err(SelectionError::InvalidLimit);
    }

    let mut records = records;

    if let Some(rows) = &options.rows {
        let before = records.len();
        records = rows.apply(records)?;
        info!(selected = records.len(), total = before, "Filtered by row numbers");
    }

    if options.empty_org_only {
        let before = records.len();
        records.retain(RepositoryRecord::is_not_imported);
        info!(
            remaining = records.len(),
            total = before,
            "Filtered to repositories not yet imported"
        );
    }

    let before = records.len();
    records.retain(|record| {
        if let Some(known) = known_applications {
            if !known.contains(record.application_name.trim()) {
                warn!(
                    application = %record.application_name,
                    "No organisation found for application"
                );
                return false;
            }
        }
        if !options.source_type.matches(record) {
            debug!(
                url = %record.repository_url,
                source = %options.source_type,
                "Record does not match source type"
            );
            return false;
        }
        if record.url().is_empty() {
            warn!(application = %record.application_name, "Record has no repository URL");
            return false;
        }
        true
    });
    info!(
        remaining = records.len(),
        total = before,
        source = %options.source_type,
        "Filtered by source type"
    );

    if let Some(limit) = options.limit {
        if records.len() > limit {
            info!(limit, available = records.len(), "Applying limit");
            records.truncate(limit);
        }
    }

    for (ordinal, record) in records.iter().enumerate() {
        record.validate(ordinal)?;
    }

    Ok(records)
}

//! Repository records and the rules that pick which of them enter a run.
//!
//! - `types`: the immutable input record and caller-supplied field overrides
//! - `source`: integration types and SCM platform detection
//! - `selection`: row specs, not-yet-imported filtering, source filtering, limits

pub mod selection;
pub mod source;
pub mod types;

pub use selection::{select_records, RowSelection, SelectionOptions};
pub use source::{ScmPlatform, SourceType};
pub use types::{FieldOverrides, RepositoryRecord, DEFAULT_EXCLUSION_GLOBS};

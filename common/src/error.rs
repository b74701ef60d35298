use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while turning results into tables and chart specs.
///
/// Ingestion stops at the first `MissingParameter`. Errors raised while
/// producing a single artifact end up in [`crate::plot::PlotReport::skipped`].
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Result {id} is missing required parameter {field}")]
    MissingParameter { id: String, field: String },
    #[error("Group {group} has no results")]
    EmptyGroup { group: String },
    #[error("Axis lower bound {lower} is below the log-scale floor {floor}")]
    InvalidRange { lower: f64, floor: f64 },
    #[error("Could not write {path:?}")]
    IoWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Rendering {path:?} failed: {reason}")]
    Render { path: PathBuf, reason: String },
}

impl ReportError {
    pub fn missing(id: &str, field: impl Into<String>) -> Self {
        ReportError::MissingParameter {
            id: id.to_owned(),
            field: field.into(),
        }
    }

    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ReportError::IoWriteFailure {
            path: path.into(),
            source,
        }
    }
}

//! Runtime errors

use thiserror::Error;

use voltrace_coordinator::CoordinatorError;
use voltrace_storage::StorageError;

/// Runtime result type
pub type Result<T> = std::result::Result<T, Error>;

/// Runtime errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown report kind: {kind}")]
    UnknownReportKind { kind: String },

    #[error("report not found: {name}")]
    ReportNotFound { name: String },

    #[error("population not found: {population} in report {report}")]
    PopulationNotFound { report: String, population: String },

    #[error("node {node_id} not found in population {population} of report {report}")]
    NodeNotFound {
        report: String,
        population: String,
        node_id: u64,
    },

    #[error("node {node_id} already added to population {population} of report {report}")]
    DuplicateNode {
        report: String,
        population: String,
        node_id: u64,
    },

    #[error("report {report} topology is frozen after dataset preparation")]
    TopologyFrozen { report: String },

    #[error("soma node {node_id} already holds its single element")]
    SomaSingleElement { node_id: u64 },

    #[error("no spike file created")]
    NoSpikeFile,

    #[error("node id {node_id} below one-based offset {population_offset}")]
    GidUnderflow {
        node_id: u64,
        population_offset: u64,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

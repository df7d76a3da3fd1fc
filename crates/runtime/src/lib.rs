//! Voltrace recording runtime.
//!
//! Captures per-element scalar samples from simulation nodes during a
//! time-stepped run, buffers them under a bounded footprint and flushes them
//! through the storage seam as time-series report datasets and spike logs.

pub mod buffer;
pub mod error;
pub mod gid;
pub mod node;
pub mod registry;
pub mod report;
pub mod spike;

pub use error::{Error, Result};
pub use node::{ElementValueFn, Node, RefreshFn};
pub use registry::Registry;
pub use report::{Report, ReportKind};
pub use spike::{SpikeFile, SpikePopulation};

pub use voltrace_coordinator::SpikeOrder;

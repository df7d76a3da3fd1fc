//! Distributed collective primitives.
//!
//! The recording pipeline runs in data-parallel lockstep across a fixed pool
//! of workers. Everything the pipeline needs to agree on — population-name
//! unions, per-worker element offsets, the elected last writer, spike order,
//! collective barriers and container opening — goes through the
//! [`Coordinator`] trait. [`LocalCoordinator`] is the single-worker backend
//! where every collective is an identity or a no-op; a message-passing
//! backend implements the same interface without the pipeline noticing.

#![warn(missing_docs)]

mod error;
mod local;
mod order;

use voltrace_storage::SharedWriter;

pub use error::{CoordinatorError, Result};
pub use local::LocalCoordinator;
pub use order::SpikeOrder;

/// Collective operations shared by every worker of a run.
///
/// Each method is a suspension point: every worker must reach the same call
/// in the same order, including workers whose local population is empty.
pub trait Coordinator: Send + Sync {
    /// Set up per-report communication for the given reports and return
    /// this worker's rank
    fn init(&self, report_names: &[String]) -> Result<usize>;

    /// Deterministic global union of population names, same order on every
    /// worker
    fn sync_populations(&self, report: &str, local: Vec<String>) -> Result<Vec<String>>;

    /// This worker's exclusive prefix sum of `n` across all workers
    fn exclusive_prefix_sum(&self, report: &str, n: u64) -> Result<u64>;

    /// Minimum of `x` across all workers
    fn min_across_workers(&self, report: &str, x: u32) -> Result<u32>;

    /// Maximum of `x` across all workers
    fn max_across_workers(&self, report: &str, x: usize) -> Result<usize>;

    /// Global total of `n` across all workers
    fn global_dim(&self, report: &str, n: u64) -> Result<u64>;

    /// Globally consistent stable reorder of the spike pair lists
    fn sort_spikes(
        &self,
        timestamps: &mut Vec<f64>,
        node_ids: &mut Vec<u64>,
        order: SpikeOrder,
    ) -> Result<()>;

    /// Collective barrier between group/dataset creations
    fn barrier(&self, report: &str) -> Result<()>;

    /// Open the per-report container in parallel mode
    fn open_writer(&self, report: &str) -> Result<SharedWriter>;
}

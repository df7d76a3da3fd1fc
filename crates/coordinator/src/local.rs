//! Single-worker coordinator backend

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::debug;

use voltrace_storage::{SharedWriter, Writer};
use voltrace_storage_memory::MemoryWriter;

use crate::error::Result;
use crate::order::SpikeOrder;
use crate::Coordinator;

/// Coordinator for runs with a single worker.
///
/// Every collective is an identity or a no-op, so the single-worker path
/// behaves exactly like one rank of a distributed run. Containers are opened
/// in memory and kept addressable by report name so an embedding simulator
/// (or a test) can inspect what a run wrote.
#[derive(Default)]
pub struct LocalCoordinator {
    containers: Mutex<IndexMap<String, Arc<Mutex<MemoryWriter>>>>,
}

impl LocalCoordinator {
    /// Create a coordinator with no open containers
    pub fn new() -> Self {
        Self::default()
    }

    /// Container opened for `report`, if any
    pub fn container(&self, report: &str) -> Option<Arc<Mutex<MemoryWriter>>> {
        let containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.get(report).cloned()
    }
}

impl Coordinator for LocalCoordinator {
    fn init(&self, report_names: &[String]) -> Result<usize> {
        debug!(reports = report_names.len(), "local coordinator initialized");
        Ok(0)
    }

    fn sync_populations(&self, _report: &str, local: Vec<String>) -> Result<Vec<String>> {
        // The distributed union is lexicographically ordered; sorting the
        // local names keeps the single-worker order identical.
        let mut names = local;
        names.sort();
        Ok(names)
    }

    fn exclusive_prefix_sum(&self, _report: &str, _n: u64) -> Result<u64> {
        Ok(0)
    }

    fn min_across_workers(&self, _report: &str, x: u32) -> Result<u32> {
        Ok(x)
    }

    fn max_across_workers(&self, _report: &str, x: usize) -> Result<usize> {
        Ok(x)
    }

    fn global_dim(&self, _report: &str, n: u64) -> Result<u64> {
        Ok(n)
    }

    fn sort_spikes(
        &self,
        timestamps: &mut Vec<f64>,
        node_ids: &mut Vec<u64>,
        order: SpikeOrder,
    ) -> Result<()> {
        match order {
            SpikeOrder::None => {}
            SpikeOrder::ById => {
                let mut pairs: Vec<(f64, u64)> =
                    timestamps.iter().copied().zip(node_ids.iter().copied()).collect();
                pairs.sort_by_key(|&(_, id)| id);
                unzip_into(pairs, timestamps, node_ids);
            }
            SpikeOrder::ByTime => {
                let mut pairs: Vec<(f64, u64)> =
                    timestamps.iter().copied().zip(node_ids.iter().copied()).collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
                unzip_into(pairs, timestamps, node_ids);
            }
        }
        Ok(())
    }

    fn barrier(&self, _report: &str) -> Result<()> {
        Ok(())
    }

    fn open_writer(&self, report: &str) -> Result<SharedWriter> {
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        let container: Arc<Mutex<dyn Writer>> = containers
            .entry(report.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MemoryWriter::new(report))))
            .clone();
        debug!(report, "opened in-memory container");
        Ok(SharedWriter::from_arc(container))
    }
}

fn unzip_into(pairs: Vec<(f64, u64)>, timestamps: &mut Vec<f64>, node_ids: &mut Vec<u64>) {
    timestamps.clear();
    node_ids.clear();
    for (t, id) in pairs {
        timestamps.push(t);
        node_ids.push(id);
    }
}

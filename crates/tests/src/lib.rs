//! Integration test harness for voltrace.
//!
//! This crate provides utilities for end-to-end testing of the full
//! recording pipeline: topology setup → dataset preparation → step loop →
//! flush → container inspection.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use voltrace_coordinator::{Coordinator, CoordinatorError, LocalCoordinator, SpikeOrder};
use voltrace_runtime::{ElementValueFn, Registry};
use voltrace_storage::{SharedWriter, Writer};
use voltrace_storage_memory::MemoryWriter;

/// Route recorder logs to the test output; a no-op after the first call.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voltrace=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init()
        .ok();
}

/// A scalar the test mutates between steps while the recorder samples it.
#[derive(Clone, Default)]
pub struct SharedValue(Arc<Mutex<f64>>);

impl SharedValue {
    /// Create a value holding `v`
    pub fn new(v: f64) -> Self {
        Self(Arc::new(Mutex::new(v)))
    }

    /// Overwrite the value
    pub fn set(&self, v: f64) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = v;
    }

    /// Current value
    pub fn get(&self) -> f64 {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Value source handed to the recorder
    pub fn value_fn(&self) -> ElementValueFn {
        let inner = Arc::clone(&self.0);
        Arc::new(move || *inner.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Test harness running a registry against the single-worker coordinator.
pub struct TestHarness {
    coordinator: Arc<LocalCoordinator>,
    /// The registry under test
    pub registry: Registry,
}

impl TestHarness {
    /// Create a fresh registry over a fresh coordinator
    pub fn new() -> Self {
        init_tracing();
        let coordinator = Arc::new(LocalCoordinator::new());
        let registry = Registry::new(coordinator.clone());
        Self {
            coordinator,
            registry,
        }
    }

    /// Container a run wrote for `name`.
    ///
    /// # Panics
    ///
    /// Panics if no container was opened under that name.
    pub fn container(&self, name: &str) -> Arc<Mutex<MemoryWriter>> {
        self.coordinator
            .container(name)
            .unwrap_or_else(|| panic!("no container opened for {name}"))
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// One rank of a scripted multi-worker run.
///
/// Collective results that would come from the other workers are played
/// back from queues loaded by the test; empty queues fall back to the
/// single-worker identities. Containers open in memory exactly like
/// [`LocalCoordinator`].
#[derive(Default)]
pub struct ScriptedCoordinator {
    rank: usize,
    population_union: Vec<String>,
    prefix_sums: Mutex<VecDeque<u64>>,
    min_replies: Mutex<VecDeque<u32>>,
    max_replies: Mutex<VecDeque<usize>>,
    global_dims: Mutex<VecDeque<u64>>,
    containers: Mutex<IndexMap<String, Arc<Mutex<MemoryWriter>>>>,
}

impl ScriptedCoordinator {
    /// A coordinator for `rank` that reports `population_union` as the
    /// agreed population list
    pub fn new(rank: usize, population_union: Vec<String>) -> Self {
        Self {
            rank,
            population_union,
            ..Self::default()
        }
    }

    /// Queue the offsets `exclusive_prefix_sum` hands back, in call order
    pub fn script_prefix_sums(&self, replies: impl IntoIterator<Item = u64>) {
        self.prefix_sums
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
    }

    /// Queue the `min_across_workers` replies, in call order
    pub fn script_mins(&self, replies: impl IntoIterator<Item = u32>) {
        self.min_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
    }

    /// Queue the `max_across_workers` replies, in call order
    pub fn script_maxes(&self, replies: impl IntoIterator<Item = usize>) {
        self.max_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
    }

    /// Queue the `global_dim` replies, in call order
    pub fn script_global_dims(&self, replies: impl IntoIterator<Item = u64>) {
        self.global_dims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(replies);
    }

    /// Container this rank wrote for `name`
    pub fn container(&self, name: &str) -> Option<Arc<Mutex<MemoryWriter>>> {
        let containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        containers.get(name).cloned()
    }
}

impl Coordinator for ScriptedCoordinator {
    fn init(&self, _report_names: &[String]) -> Result<usize, CoordinatorError> {
        Ok(self.rank)
    }

    fn sync_populations(
        &self,
        _report: &str,
        _local: Vec<String>,
    ) -> Result<Vec<String>, CoordinatorError> {
        Ok(self.population_union.clone())
    }

    fn exclusive_prefix_sum(&self, _report: &str, _n: u64) -> Result<u64, CoordinatorError> {
        let mut replies = self.prefix_sums.lock().unwrap_or_else(|e| e.into_inner());
        Ok(replies.pop_front().unwrap_or(0))
    }

    fn min_across_workers(&self, _report: &str, x: u32) -> Result<u32, CoordinatorError> {
        let mut replies = self.min_replies.lock().unwrap_or_else(|e| e.into_inner());
        Ok(replies.pop_front().unwrap_or(x))
    }

    fn max_across_workers(&self, _report: &str, x: usize) -> Result<usize, CoordinatorError> {
        let mut replies = self.max_replies.lock().unwrap_or_else(|e| e.into_inner());
        Ok(replies.pop_front().unwrap_or(x))
    }

    fn global_dim(&self, _report: &str, n: u64) -> Result<u64, CoordinatorError> {
        let mut replies = self.global_dims.lock().unwrap_or_else(|e| e.into_inner());
        Ok(replies.pop_front().unwrap_or(n))
    }

    fn sort_spikes(
        &self,
        timestamps: &mut Vec<f64>,
        node_ids: &mut Vec<u64>,
        order: SpikeOrder,
    ) -> Result<(), CoordinatorError> {
        LocalCoordinator::new().sort_spikes(timestamps, node_ids, order)
    }

    fn barrier(&self, _report: &str) -> Result<(), CoordinatorError> {
        Ok(())
    }

    fn open_writer(&self, report: &str) -> Result<SharedWriter, CoordinatorError> {
        let mut containers = self.containers.lock().unwrap_or_else(|e| e.into_inner());
        let container: Arc<Mutex<dyn Writer>> = containers
            .entry(report.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(MemoryWriter::new(report))))
            .clone();
        Ok(SharedWriter::from_arc(container))
    }
}

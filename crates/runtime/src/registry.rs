//! Process-wide report registry
//!
//! Owns every report and the optional spike file, plus the run-level
//! parameters: the atomic step every tick counter is expressed in, the
//! minimum recording window and the buffer-size hint. The simulator's step
//! loop drives it between steps; nothing here is touched concurrently with
//! recording.

use std::sync::{Arc, Mutex, OnceLock};

use indexmap::IndexMap;
use tracing::{debug, info, trace};

use voltrace_coordinator::{Coordinator, LocalCoordinator, SpikeOrder};

use crate::error::{Error, Result};
use crate::node::{ElementValueFn, RefreshFn};
use crate::report::{Report, ReportKind};
use crate::spike::{SpikeFile, SpikePopulation};

/// Default atomic step, in ms
pub const DEFAULT_ATOMIC_STEP: f64 = 1e-8;

/// Process-wide map of reports and run-level parameters
pub struct Registry {
    coordinator: Arc<dyn Coordinator>,
    reports: IndexMap<String, Report>,
    spike_file: Option<SpikeFile>,
    atomic_step: f64,
    min_steps_to_record: u32,
    max_buffer_size: Option<u64>,
    rank: usize,
}

impl Registry {
    /// Create a registry driving collectives through `coordinator`
    pub fn new(coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            coordinator,
            reports: IndexMap::new(),
            spike_file: None,
            atomic_step: DEFAULT_ATOMIC_STEP,
            min_steps_to_record: 0,
            max_buffer_size: None,
            rank: 0,
        }
    }

    /// This worker's rank, valid after [`setup_coordinators`]
    ///
    /// [`setup_coordinators`]: Registry::setup_coordinators
    pub fn rank(&self) -> usize {
        self.rank
    }

    /// True if no report is registered
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// True if `name` is registered
    pub fn report_exists(&self, name: &str) -> bool {
        self.reports.contains_key(name)
    }

    /// Look up a report
    pub fn get_report(&self, name: &str) -> Option<&Report> {
        self.reports.get(name)
    }

    /// Create a report; a name collision keeps the existing report
    pub fn create_report(
        &mut self,
        name: &str,
        kind: ReportKind,
        tstart: f64,
        tend: f64,
        dt: f64,
        units: &str,
    ) -> &mut Report {
        trace!(report = name, %kind, tstart, tend, "creating report");
        let entry = self
            .reports
            .entry(name.to_string())
            .or_insert_with(|| Report::new(name, kind, tstart, tend, dt, units));
        if let Some(bytes) = self.max_buffer_size {
            entry.set_max_buffer_size(bytes);
        }
        entry
    }

    /// Add a node to a report's population
    pub fn add_node(
        &mut self,
        report: &str,
        population: &str,
        population_offset: u64,
        node_id: u64,
    ) -> Result<()> {
        self.report_mut(report)?
            .add_node(population, population_offset, node_id)
    }

    /// Register one element of a node
    pub fn add_element(
        &mut self,
        report: &str,
        population: &str,
        node_id: u64,
        element_id: u32,
        value: ElementValueFn,
    ) -> Result<()> {
        self.report_mut(report)?
            .add_element(population, node_id, element_id, value)
    }

    /// Cap every report's sample buffer budget, in bytes
    pub fn set_max_buffer_size(&mut self, bytes: u64) {
        self.max_buffer_size = Some(bytes);
        for report in self.reports.values_mut() {
            report.set_max_buffer_size(bytes);
        }
    }

    /// Set the atomic step all tick counters are expressed in
    pub fn set_atomic_step(&mut self, dt: f64) {
        self.atomic_step = dt;
    }

    /// Set the minimum number of steps a buffer must hold
    pub fn set_min_steps_to_record(&mut self, steps: u32) {
        self.min_steps_to_record = steps;
    }

    /// Drop reports with no nodes anywhere, initialize the per-report
    /// collectives and learn this worker's rank
    pub fn setup_coordinators(&mut self) -> Result<usize> {
        self.reports.retain(|name, report| {
            let keep = !report.is_empty();
            if !keep {
                trace!(report = %name, "dropping report without nodes");
            }
            keep
        });
        let names: Vec<String> = self.reports.keys().cloned().collect();
        self.rank = self.coordinator.init(&names)?;
        if self.rank == 0 && !self.reports.is_empty() {
            info!("initializing coordinators and preparing datasets");
        }
        Ok(self.rank)
    }

    /// Prepare every report's datasets; freezes the node topology
    pub fn prepare_datasets(&mut self) -> Result<()> {
        for report in self.reports.values_mut() {
            debug!(report = %report.name(), rank = self.rank, "preparing datasets");
            report.prepare_dataset(
                self.coordinator.as_ref(),
                self.rank,
                self.atomic_step,
                self.min_steps_to_record,
            )?;
        }
        Ok(())
    }

    /// Record the selected nodes of one report at `step` (atomic ticks).
    /// Unknown report names are ignored so workers whose empty report was
    /// culled keep calling in lockstep.
    pub fn record_node_data(&mut self, step: f64, node_ids: &[u64], report: &str) {
        match self.reports.get_mut(report) {
            Some(report) => report.record_nodes(step, node_ids),
            None => trace!(report, step, "record for unknown report ignored"),
        }
    }

    /// Record every node of every report due at `step`
    pub fn record_data(&mut self, step: f64) -> Result<()> {
        for report in self.reports.values_mut() {
            report.record_all(step)?;
        }
        Ok(())
    }

    /// Advance cursors and flush full buffers on every report
    pub fn check_and_flush(&mut self, time: f64) -> Result<()> {
        for report in self.reports.values_mut() {
            report.check_and_flush(time)?;
        }
        Ok(())
    }

    /// Write any remaining buffered steps on every report; past each
    /// report's window this also closes its container
    pub fn flush(&mut self, time: f64) -> Result<()> {
        for report in self.reports.values_mut() {
            report.flush(time)?;
        }
        Ok(())
    }

    /// Remap element value sources across every report
    pub fn refresh_pointers(&mut self, f: &RefreshFn) {
        for report in self.reports.values_mut() {
            report.refresh_pointers(f);
        }
    }

    /// Open the spike container `dir/filename`
    pub fn create_spikefile(&mut self, dir: &str, filename: &str) -> Result<()> {
        let name = format!("{dir}/{filename}");
        let writer = self.coordinator.open_writer(&name)?;
        self.spike_file = Some(SpikeFile::new(name, writer));
        Ok(())
    }

    /// Queue a spike population on the open spike file
    pub fn add_spikes_population(
        &mut self,
        population_name: &str,
        population_offset: u64,
        timestamps: Vec<f64>,
        node_ids: Vec<u64>,
        order_by: SpikeOrder,
    ) -> Result<()> {
        let spike_file = self.spike_file.as_mut().ok_or(Error::NoSpikeFile)?;
        spike_file.add_population(SpikePopulation::new(
            population_name,
            population_offset,
            order_by,
            timestamps,
            node_ids,
        ));
        Ok(())
    }

    /// Write every queued spike population
    pub fn write_spike_populations(&mut self) -> Result<()> {
        let spike_file = self.spike_file.as_mut().ok_or(Error::NoSpikeFile)?;
        spike_file.write(self.coordinator.as_ref())
    }

    /// Close the spike container
    pub fn close_spikefile(&mut self) -> Result<()> {
        let spike_file = self.spike_file.as_mut().ok_or(Error::NoSpikeFile)?;
        spike_file.close()
    }

    /// Release every report and the spike file
    pub fn clear(&mut self) {
        for name in self.reports.keys() {
            trace!(report = %name, rank = self.rank, "deleting report");
        }
        self.reports.clear();
        self.spike_file = None;
    }

    fn report_mut(&mut self, name: &str) -> Result<&mut Report> {
        self.reports.get_mut(name).ok_or_else(|| Error::ReportNotFound {
            name: name.to_string(),
        })
    }
}

/// Process-wide registry backed by the single-worker coordinator.
///
/// Embedders that run distributed construct their own [`Registry`] with a
/// distributed coordinator instead. Tests reset the singleton between
/// scenarios via [`Registry::clear`].
pub fn global() -> &'static Mutex<Registry> {
    static GLOBAL: OnceLock<Mutex<Registry>> = OnceLock::new();
    GLOBAL.get_or_init(|| Mutex::new(Registry::new(Arc::new(LocalCoordinator::new()))))
}

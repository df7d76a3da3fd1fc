//! Per-population sample buffer
//!
//! One `PopulationBuffer` owns the packed sample storage for a single
//! (report, population) pair: it decides which atomic-tick steps are due,
//! where each node's elements land in the step-major buffer, and when the
//! buffered steps get flushed to the container. Buffer capacity is
//! negotiated across workers so every rank flushes on the same step.

use std::collections::HashSet;

use indexmap::IndexMap;
use tracing::{debug, instrument, trace, warn};

use voltrace_coordinator::Coordinator;
use voltrace_storage::{DatasetValues, SharedWriter, Writer};

use crate::error::Result;
use crate::gid;
use crate::node::{Node, RefreshFn};

const SAMPLE_BYTES: u64 = std::mem::size_of::<f32>() as u64;

/// Construction parameters for one (report, population) pair
#[derive(Debug, Clone)]
pub(crate) struct PopulationConfig {
    pub report_name: String,
    pub population_name: String,
    pub population_offset: u64,
    pub max_buffer_size: u64,
    pub num_steps: u32,
    pub dt: f64,
    pub tstart: f64,
    pub tend: f64,
    pub units: String,
    pub atomic_step: f64,
    pub min_steps_to_record: u32,
}

/// Packed sample buffer and flush state for one population of a report
pub struct PopulationBuffer {
    report_name: String,
    population_name: String,
    population_offset: u64,
    units: String,

    nodes: IndexMap<u64, Node>,
    total_elements: u64,

    num_steps: u32,
    steps_to_write: u32,
    remaining_steps: u32,
    current_step: u32,
    last_position: u64,
    steps_recorded: u32,
    nodes_recorded: HashSet<u64>,
    report_buffer: Vec<f32>,

    // Atomic-tick cursors; one sample every `reporting_period` ticks.
    reporting_period: u32,
    last_step_recorded: f64,
    last_step: f64,
    time: [f64; 3],

    node_ids: Vec<u64>,
    element_ids: Vec<u32>,
    index_pointers: Vec<u64>,

    writer: SharedWriter,
    data_path: String,
}

impl PopulationBuffer {
    /// Size the buffer and seed the tick cursors.
    ///
    /// The step capacity is the configured byte budget divided by the local
    /// step width, then agreed across workers via a min-reduction so every
    /// rank flushes together. Workers with no local elements report an
    /// unbounded local capacity.
    pub(crate) fn new(
        cfg: PopulationConfig,
        nodes: IndexMap<u64, Node>,
        writer: SharedWriter,
        coordinator: &dyn Coordinator,
    ) -> Result<Self> {
        let total_elements: u64 = nodes.values().map(|n| n.num_elements() as u64).sum();

        let max_steps_local = if total_elements == 0 {
            u32::MAX
        } else {
            (cfg.max_buffer_size / (SAMPLE_BYTES * total_elements))
                .min(u64::from(u32::MAX)) as u32
        };
        let max_steps_global =
            coordinator.min_across_workers(&cfg.report_name, max_steps_local)?;

        let steps_to_write = if max_steps_global < cfg.num_steps {
            if max_steps_global < cfg.min_steps_to_record {
                warn!(
                    report = %cfg.report_name,
                    population = %cfg.population_name,
                    buffer_steps = max_steps_global,
                    min_steps = cfg.min_steps_to_record,
                    "buffer below minimum recording window, keeping the minimum"
                );
            }
            max_steps_global.max(cfg.min_steps_to_record).max(1)
        } else {
            cfg.num_steps
        };

        // Snap tstart onto the dt grid so a save-restore resumes on the
        // same tick sequence it would have produced in one run.
        let tstart_snapped = (cfg.tstart / cfg.dt).round() * cfg.dt;

        let buffer = PopulationBuffer {
            data_path: format!("/report/{}/data", cfg.population_name),
            report_name: cfg.report_name,
            population_name: cfg.population_name,
            population_offset: cfg.population_offset,
            units: cfg.units,
            nodes,
            total_elements,
            num_steps: cfg.num_steps,
            steps_to_write,
            remaining_steps: cfg.num_steps,
            current_step: 0,
            last_position: 0,
            steps_recorded: 0,
            nodes_recorded: HashSet::new(),
            report_buffer: vec![0.0; (total_elements * u64::from(steps_to_write)) as usize],
            reporting_period: ((cfg.dt / cfg.atomic_step) as u32).max(1),
            last_step_recorded: tstart_snapped / cfg.atomic_step,
            last_step: cfg.tend / cfg.atomic_step,
            time: [tstart_snapped, cfg.tend, cfg.dt],
            node_ids: Vec::new(),
            element_ids: Vec::new(),
            index_pointers: Vec::new(),
            writer,
        };

        debug!(
            report = %buffer.report_name,
            population = %buffer.population_name,
            total_elements = buffer.total_elements,
            num_steps = buffer.num_steps,
            steps_to_write = buffer.steps_to_write,
            "population buffer sized"
        );
        Ok(buffer)
    }

    /// True iff `step` (an atomic-tick counter) is a sample step inside the
    /// recording window
    pub fn is_due(&self, step: f64) -> bool {
        if step < self.last_step_recorded || step > self.last_step {
            return false;
        }
        ((step - self.last_step_recorded) as i64) % i64::from(self.reporting_period) == 0
    }

    /// Record the selected nodes for `step`.
    ///
    /// The column cursor advances over every node in canonical order whether
    /// selected or not, so non-selected nodes leave whatever the buffer held
    /// at that column. Cursors advance later, in [`check_and_flush`].
    ///
    /// [`check_and_flush`]: PopulationBuffer::check_and_flush
    pub fn record_nodes(&mut self, step: f64, allowed: &[u64]) {
        let offset = ((step - self.last_step_recorded) / f64::from(self.reporting_period)) as u64;
        let mut position = (self.last_position + self.total_elements * offset) as usize;
        trace!(
            population = %self.population_name,
            step,
            last_step_recorded = self.last_step_recorded,
            position,
            "recording selected nodes"
        );
        for (node_id, node) in &self.nodes {
            let width = node.num_elements();
            if allowed.contains(node_id) {
                node.fill_data(&mut self.report_buffer[position..position + width]);
                self.nodes_recorded.insert(*node_id);
            }
            position += width;
        }
        if self.nodes_recorded.len() == self.nodes.len() {
            self.steps_recorded += 1;
        }
    }

    /// Record every node for `step` and advance cursors immediately,
    /// flushing when the buffer fills
    pub fn record_all(&mut self, step: f64) -> Result<()> {
        let mut position = self.last_position as usize;
        trace!(
            population = %self.population_name,
            step,
            last_step_recorded = self.last_step_recorded,
            position,
            "recording all nodes"
        );
        for node in self.nodes.values() {
            let width = node.num_elements();
            node.fill_data(&mut self.report_buffer[position..position + width]);
            position += width;
        }
        self.current_step += 1;
        self.last_position += self.total_elements;
        self.last_step_recorded += f64::from(self.reporting_period);

        if self.current_step == self.steps_to_write {
            self.flush()?;
        }
        Ok(())
    }

    /// Advance cursors by the steps recorded since the last call and flush
    /// when the buffer is full, the run is ending, or several steps landed
    /// in one tick window
    pub fn check_and_flush(&mut self, time: f64) -> Result<()> {
        if self.remaining_steps == 0 {
            return Ok(());
        }
        trace!(population = %self.population_name, time, "updating timestep");

        self.current_step += self.steps_recorded;
        self.last_position += self.total_elements * u64::from(self.steps_recorded);
        self.last_step_recorded += f64::from(self.reporting_period * self.steps_recorded);
        self.nodes_recorded.clear();

        if self.current_step == self.steps_to_write
            || self.current_step == self.remaining_steps
            || self.steps_recorded > 1
        {
            self.flush()?;
        }
        self.steps_recorded = 0;
        Ok(())
    }

    /// Append the buffered steps to the data dataset.
    ///
    /// No-op once every step has been written. Every worker reaches this
    /// collectively, so an empty buffer still appends zero rows.
    pub fn flush(&mut self) -> Result<()> {
        if self.remaining_steps == 0 {
            return Ok(());
        }
        if self.current_step >= self.remaining_steps {
            self.current_step = self.remaining_steps;
        }
        debug!(
            report = %self.report_name,
            population = %self.population_name,
            steps_written = self.current_step,
            remaining = self.remaining_steps - self.current_step,
            "flushing report buffer"
        );
        let len = (u64::from(self.current_step) * self.total_elements) as usize;
        self.writer.write_2d(
            &self.data_path,
            &self.report_buffer[..len],
            self.current_step,
            self.total_elements,
        )?;
        self.remaining_steps -= self.current_step;
        self.last_position = 0;
        self.current_step = 0;
        Ok(())
    }

    /// Freeze the element layout and write the report header.
    ///
    /// Concatenates the mapping vectors in canonical node order, agrees on
    /// this worker's element offset and the elected last writer, then runs
    /// the collective header writes. Workers with no local nodes still
    /// participate in every collective call.
    #[instrument(skip(self, coordinator), fields(report = %self.report_name, population = %self.population_name))]
    pub(crate) fn prepare_dataset(
        &mut self,
        coordinator: &dyn Coordinator,
        rank: usize,
    ) -> Result<()> {
        for (node_id, node) in &self.nodes {
            self.element_ids.extend_from_slice(node.element_ids());
            self.node_ids.push(*node_id);
        }

        let element_offset =
            coordinator.exclusive_prefix_sum(&self.report_name, self.total_elements)?;
        let last_writer = if self.total_elements == 0 { 0 } else { rank };
        let last_rank = coordinator.max_across_workers(&self.report_name, last_writer)?;

        let len = if rank == last_rank {
            self.nodes.len() + 1
        } else {
            self.nodes.len()
        };
        let mut pointers = vec![0u64; len];
        if let Some(first) = pointers.first_mut() {
            *first = element_offset;
        }
        for i in 1..len {
            let previous = &self.nodes[&self.node_ids[i - 1]];
            pointers[i] = pointers[i - 1] + previous.num_elements() as u64;
        }
        self.index_pointers = pointers;

        trace!(
            element_offset,
            last_rank,
            pointers = self.index_pointers.len(),
            "element layout frozen"
        );
        self.write_header(coordinator)
    }

    fn write_header(&mut self, coordinator: &dyn Coordinator) -> Result<()> {
        let group = format!("/report/{}", self.population_name);
        let mapping = format!("{group}/mapping");
        let time_path = format!("{mapping}/time");
        let report = self.report_name.clone();

        self.writer.configure_group("/report")?;
        coordinator.barrier(&report)?;
        self.writer.configure_group(&group)?;
        coordinator.barrier(&report)?;
        self.writer.configure_group(&mapping)?;
        coordinator.barrier(&report)?;
        self.writer.configure_dataset(
            &self.data_path,
            &self.population_name,
            self.num_steps,
            self.total_elements,
        )?;
        coordinator.barrier(&report)?;
        self.writer
            .configure_attribute(&self.data_path, "units", &self.units)?;

        let mut written_node_ids = self.node_ids.clone();
        gid::convert_gids(&mut written_node_ids, self.population_offset)?;
        self.writer.write(
            &format!("{mapping}/node_ids"),
            &self.population_name,
            DatasetValues::U64(written_node_ids),
        )?;
        coordinator.barrier(&report)?;
        self.writer.write(
            &format!("{mapping}/index_pointers"),
            &self.population_name,
            DatasetValues::U64(self.index_pointers.clone()),
        )?;
        coordinator.barrier(&report)?;
        self.writer.write(
            &format!("{mapping}/element_ids"),
            &self.population_name,
            DatasetValues::U32(self.element_ids.clone()),
        )?;
        coordinator.barrier(&report)?;
        self.writer.write_time(&time_path, self.time)?;
        coordinator.barrier(&report)?;
        self.writer.configure_attribute(&time_path, "units", "ms")?;
        coordinator.barrier(&report)?;
        Ok(())
    }

    /// Remap every node's value sources
    pub fn refresh_pointers(&mut self, f: &RefreshFn) {
        for node in self.nodes.values_mut() {
            node.refresh_pointers(f);
        }
    }

    /// Close this population's view of the container
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()?;
        Ok(())
    }

    /// Population name
    pub fn population_name(&self) -> &str {
        &self.population_name
    }

    /// Local element count
    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    /// Steps the buffer holds between flushes
    pub fn steps_to_write(&self) -> u32 {
        self.steps_to_write
    }

    /// Steps not yet written to the container
    pub fn remaining_steps(&self) -> u32 {
        self.remaining_steps
    }

    /// Steps currently buffered
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Node ids in canonical order (after `prepare_dataset`)
    pub fn node_ids(&self) -> &[u64] {
        &self.node_ids
    }

    /// Concatenated element ids in canonical order (after `prepare_dataset`)
    pub fn element_ids(&self) -> &[u32] {
        &self.element_ids
    }

    /// Element offsets per node, plus the global total on the last rank
    pub fn index_pointers(&self) -> &[u64] {
        &self.index_pointers
    }

    /// Persisted time triple `(tstart_snapped, tend, dt)`
    pub fn time(&self) -> [f64; 3] {
        self.time
    }
}

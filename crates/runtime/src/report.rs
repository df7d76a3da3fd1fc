//! Report fan-out
//!
//! A report groups populations under one container: it owns the node
//! topology until dataset preparation, then fans record/flush calls out to
//! the per-population buffers. Workers that hold no nodes for a population
//! still instantiate its buffer so they participate in the collective
//! group/dataset creation.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use tracing::{debug, instrument, trace};

use voltrace_coordinator::Coordinator;
use voltrace_storage::{SharedWriter, Writer};

use crate::buffer::{PopulationBuffer, PopulationConfig};
use crate::error::{Error, Result};
use crate::node::{ElementValueFn, Node, RefreshFn};

/// Default in-memory budget per population buffer (4 MiB)
pub const DEFAULT_MAX_BUFFER_SIZE: u64 = 4 * 1024 * 1024;

/// What a report's nodes sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    /// One element per compartment
    Compartment,
    /// One element per synapse
    Synapse,
    /// Values summed into elements
    Summation,
    /// Single element per node
    Soma,
}

impl ReportKind {
    fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Compartment => "compartment",
            ReportKind::Synapse => "synapse",
            ReportKind::Summation => "summation",
            ReportKind::Soma => "soma",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "compartment" => Ok(ReportKind::Compartment),
            "synapse" => Ok(ReportKind::Synapse),
            "summation" => Ok(ReportKind::Summation),
            "soma" => Ok(ReportKind::Soma),
            other => Err(Error::UnknownReportKind {
                kind: other.to_string(),
            }),
        }
    }
}

/// One report: its time window, populations and prepared buffers
pub struct Report {
    name: String,
    kind: ReportKind,
    tstart: f64,
    tend: f64,
    dt: f64,
    units: String,
    num_steps: u32,
    max_buffer_size: u64,

    populations: IndexMap<String, IndexMap<u64, Node>>,
    population_offsets: IndexMap<String, u64>,
    buffers: Vec<PopulationBuffer>,

    writer: Option<SharedWriter>,
    prepared: bool,
    closed: bool,
}

impl Report {
    /// Create a report over the window `[tstart, tend]` sampled every `dt`
    pub fn new(
        name: impl Into<String>,
        kind: ReportKind,
        tstart: f64,
        tend: f64,
        dt: f64,
        units: impl Into<String>,
    ) -> Self {
        // Snap tstart onto the dt grid before counting steps, so a
        // save-restore resumes with the same step count.
        let tstart_snapped = (tstart / dt).round() * dt;
        let num_steps = ((tend - tstart_snapped) / dt).ceil() as u32;
        Self {
            name: name.into(),
            kind,
            tstart,
            tend,
            dt,
            units: units.into(),
            num_steps,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            populations: IndexMap::new(),
            population_offsets: IndexMap::new(),
            buffers: Vec::new(),
            writer: None,
            prepared: false,
            closed: false,
        }
    }

    /// Report name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Report kind
    pub fn kind(&self) -> ReportKind {
        self.kind
    }

    /// Steps the full run will write
    pub fn num_steps(&self) -> u32 {
        self.num_steps
    }

    /// True if no population holds any node
    pub fn is_empty(&self) -> bool {
        self.populations.values().all(IndexMap::is_empty)
    }

    /// Per-population buffers (after `prepare_dataset`)
    pub fn buffers(&self) -> &[PopulationBuffer] {
        &self.buffers
    }

    /// Cap the sample buffer budget, in bytes
    pub fn set_max_buffer_size(&mut self, bytes: u64) {
        trace!(report = %self.name, bytes, "setting buffer size");
        self.max_buffer_size = bytes;
    }

    /// Add a node to a population. The first node of a population fixes the
    /// population's id offset.
    pub fn add_node(
        &mut self,
        population: &str,
        population_offset: u64,
        node_id: u64,
    ) -> Result<()> {
        if self.prepared {
            return Err(Error::TopologyFrozen {
                report: self.name.clone(),
            });
        }
        let nodes = match self.populations.entry(population.to_string()) {
            indexmap::map::Entry::Occupied(entry) => entry.into_mut(),
            indexmap::map::Entry::Vacant(entry) => {
                self.population_offsets
                    .insert(population.to_string(), population_offset);
                entry.insert(IndexMap::new())
            }
        };
        if nodes.contains_key(&node_id) {
            return Err(Error::DuplicateNode {
                report: self.name.clone(),
                population: population.to_string(),
                node_id,
            });
        }
        nodes.insert(node_id, Node::new(node_id));
        Ok(())
    }

    /// Register one element of a node. Soma reports carry exactly one
    /// element per node.
    pub fn add_element(
        &mut self,
        population: &str,
        node_id: u64,
        element_id: u32,
        value: ElementValueFn,
    ) -> Result<()> {
        if self.prepared {
            return Err(Error::TopologyFrozen {
                report: self.name.clone(),
            });
        }
        let nodes = self
            .populations
            .get_mut(population)
            .ok_or_else(|| Error::PopulationNotFound {
                report: self.name.clone(),
                population: population.to_string(),
            })?;
        let node = nodes.get_mut(&node_id).ok_or_else(|| Error::NodeNotFound {
            report: self.name.clone(),
            population: population.to_string(),
            node_id,
        })?;
        if self.kind == ReportKind::Soma && node.num_elements() == 1 {
            return Err(Error::SomaSingleElement { node_id });
        }
        node.add_element(element_id, value);
        Ok(())
    }

    /// Open the container, agree on the global population list and prepare
    /// one buffer per population — including populations this worker holds
    /// no nodes for, which participate in the collectives with an empty
    /// node map.
    #[instrument(skip(self, coordinator), fields(report = %self.name, rank))]
    pub fn prepare_dataset(
        &mut self,
        coordinator: &dyn Coordinator,
        rank: usize,
        atomic_step: f64,
        min_steps_to_record: u32,
    ) -> Result<()> {
        let writer = coordinator.open_writer(&self.name)?;
        self.writer = Some(writer.clone());

        let local: Vec<String> = self.populations.keys().cloned().collect();
        let global = coordinator.sync_populations(&self.name, local)?;
        debug!(populations = global.len(), "population list agreed");

        for population in &global {
            let nodes = self
                .populations
                .shift_remove(population)
                .unwrap_or_default();
            let offset = self
                .population_offsets
                .get(population)
                .copied()
                .unwrap_or(0);
            let cfg = PopulationConfig {
                report_name: self.name.clone(),
                population_name: population.clone(),
                population_offset: offset,
                max_buffer_size: self.max_buffer_size,
                num_steps: self.num_steps,
                dt: self.dt,
                tstart: self.tstart,
                tend: self.tend,
                units: self.units.clone(),
                atomic_step,
                min_steps_to_record,
            };
            let mut buffer =
                PopulationBuffer::new(cfg, nodes, writer.clone(), coordinator)?;
            buffer.prepare_dataset(coordinator, rank)?;
            self.buffers.push(buffer);
        }
        self.populations.clear();
        self.prepared = true;
        Ok(())
    }

    /// Record the selected nodes on every population due at `step`
    pub fn record_nodes(&mut self, step: f64, allowed: &[u64]) {
        for buffer in &mut self.buffers {
            if buffer.is_due(step) {
                buffer.record_nodes(step, allowed);
            }
        }
    }

    /// Record every node on every population due at `step`
    pub fn record_all(&mut self, step: f64) -> Result<()> {
        for buffer in &mut self.buffers {
            if buffer.is_due(step) {
                buffer.record_all(step)?;
            }
        }
        Ok(())
    }

    /// Advance and maybe flush every population buffer
    pub fn check_and_flush(&mut self, time: f64) -> Result<()> {
        for buffer in &mut self.buffers {
            buffer.check_and_flush(time)?;
        }
        Ok(())
    }

    /// Remap element value sources across every population
    pub fn refresh_pointers(&mut self, f: &RefreshFn) {
        if self.prepared {
            for buffer in &mut self.buffers {
                buffer.refresh_pointers(f);
            }
        } else {
            for nodes in self.populations.values_mut() {
                for node in nodes.values_mut() {
                    node.refresh_pointers(f);
                }
            }
        }
    }

    /// Write any remaining buffered steps; past the end of the report
    /// window also close the populations and the container. Idempotent on
    /// the close flag.
    pub fn flush(&mut self, time: f64) -> Result<()> {
        trace!(report = %self.name, time, "flush requested");
        let past_end = time - self.tend + self.dt / 2.0 > 1e-6;
        for buffer in &mut self.buffers {
            buffer.flush()?;
            if past_end {
                buffer.close()?;
            }
        }
        if !self.closed {
            debug!(report = %self.name, "closing report container");
            if let Some(writer) = self.writer.as_mut() {
                writer.close()?;
            }
            self.closed = true;
        }
        Ok(())
    }
}

//! Spike log
//!
//! Spikes are zero-duration events `(timestamp, node_id)` recorded
//! independently of the time-series buffers. Each population declares a sort
//! order; the reorder itself is a collective so every worker writes the same
//! globally consistent sequence.

use tracing::{debug, instrument};

use voltrace_coordinator::{Coordinator, SpikeOrder};
use voltrace_storage::{DatasetValues, SharedWriter, Writer};

use crate::error::Result;
use crate::gid;

/// One population's spike lists and declared ordering
#[derive(Debug, Clone)]
pub struct SpikePopulation {
    population_name: String,
    population_offset: u64,
    order_by: SpikeOrder,
    timestamps: Vec<f64>,
    node_ids: Vec<u64>,
}

impl SpikePopulation {
    /// Create a spike population. An empty name selects the default
    /// population `"All"`.
    pub fn new(
        population_name: &str,
        population_offset: u64,
        order_by: SpikeOrder,
        timestamps: Vec<f64>,
        node_ids: Vec<u64>,
    ) -> Self {
        let population_name = if population_name.is_empty() {
            "All".to_string()
        } else {
            population_name.to_string()
        };
        Self {
            population_name,
            population_offset,
            order_by,
            timestamps,
            node_ids,
        }
    }

    /// Population name
    pub fn population_name(&self) -> &str {
        &self.population_name
    }

    /// Declared sort order
    pub fn order_by(&self) -> SpikeOrder {
        self.order_by
    }
}

/// A spike container holding one or more populations
pub struct SpikeFile {
    name: String,
    writer: SharedWriter,
    populations: Vec<SpikePopulation>,
}

impl SpikeFile {
    /// Wrap an opened container
    pub fn new(name: impl Into<String>, writer: SharedWriter) -> Self {
        Self {
            name: name.into(),
            writer,
            populations: Vec::new(),
        }
    }

    /// Container path
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a population for writing
    pub fn add_population(&mut self, population: SpikePopulation) {
        self.populations.push(population);
    }

    /// Write every queued population.
    ///
    /// Collective: group creation, the global length reduction and the sort
    /// are reached by every worker for every population.
    #[instrument(skip(self, coordinator), fields(file = %self.name))]
    pub fn write(&mut self, coordinator: &dyn Coordinator) -> Result<()> {
        for population in &mut self.populations {
            debug!(
                population = %population.population_name,
                spikes = population.timestamps.len(),
                order = %population.order_by,
                "writing spike population"
            );
            let group = format!("/spikes/{}", population.population_name);
            self.writer.configure_group("/spikes")?;
            self.writer.configure_group(&group)?;
            self.writer
                .configure_enum_attribute(&group, "sorting", population.order_by.as_str())?;

            let global_spikes =
                coordinator.global_dim(&self.name, population.timestamps.len() as u64)?;
            coordinator.sort_spikes(
                &mut population.timestamps,
                &mut population.node_ids,
                population.order_by,
            )?;

            let timestamps_path = format!("{group}/timestamps");
            self.writer.write(
                &timestamps_path,
                &population.population_name,
                DatasetValues::F64(population.timestamps.clone()),
            )?;
            if global_spikes > 0 {
                self.writer
                    .configure_attribute(&timestamps_path, "units", "ms")?;
            }

            let mut written_node_ids = population.node_ids.clone();
            gid::convert_gids(&mut written_node_ids, population.population_offset)?;
            self.writer.write(
                &format!("{group}/node_ids"),
                &population.population_name,
                DatasetValues::U64(written_node_ids),
            )?;
        }
        Ok(())
    }

    /// Close the spike container
    pub fn close(&mut self) -> Result<()> {
        self.writer.close()?;
        Ok(())
    }
}

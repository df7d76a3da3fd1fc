//! In-memory report container.
//!
//! [`MemoryWriter`] implements the [`Writer`] interface against an in-memory
//! tree that mirrors the on-disk container layout: groups, typed 1-D
//! datasets, appendable 2-D data datasets and string attributes. It backs the
//! single-worker coordinator and gives tests direct access to everything a
//! run wrote.

use indexmap::{IndexMap, IndexSet};

use voltrace_storage::{DatasetValues, Result, StorageError, TimeTriple, Writer};

/// An appendable 2-D float dataset
#[derive(Debug, Clone)]
pub struct Data2d {
    /// Step count the dataset was configured with
    pub declared_steps: u32,
    /// This worker's element count at configuration time
    pub declared_elements: u64,
    /// Row-major sample storage, `rows * cols` values
    pub values: Vec<f32>,
    /// Rows appended so far
    pub rows: u32,
    /// Columns per row, fixed by the first append
    pub cols: u64,
    /// Row count of each append, in call order
    pub appends: Vec<u32>,
}

/// In-memory hierarchical container
#[derive(Debug, Default)]
pub struct MemoryWriter {
    name: String,
    groups: IndexSet<String>,
    datasets: IndexMap<String, DatasetValues>,
    data_2d: IndexMap<String, Data2d>,
    attributes: IndexMap<(String, String), String>,
    enum_attributes: IndexMap<(String, String), String>,
    times: IndexMap<String, TimeTriple>,
    closed: bool,
}

impl MemoryWriter {
    /// Create an empty container labelled `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Container label (report name or spike file path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once [`Writer::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True if a group was created at `path`
    pub fn group_exists(&self, path: &str) -> bool {
        self.groups.contains(path)
    }

    /// 1-D dataset at `path`, if written
    pub fn dataset(&self, path: &str) -> Option<&DatasetValues> {
        self.datasets.get(path)
    }

    /// 2-D dataset at `path`, if configured
    pub fn data_2d(&self, path: &str) -> Option<&Data2d> {
        self.data_2d.get(path)
    }

    /// String attribute `key` on the object at `path`
    pub fn attribute(&self, path: &str, key: &str) -> Option<&str> {
        self.attributes
            .get(&(path.to_string(), key.to_string()))
            .map(String::as_str)
    }

    /// Enumerated attribute `key` on the object at `path`
    pub fn enum_attribute(&self, path: &str, key: &str) -> Option<&str> {
        self.enum_attributes
            .get(&(path.to_string(), key.to_string()))
            .map(String::as_str)
    }

    /// Time triple written at `path`
    pub fn time(&self, path: &str) -> Option<TimeTriple> {
        self.times.get(path).copied()
    }

    fn ensure_open(&self, path: &str) -> Result<()> {
        if self.closed {
            return Err(StorageError::Closed {
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

impl Writer for MemoryWriter {
    fn configure_group(&mut self, path: &str) -> Result<()> {
        self.ensure_open(path)?;
        self.groups.insert(path.to_string());
        Ok(())
    }

    fn configure_dataset(
        &mut self,
        path: &str,
        _population: &str,
        num_steps: u32,
        total_elements: u64,
    ) -> Result<()> {
        self.ensure_open(path)?;
        self.data_2d.entry(path.to_string()).or_insert(Data2d {
            declared_steps: num_steps,
            declared_elements: total_elements,
            values: Vec::new(),
            rows: 0,
            cols: total_elements,
            appends: Vec::new(),
        });
        Ok(())
    }

    fn configure_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()> {
        self.ensure_open(path)?;
        self.attributes
            .insert((path.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn configure_enum_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()> {
        self.ensure_open(path)?;
        self.enum_attributes
            .insert((path.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn write(&mut self, path: &str, _population: &str, values: DatasetValues) -> Result<()> {
        self.ensure_open(path)?;
        self.datasets.insert(path.to_string(), values);
        Ok(())
    }

    fn write_time(&mut self, path: &str, time: TimeTriple) -> Result<()> {
        self.ensure_open(path)?;
        self.times.insert(path.to_string(), time);
        Ok(())
    }

    fn write_2d(&mut self, path: &str, buffer: &[f32], rows: u32, cols: u64) -> Result<()> {
        self.ensure_open(path)?;
        let dataset = self
            .data_2d
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_string(),
            })?;
        if cols != dataset.cols {
            return Err(StorageError::ShapeMismatch {
                path: path.to_string(),
                expected: dataset.cols,
                got: cols,
            });
        }
        let expected = u64::from(rows) * cols;
        if buffer.len() as u64 != expected {
            return Err(StorageError::ShapeMismatch {
                path: path.to_string(),
                expected,
                got: buffer.len() as u64,
            });
        }
        dataset.values.extend_from_slice(buffer);
        dataset.rows += rows;
        dataset.appends.push(rows);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

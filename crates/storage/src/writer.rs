//! Container writer trait

use std::sync::{Arc, Mutex};

use crate::error::Result;

/// Time metadata triple `(tstart, tend, dt)` persisted under `/mapping/time`
pub type TimeTriple = [f64; 3];

/// Tagged value vector written to a 1-D dataset
#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValues {
    /// Element identifiers
    U32(Vec<u32>),
    /// Node identifiers and index pointers
    U64(Vec<u64>),
    /// Spike timestamps
    F64(Vec<f64>),
}

impl DatasetValues {
    /// Number of entries in the payload
    pub fn len(&self) -> usize {
        match self {
            DatasetValues::U32(v) => v.len(),
            DatasetValues::U64(v) => v.len(),
            DatasetValues::F64(v) => v.len(),
        }
    }

    /// True if the payload holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hierarchical container writer.
///
/// Every method maps to one collective operation against the container; in a
/// distributed run each worker must reach the same calls in the same order,
/// including workers with no local data.
pub trait Writer: Send {
    /// Create a group at `path` (idempotent for already-present groups)
    fn configure_group(&mut self, path: &str) -> Result<()>;

    /// Create the 2-D float dataset at `path` for `population` with the
    /// given step count and this worker's local element count
    fn configure_dataset(
        &mut self,
        path: &str,
        population: &str,
        num_steps: u32,
        total_elements: u64,
    ) -> Result<()>;

    /// Attach a string attribute to the object at `path`
    fn configure_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()>;

    /// Attach an enumerated string attribute to the object at `path`
    fn configure_enum_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()>;

    /// Write a 1-D dataset at `path` for `population`
    fn write(&mut self, path: &str, population: &str, values: DatasetValues) -> Result<()>;

    /// Write the time metadata triple at `path`
    fn write_time(&mut self, path: &str, time: TimeTriple) -> Result<()>;

    /// Append `rows` rows of `cols` float samples to the 2-D dataset at
    /// `path`. `buffer` holds exactly `rows * cols` values, step-major.
    fn write_2d(&mut self, path: &str, buffer: &[f32], rows: u32, cols: u64) -> Result<()>;

    /// Close the container. Idempotent; writes after close fail.
    fn close(&mut self) -> Result<()>;
}

/// Cloneable handle over a report's container writer.
///
/// One container is shared by every population of a report; each population
/// buffer holds its own handle by value and all writes happen inside the
/// serialized collective phases, so a plain mutex suffices.
#[derive(Clone)]
pub struct SharedWriter {
    inner: Arc<Mutex<dyn Writer>>,
}

impl SharedWriter {
    /// Wrap a concrete writer into a shared handle
    pub fn new<W: Writer + 'static>(writer: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Share an already-wrapped writer (lets backends keep a concrete
    /// handle to the same container for inspection)
    pub fn from_arc(inner: Arc<Mutex<dyn Writer>>) -> Self {
        Self { inner }
    }

    fn with<R>(&self, f: impl FnOnce(&mut dyn Writer) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut *guard)
    }
}

impl Writer for SharedWriter {
    fn configure_group(&mut self, path: &str) -> Result<()> {
        self.with(|w| w.configure_group(path))
    }

    fn configure_dataset(
        &mut self,
        path: &str,
        population: &str,
        num_steps: u32,
        total_elements: u64,
    ) -> Result<()> {
        self.with(|w| w.configure_dataset(path, population, num_steps, total_elements))
    }

    fn configure_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()> {
        self.with(|w| w.configure_attribute(path, key, value))
    }

    fn configure_enum_attribute(&mut self, path: &str, key: &str, value: &str) -> Result<()> {
        self.with(|w| w.configure_enum_attribute(path, key, value))
    }

    fn write(&mut self, path: &str, population: &str, values: DatasetValues) -> Result<()> {
        self.with(|w| w.write(path, population, values))
    }

    fn write_time(&mut self, path: &str, time: TimeTriple) -> Result<()> {
        self.with(|w| w.write_time(path, time))
    }

    fn write_2d(&mut self, path: &str, buffer: &[f32], rows: u32, cols: u64) -> Result<()> {
        self.with(|w| w.write_2d(path, buffer, rows, cols))
    }

    fn close(&mut self) -> Result<()> {
        self.with(|w| w.close())
    }
}

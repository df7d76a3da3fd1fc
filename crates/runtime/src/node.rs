//! Simulation node adapter
//!
//! A node is the recording-side view of one simulation unit: a stable id, an
//! ordered list of element ids and one value source per element. The
//! simulator owns the actual state; the recorder pulls current values at
//! record time through boxed closures.

use std::fmt;

use std::sync::Arc;

/// Current-value source for one element
pub type ElementValueFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Relocation callback for value sources, keyed by `(node_id, element_id)`.
///
/// Returning `None` keeps the element's existing source. Simulators call
/// this after reallocating their state vectors.
pub type RefreshFn = dyn Fn(u64, u32) -> Option<ElementValueFn> + Send + Sync;

/// One simulation unit's recorded elements
#[derive(Clone)]
pub struct Node {
    node_id: u64,
    element_ids: Vec<u32>,
    values: Vec<ElementValueFn>,
}

impl Node {
    /// Create a node with no elements
    pub fn new(node_id: u64) -> Self {
        Self {
            node_id,
            element_ids: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Stable node identifier
    pub fn node_id(&self) -> u64 {
        self.node_id
    }

    /// Element identifiers in registration order
    pub fn element_ids(&self) -> &[u32] {
        &self.element_ids
    }

    /// Number of registered elements
    pub fn num_elements(&self) -> usize {
        self.element_ids.len()
    }

    /// Register one element and its value source
    pub fn add_element(&mut self, element_id: u32, value: ElementValueFn) {
        self.element_ids.push(element_id);
        self.values.push(value);
    }

    /// Write the current value of every element into `out`, in
    /// `element_ids` order. `out` must hold exactly `num_elements` slots.
    pub fn fill_data(&self, out: &mut [f32]) {
        debug_assert_eq!(out.len(), self.values.len());
        for (slot, value) in out.iter_mut().zip(&self.values) {
            *slot = value() as f32;
        }
    }

    /// Remap element value sources through the relocation callback
    pub fn refresh_pointers(&mut self, f: &RefreshFn) {
        for (element_id, value) in self.element_ids.iter().zip(self.values.iter_mut()) {
            if let Some(replacement) = f(self.node_id, *element_id) {
                *value = replacement;
            }
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("node_id", &self.node_id)
            .field("element_ids", &self.element_ids)
            .finish()
    }
}

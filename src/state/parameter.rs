//! Typed parameter vectors with bounds, bulk operations, and checkpointing.
//!
//! A [`Parameter`] is a fixed-dimension ordered vector of values with shared
//! lower/upper bounds. Operators mutate it in place through indexed `set`,
//! a bulk multiplicative [`scale`](Parameter::scale), and an index
//! [`swap`](Parameter::swap). The driver checkpoints it with
//! [`store`](Parameter::store) / [`restore`](Parameter::restore) around each
//! proposal so a rejected move can be rolled back exactly.

use crate::error::ConfigError;

/// Result of a bulk scale that pushed a value out of its bounds (or, for
/// trees, a height below a child). Not an error: the enclosing proposal
/// responds by returning `NEG_INFINITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleViolation;

/// A fixed-dimension vector of values with shared bounds.
///
/// The dimension is fixed at construction; values are mutated in place for
/// the lifetime of the chain. `stored` holds the last checkpoint.
#[derive(Debug, Clone)]
pub struct Parameter<T> {
    values: Vec<T>,
    stored: Vec<T>,
    lower: T,
    upper: T,
    dirty: bool,
}

/// Real-valued parameter vector.
pub type RealParameter = Parameter<f64>;
/// Integer-valued parameter vector.
pub type IntParameter = Parameter<i64>;
/// Boolean (indicator) parameter vector.
pub type BoolParameter = Parameter<bool>;

impl<T: Copy + PartialOrd> Parameter<T> {
    /// Create a parameter from initial values and shared bounds.
    pub fn new(values: Vec<T>, lower: T, upper: T) -> Result<Self, ConfigError> {
        if values.is_empty() {
            return Err(ConfigError::InvalidParameter(
                "parameter must have at least one dimension".into(),
            ));
        }
        if lower > upper {
            return Err(ConfigError::InvalidParameter(
                "lower bound exceeds upper bound".into(),
            ));
        }
        Ok(Self {
            stored: values.clone(),
            values,
            lower,
            upper,
            dirty: false,
        })
    }

    /// Number of dimensions.
    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Value at index `i`.
    pub fn value(&self, i: usize) -> T {
        self.values[i]
    }

    /// All current values.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Set the value at index `i`, marking the parameter dirty.
    ///
    /// Bounds are not enforced here; operators check bounds and reject the
    /// proposal before writing.
    pub fn set_value(&mut self, i: usize, value: T) {
        self.values[i] = value;
        self.dirty = true;
    }

    /// Shared lower bound.
    pub fn lower(&self) -> T {
        self.lower
    }

    /// Shared upper bound.
    pub fn upper(&self) -> T {
        self.upper
    }

    /// Whether `value` lies within the closed bound interval.
    pub fn in_bounds(&self, value: T) -> bool {
        self.lower <= value && value <= self.upper
    }

    /// Exchange the values at indices `i` and `j`.
    pub fn swap(&mut self, i: usize, j: usize) {
        self.values.swap(i, j);
        self.dirty = true;
    }

    /// Checkpoint the current values.
    pub fn store(&mut self) {
        self.stored.copy_from_slice(&self.values);
    }

    /// Roll back to the last checkpoint.
    pub fn restore(&mut self) {
        self.values.copy_from_slice(&self.stored);
        self.dirty = false;
    }

    /// Whether the parameter changed since the last restore.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Mark the parameter as needing recomputation downstream.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Parameter<f64> {
    /// Multiply every dimension by `factor`.
    ///
    /// Returns the number of entries whose value actually changed (zero
    /// entries are unchanged by scaling). Fails with [`ScaleViolation`] if
    /// any scaled value leaves the bounds, in which case no values are
    /// modified.
    pub fn scale(&mut self, factor: f64) -> Result<usize, ScaleViolation> {
        let mut changed = 0;
        for &v in &self.values {
            let scaled = v * factor;
            if !self.in_bounds(scaled) {
                return Err(ScaleViolation);
            }
            if scaled != v {
                changed += 1;
            }
        }
        for v in &mut self.values {
            *v *= factor;
        }
        self.dirty = true;
        Ok(changed)
    }
}

impl Parameter<bool> {
    /// Create a boolean parameter; bounds are implicitly `false..=true`.
    pub fn from_bits(values: Vec<bool>) -> Result<Self, ConfigError> {
        Self::new(values, false, true)
    }

    /// Number of bits currently set.
    pub fn sum(&self) -> usize {
        self.values.iter().filter(|&&b| b).count()
    }
}

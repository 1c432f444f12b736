//! Settable value cell that tells "never configured" apart from "configured to null".

/// A configuration cell with three observable states.
///
/// - unset: nothing was ever assigned
/// - set to a value
/// - set to null (`None`), meaning "explicitly disabled"
///
/// Once set, a cell can be overwritten but never returns to unset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyRef<T> {
    value: Option<Option<T>>,
}

impl<T> PropertyRef<T> {
    /// Create an unset cell.
    pub const fn unset() -> Self {
        Self { value: None }
    }

    /// Mark the cell as set. `None` stores an explicit null.
    pub fn set(&mut self, value: Option<T>) {
        self.value = Some(value);
    }

    /// Shorthand for `set(Some(value))`.
    pub fn set_value(&mut self, value: T) {
        self.set(Some(value));
    }

    /// The stored value. Unset and null both read as `None`; use
    /// [`is_present`](Self::is_present) to tell them apart.
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref().and_then(Option::as_ref)
    }

    /// True once the cell has been set, even to null.
    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }

    /// True while the cell was never set.
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// True if the cell holds an explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self.value, Some(None))
    }

    /// Set only when currently unset.
    pub fn if_empty_set(&mut self, value: Option<T>) {
        if self.is_empty() {
            self.set(value);
        }
    }
}

impl<T: Clone> PropertyRef<T> {
    /// Copy `other` into this cell when `other` is set, including an explicit null.
    pub fn set_non_empty(&mut self, other: &PropertyRef<T>) {
        if let Some(value) = &other.value {
            self.value = Some(value.clone());
        }
    }

    /// The stored value, cloned.
    pub fn cloned(&self) -> Option<T> {
        self.get().cloned()
    }
}

impl<T> Default for PropertyRef<T> {
    fn default() -> Self {
        Self::unset()
    }
}

impl<T> From<T> for PropertyRef<T> {
    fn from(value: T) -> Self {
        Self {
            value: Some(Some(value)),
        }
    }
}

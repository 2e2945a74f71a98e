use std::collections::BTreeMap;

use thiserror::Error;

use crate::enums::RegistrationPolicy;
use crate::viewport::{SharedViewport, ViewportIndex};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("{index} is already registered")]
    Duplicate { index: ViewportIndex },

    #[error("{index} is out of range (expected {expected} viewports)")]
    OutOfRange {
        index: ViewportIndex,
        expected: usize,
    },
}

/// Per-viewport handles keyed by index, one handle per slot.
pub struct ViewportRegistry {
    expected: usize,
    policy: RegistrationPolicy,
    handles: BTreeMap<ViewportIndex, SharedViewport>,
}

impl ViewportRegistry {
    pub fn new(expected: usize, policy: RegistrationPolicy) -> Self {
        Self {
            expected,
            policy,
            handles: BTreeMap::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    /// Store `handle` at `index`.
    ///
    /// Returns the handle it replaced, which can only happen under
    /// [`RegistrationPolicy::Replace`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::OutOfRange`] for indices past the expected
    /// count and [`RegistryError::Duplicate`] for an occupied slot under
    /// [`RegistrationPolicy::Reject`].
    pub fn register(
        &mut self,
        index: ViewportIndex,
        handle: SharedViewport,
    ) -> Result<Option<SharedViewport>, RegistryError> {
        if index.0 >= self.expected {
            return Err(RegistryError::OutOfRange {
                index,
                expected: self.expected,
            });
        }
        if self.handles.contains_key(&index) && self.policy == RegistrationPolicy::Reject {
            return Err(RegistryError::Duplicate { index });
        }
        Ok(self.handles.insert(index, handle))
    }

    pub fn get(&self, index: ViewportIndex) -> Option<&SharedViewport> {
        self.handles.get(&index)
    }

    /// Current mapping in index order.
    pub fn all(&self) -> Vec<(ViewportIndex, SharedViewport)> {
        self.handles
            .iter()
            .map(|(index, handle)| (*index, handle.clone()))
            .collect()
    }

    pub fn handles(&self) -> impl Iterator<Item = &SharedViewport> {
        self.handles.values()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn missing(&self) -> Vec<ViewportIndex> {
        (0..self.expected)
            .map(ViewportIndex)
            .filter(|index| !self.handles.contains_key(index))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.handles.len() == self.expected
    }
}

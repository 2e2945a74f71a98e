use crate::registry::ViewportRegistry;
use crate::viewport::ViewportIndex;

/// Result of checking the registry after a registration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GateTransition {
    Pending { missing: Vec<ViewportIndex> },
    /// Every expected index is present for the first time. Returned once.
    BecameReady,
    AlreadyReady,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SetupStatus {
    Incomplete { missing: Vec<ViewportIndex> },
    Complete,
}

impl SetupStatus {
    pub fn is_complete(&self) -> bool {
        matches!(self, SetupStatus::Complete)
    }
}

/// Decides when cross-viewport setup runs.
#[derive(Debug)]
pub struct ReadinessGate {
    expected: usize,
    fired: bool,
    missing: Vec<ViewportIndex>,
}

impl ReadinessGate {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            fired: false,
            missing: (0..expected).map(ViewportIndex).collect(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }

    pub fn observe(&mut self, registry: &ViewportRegistry) -> GateTransition {
        if self.fired {
            return GateTransition::AlreadyReady;
        }
        self.missing = registry.missing();
        if self.missing.is_empty() {
            self.fired = true;
            GateTransition::BecameReady
        } else {
            GateTransition::Pending {
                missing: self.missing.clone(),
            }
        }
    }

    pub fn status(&self) -> SetupStatus {
        if self.fired {
            SetupStatus::Complete
        } else {
            SetupStatus::Incomplete {
                missing: self.missing.clone(),
            }
        }
    }
}

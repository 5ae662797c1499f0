use crate::common::Cycle;
use crate::pipeline::hazard::StallPolicy;

/// Knobs for a simulation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimConfig {
    pub policy: StallPolicy,
    /// When set, the run stops after this many cycles even if instructions
    /// remain. Unset runs until the program finishes
    pub max_cycles: Option<Cycle>,
}

impl SimConfig {
    pub fn new(policy: StallPolicy) -> Self {
        Self {
            policy,
            max_cycles: None,
        }
    }

    #[must_use]
    pub fn with_max_cycles(mut self, max_cycles: Cycle) -> Self {
        self.max_cycles = Some(max_cycles);
        self
    }

    /// Whether a run that has reached `clock` must stop
    pub fn limit_reached(&self, clock: Cycle) -> bool {
        self.max_cycles.is_some_and(|max| clock >= max)
    }
}

//! Failures surfaced by the pipeline model.
//!
//! None of these are recoverable inside the simulation: a run that hits one
//! is halted and the error is handed to the driver.

use thiserror::Error;

use crate::common::Cycle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// `advance_stage` called twice for the same cycle, or for a cycle that
    /// precedes one already recorded
    #[error("`{instruction}` already has a stage recorded for cycle {cycle}")]
    StageAlreadyRecorded { instruction: String, cycle: Cycle },

    /// `advance_stage` called on an instruction that has completed write-back
    #[error("`{instruction}` was advanced in cycle {cycle} after it retired")]
    AlreadyRetired { instruction: String, cycle: Cycle },

    #[error("immediate operand `{operand}` is not an integer")]
    InvalidImmediate { operand: String },

    #[error("register `{name}` does not exist")]
    UnknownRegister { name: String },

    #[error("unsupported operation `{mnemonic}`")]
    UnsupportedMnemonic { mnemonic: String },

    #[error("`{instruction}` is missing its {operand} operand")]
    MissingOperand {
        instruction: String,
        operand: &'static str,
    },

    #[error("`{instruction}` is not a branch")]
    NotABranch { instruction: String },

    #[error("label `{label}` is not defined")]
    UndefinedLabel { label: String },
}

pub type Result<T> = std::result::Result<T, SimError>;

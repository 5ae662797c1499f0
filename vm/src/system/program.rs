use std::collections::HashMap;

use log::error;

use crate::error::{Result, SimError};
use crate::instruction::instruction::Instruction;

/// A parsed program: instruction prototypes in order plus the label table.
/// Every fetch clones a fresh copy of the prototype
#[derive(Debug, Clone, Default)]
pub struct Program {
    instructions: Vec<Instruction>,
    labels: HashMap<String, usize>,
}

impl Program {
    /// Builds a program, checking that every branch names a known label.
    /// A label may point one past the last instruction (the end of the program)
    pub fn new(instructions: Vec<Instruction>, labels: HashMap<String, usize>) -> Result<Self> {
        if let Some((label, &idx)) = labels.iter().find(|&(_, &idx)| idx > instructions.len()) {
            error!("Label {label} points past the end of the program ({idx})");
            return Err(SimError::UndefinedLabel {
                label: label.clone(),
            });
        }

        let program = Program {
            instructions,
            labels,
        };
        for instr in program.instructions.iter().filter(|i| i.is_branch()) {
            let label = instr.target().ok_or_else(|| SimError::MissingOperand {
                instruction: instr.printable().to_owned(),
                operand: "target",
            })?;
            program.label_index(label)?;
        }

        Ok(program)
    }

    /// Index of the instruction `label` names
    pub fn label_index(&self, label: &str) -> Result<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| SimError::UndefinedLabel {
                label: label.to_owned(),
            })
    }

    pub fn get(&self, index: usize) -> Option<&Instruction> {
        self.instructions.get(index)
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

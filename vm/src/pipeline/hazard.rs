use log::info;
use strum_macros::{Display, EnumIter, EnumString};

use crate::common::Stage;
use crate::instruction::instruction::Instruction;

/// How a detected data hazard is turned into stall cycles
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Display, EnumString, EnumIter)]
#[strum(serialize_all = "kebab-case")]
pub enum StallPolicy {
    /// No forwarding: the consumer waits in decode until the producer writes
    /// back (registers are written in the first half of a cycle and read in
    /// the second)
    #[default]
    UntilWriteBack,
    /// Results are bypassed to dependents, hazards never stall
    Forwarding,
}

impl StallPolicy {
    /// Stall cycles owed to a producer currently sitting at `producer_stage`
    pub fn stall_cycles(self, producer_stage: Stage) -> usize {
        match self {
            StallPolicy::UntilWriteBack => producer_stage.distance_to(Stage::WriteBack),
            StallPolicy::Forwarding => 0,
        }
    }

    /// Stall cycles `consumer` needs before it can leave decode, given the
    /// instructions ahead of it in the pipeline
    pub fn required_stall<'a, I>(self, consumer: &Instruction, older: I) -> usize
    where
        I: IntoIterator<Item = &'a Instruction>,
    {
        older
            .into_iter()
            .filter(|producer| producer.data_hazard_with(consumer))
            .filter_map(|producer| {
                let stage = producer.position()?;
                info!(
                    "Data hazard: `{consumer}` reads {} from `{producer}` (at {stage})",
                    producer.destination().unwrap_or_default()
                );
                Some(self.stall_cycles(stage))
            })
            .max()
            .unwrap_or(0)
    }
}

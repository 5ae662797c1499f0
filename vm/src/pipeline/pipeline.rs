use log::info;

use crate::common::{Cycle, Stage};
use crate::error::{Result, SimError};
use crate::instruction::instruction::Instruction;
use crate::pipeline::hazard::StallPolicy;
use crate::register::register_system::RegisterFile;

/// Every instruction that has entered the pipeline during a run, plus the
/// ordered set still in flight.
///
/// Instructions live in an append-only arena so ids stay stable while nops
/// are spliced in ahead of stalled instructions.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    slots: Vec<Instruction>,
    rows: Vec<usize>,      // diagram order
    in_flight: Vec<usize>, // oldest first
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves every in-flight instruction forward one cycle, oldest first.
    ///
    /// Returns the label fetch must be redirected to when a branch retired
    /// taken this cycle.
    pub fn tick(
        &mut self,
        cycle: Cycle,
        registers: &mut RegisterFile,
        policy: StallPolicy,
    ) -> Result<Option<String>> {
        let mut redirect = None;
        // where the nearest older live instruction sits after this cycle
        let mut ahead: Option<Stage> = None;

        let mut idx = 0;
        while idx < self.in_flight.len() {
            let id = self.in_flight[idx];

            if self.slots[id].is_flushed() {
                self.slots[id].advance_stage(cycle, registers)?;
                idx += 1;
                continue;
            }

            if self.slots[id].pending_stalls() > 0 {
                let nop_id = self.insert_nop_before(idx);
                self.slots[nop_id].advance_stage(cycle, registers)?;
                idx += 1;
            } else if let (Some(front), Some(next)) =
                (ahead, self.slots[id].position().and_then(Stage::next))
            {
                if next >= front {
                    info!(
                        "Cycle {cycle}: `{}` held, {next} is still occupied",
                        self.slots[id]
                    );
                    self.slots[id].add_stall(1);
                }
            }

            let prev = self.slots[id].position();
            self.slots[id].advance_stage(cycle, registers)?;
            let entered_decode =
                prev != Some(Stage::Decode) && self.slots[id].position() == Some(Stage::Decode);

            if entered_decode {
                let stall = policy.required_stall(
                    &self.slots[id],
                    self.in_flight[..idx].iter().map(|&older| &self.slots[older]),
                );
                self.slots[id].add_stall(stall);
            }

            let instr = &self.slots[id];
            if instr.is_done() && instr.is_branch() && instr.branch_taken(registers)? {
                let label = instr.target().ok_or_else(|| SimError::MissingOperand {
                    instruction: instr.printable().to_owned(),
                    operand: "target",
                })?;
                info!("Cycle {cycle}: branch `{instr}` taken, flushing younger instructions");
                redirect = Some(label.to_owned());
                for &younger in &self.in_flight[idx + 1..] {
                    self.slots[younger].squash();
                }
            }

            ahead = self.slots[id].position();
            idx += 1;
        }

        let slots = &self.slots;
        self.in_flight.retain(|&id| !slots[id].is_done());

        Ok(redirect)
    }

    /// Spawns a nop from the instruction at `in_flight[idx]` and places it
    /// directly ahead of it. Returns the nop's id
    fn insert_nop_before(&mut self, idx: usize) -> usize {
        let id = self.in_flight[idx];
        let nop_id = self.slots.len();
        self.slots.push(self.slots[id].make_nop());

        let row = self
            .rows
            .iter()
            .position(|&row| row == id)
            .unwrap_or(self.rows.len());
        self.rows.insert(row, nop_id);
        self.in_flight.insert(idx, nop_id);

        nop_id
    }

    /// Puts `instr` into the fetch stage for `cycle`
    pub fn fetch(
        &mut self,
        mut instr: Instruction,
        cycle: Cycle,
        registers: &mut RegisterFile,
    ) -> Result<()> {
        instr.advance_stage(cycle, registers)?;
        info!("Cycle {cycle}: fetched `{instr}`");

        let id = self.slots.len();
        self.slots.push(instr);
        self.rows.push(id);
        self.in_flight.push(id);
        Ok(())
    }

    /// Whether a new instruction can enter fetch this cycle
    pub fn fetch_slot_free(&self) -> bool {
        !self.in_flight().any(|instr| {
            !instr.is_flushed() && instr.position() == Some(Stage::Fetch)
        })
    }

    /// Instructions still in the pipeline, oldest first
    pub fn in_flight(&self) -> impl Iterator<Item = &Instruction> {
        self.in_flight.iter().map(|&id| &self.slots[id])
    }

    /// Every instruction that has entered the pipeline, in diagram order
    pub fn rows(&self) -> impl Iterator<Item = &Instruction> {
        self.rows.iter().map(|&id| &self.slots[id])
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }
}

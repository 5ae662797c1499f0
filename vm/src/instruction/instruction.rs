use std::fmt::Display;

use log::{error, info, warn};

use crate::common::{Cycle, Stage};
use crate::error::{Result, SimError};
use crate::instruction::opcode::{parse_immediate, OpClass, Opcode};
use crate::register::register_system::{RegisterFile, ZERO_REG};

const NOP_TEXT: &str = "nop";

/// Where an instruction is in its life
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Status {
    Inactive, // built, not yet fetched
    Active,
    Done, // write-back completed
}

/// One decoded instruction together with its per-cycle stage history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    printable: String,
    destination: Option<String>,
    arg1: Option<String>,
    arg2: Option<String>,
    target: Option<String>, // branch label
    stage_at_cycle: Vec<Stage>,
    position: Option<Stage>, // logical slot, `None` until fetched
    done: bool,
    flushed: bool, // nop or squashed: keeps moving but records bubbles
    pending_stalls: usize,
    stall_count: usize,
    last_cycle: Option<Cycle>,
}

impl Instruction {
    /// Builds an inactive instruction for `mnemonic`. Operands are filled in
    /// afterwards by the caller
    pub fn new(mnemonic: &str, printable: &str) -> Result<Self> {
        let opcode = Opcode::from_mnemonic(mnemonic)?;
        Ok(Self::from_opcode(opcode, printable))
    }

    fn from_opcode(opcode: Opcode, printable: &str) -> Self {
        Self {
            opcode,
            printable: printable.to_owned(),
            destination: None,
            arg1: None,
            arg2: None,
            target: None,
            stage_at_cycle: Vec::new(),
            position: None,
            done: false,
            flushed: opcode == Opcode::Nop,
            pending_stalls: 0,
            stall_count: 0,
            last_cycle: None,
        }
    }

    #[must_use]
    pub fn with_destination(mut self, dest: &str) -> Self {
        self.destination = Some(dest.to_owned());
        self
    }

    #[must_use]
    pub fn with_sources(mut self, arg1: &str, arg2: &str) -> Self {
        self.arg1 = Some(arg1.to_owned());
        self.arg2 = Some(arg2.to_owned());
        self
    }

    #[must_use]
    pub fn with_target(mut self, label: &str) -> Self {
        self.target = Some(label.to_owned());
        self
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn printable(&self) -> &str {
        &self.printable
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Source operand names; immediates are included as their literal text
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.arg1.iter().chain(self.arg2.iter()).map(String::as_str)
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_branch(&self) -> bool {
        self.opcode.class() == OpClass::Branch
    }

    pub fn is_nop(&self) -> bool {
        self.opcode.class() == OpClass::Nop
    }

    /// Whether this slot is draining without effect (a nop or a squashed
    /// instruction)
    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    pub fn status(&self) -> Status {
        match (self.position, self.done) {
            (_, true) => Status::Done,
            (None, false) => Status::Inactive,
            (Some(_), false) => Status::Active,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The logical stage last entered, `None` before the first fetch
    pub fn position(&self) -> Option<Stage> {
        self.position
    }

    pub fn stall_count(&self) -> usize {
        self.stall_count
    }

    /// Stall cycles added but not yet spent
    pub fn pending_stalls(&self) -> usize {
        self.pending_stalls
    }

    /// Records this instruction's marker for `cycle`, moving it to the next
    /// stage unless a stall is pending. Entering write-back applies the
    /// instruction's effect to `registers` and retires it.
    ///
    /// Returns the marker recorded for `cycle`.
    pub fn advance_stage(&mut self, cycle: Cycle, registers: &mut RegisterFile) -> Result<Stage> {
        if self.done {
            error!("Instruction `{self}` advanced in cycle {cycle} after retiring");
            return Err(SimError::AlreadyRetired {
                instruction: self.printable.clone(),
                cycle,
            });
        }
        if self.last_cycle.is_some_and(|last| cycle <= last) {
            error!("Instruction `{self}` advanced twice for cycle {cycle}");
            return Err(SimError::StageAlreadyRecorded {
                instruction: self.printable.clone(),
                cycle,
            });
        }

        let next = match self.position {
            None => Stage::Fetch,
            Some(current) if self.pending_stalls > 0 => {
                self.pending_stalls -= 1;
                current
            }
            // write-back always retires, so an active instruction has a next stage
            Some(current) => current.next().unwrap_or(Stage::WriteBack),
        };
        let marker = if self.flushed { Stage::Bubble } else { next };
        info!("Cycle {cycle}: `{self}` -> {}", marker.symbol());

        self.position = Some(next);
        self.last_cycle = Some(cycle);
        self.record(cycle, marker);

        if next == Stage::WriteBack {
            if !self.flushed {
                self.write_back(registers)?;
            }
            self.done = true;
            info!("Cycle {cycle}: `{self}` retired");
        }

        Ok(marker)
    }

    fn record(&mut self, cycle: Cycle, marker: Stage) {
        if self.stage_at_cycle.len() <= cycle {
            self.stage_at_cycle.resize(cycle + 1, Stage::Empty);
        }
        self.stage_at_cycle[cycle] = marker;
    }

    /// Holds the instruction at its current stage for the next `num_stalls`
    /// advances. Nops never stall
    pub fn add_stall(&mut self, num_stalls: usize) {
        if self.is_nop() || num_stalls == 0 {
            return;
        }
        if self.done {
            warn!("Ignoring stall of {num_stalls} cycle(s) for retired `{self}`");
            return;
        }
        info!("Stalling `{self}` for {num_stalls} cycle(s)");
        self.pending_stalls += num_stalls;
        self.stall_count += num_stalls;
    }

    /// The marker recorded for `cycle`, or `Stage::Empty` if the instruction
    /// was not in the pipeline then
    pub fn stage_at(&self, cycle: Cycle) -> Stage {
        self.stage_at_cycle
            .get(cycle)
            .copied()
            .unwrap_or_default()
    }

    /// The full recorded history, indexed by cycle
    pub fn history(&self) -> &[Stage] {
        &self.stage_at_cycle
    }

    /// True when `other` reads a register this instruction has yet to write
    pub fn data_hazard_with(&self, other: &Instruction) -> bool {
        if std::ptr::eq(self, other) || self.done || other.done || self.flushed || other.flushed {
            return false;
        }
        if self.opcode.class() != OpClass::NonBranch {
            return false;
        }
        // writes to $zero are discarded, nothing can depend on them
        let Some(dest) = self.destination().filter(|&dest| dest != ZERO_REG) else {
            return false;
        };

        let source_regs = if other.opcode.takes_immediate() {
            // the second operand of an immediate form is a literal
            other.arg1.iter().map(String::as_str).collect::<Vec<_>>()
        } else {
            other.sources().collect()
        };
        source_regs.contains(&dest)
    }

    /// Applies this instruction's effect. Branches and nops leave the
    /// registers untouched
    pub fn write_back(&self, registers: &mut RegisterFile) -> Result<()> {
        let Some(alu) = self.opcode.alu() else {
            return Ok(());
        };

        let dest = self.operand(self.destination.as_ref(), "destination")?;
        let lhs = registers.read(self.operand(self.arg1.as_ref(), "first source")?)?;
        let arg2 = self.operand(self.arg2.as_ref(), "second source")?;
        let rhs = if self.opcode.takes_immediate() {
            parse_immediate(arg2)?
        } else {
            registers.read(arg2)?
        };

        let result = alu(lhs, rhs);
        info!("Write-back: `{self}` stores {result} into {dest}");
        registers.write(dest, result)
    }

    /// Decides whether this branch is taken given the current register values
    pub fn branch_taken(&self, registers: &RegisterFile) -> Result<bool> {
        let Some(compare) = self.opcode.compare() else {
            return Err(SimError::NotABranch {
                instruction: self.printable.clone(),
            });
        };

        let lhs = registers.read(self.operand(self.arg1.as_ref(), "first source")?)?;
        let rhs = registers.read(self.operand(self.arg2.as_ref(), "second source")?)?;
        Ok(compare(lhs, rhs))
    }

    fn operand<'a>(&self, field: Option<&'a String>, operand: &'static str) -> Result<&'a str> {
        field
            .map(String::as_str)
            .ok_or_else(|| SimError::MissingOperand {
                instruction: self.printable.clone(),
                operand,
            })
    }

    /// Derives a bubble occupying the same slot as `self`: same history so
    /// far, no operands and no effect
    pub fn make_nop(&self) -> Instruction {
        Instruction {
            stage_at_cycle: self.stage_at_cycle.clone(),
            position: self.position,
            last_cycle: self.last_cycle,
            ..Instruction::from_opcode(Opcode::Nop, NOP_TEXT)
        }
    }

    /// Discards the instruction's effect. It keeps moving through its
    /// remaining slots as a bubble and retires without writing back
    pub fn squash(&mut self) {
        if self.done {
            return;
        }
        info!("Squashing `{self}`");
        self.flushed = true;
        self.pending_stalls = 0;
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.printable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn add(dest: &str, arg1: &str, arg2: &str) -> Instruction {
        Instruction::new("add", &format!("add {dest},{arg1},{arg2}"))
            .unwrap()
            .with_destination(dest)
            .with_sources(arg1, arg2)
    }

    fn run_cycles(instr: &mut Instruction, cycles: std::ops::RangeInclusive<Cycle>, regs: &mut RegisterFile) {
        for cycle in cycles {
            instr.advance_stage(cycle, regs).unwrap();
        }
    }

    #[test]
    fn walks_all_five_stages_then_retires() {
        let mut regs = RegisterFile::new();
        let mut instr = add("$t0", "$t1", "$t2");
        assert_eq!(instr.status(), Status::Inactive);

        run_cycles(&mut instr, 1..=5, &mut regs);

        assert_eq!(instr.status(), Status::Done);
        let recorded: Vec<Stage> = (0..=6).map(|c| instr.stage_at(c)).collect();
        assert_eq!(
            recorded,
            [
                Stage::Empty,
                Stage::Fetch,
                Stage::Decode,
                Stage::Execute,
                Stage::Memory,
                Stage::WriteBack,
                Stage::Empty,
            ]
        );
    }

    #[test]
    fn add_writes_sum_at_write_back() {
        let mut regs = RegisterFile::new();
        regs.write("$t1", 3).unwrap();
        regs.write("$t2", 4).unwrap();
        let mut instr = add("$t0", "$t1", "$t2");

        run_cycles(&mut instr, 1..=4, &mut regs);
        assert_eq!(regs.read("$t0"), Ok(0));
        instr.advance_stage(5, &mut regs).unwrap();
        assert_eq!(regs.read("$t0"), Ok(7));
    }

    #[test]
    fn advancing_twice_in_a_cycle_is_rejected() {
        let mut regs = RegisterFile::new();
        let mut instr = add("$t0", "$t1", "$t2");
        instr.advance_stage(1, &mut regs).unwrap();

        let err = instr.advance_stage(1, &mut regs).unwrap_err();
        assert_eq!(
            err,
            SimError::StageAlreadyRecorded {
                instruction: "add $t0,$t1,$t2".to_owned(),
                cycle: 1
            }
        );
        // the first record is untouched
        assert_eq!(instr.stage_at(1), Stage::Fetch);
        assert_eq!(instr.position(), Some(Stage::Fetch));
    }

    #[test]
    fn advancing_after_retirement_is_rejected_and_effect_fires_once() {
        let mut regs = RegisterFile::new();
        regs.write("$t1", 1).unwrap();
        let mut instr = add("$t1", "$t1", "$t1");
        run_cycles(&mut instr, 1..=5, &mut regs);
        assert_eq!(regs.read("$t1"), Ok(2));

        assert!(matches!(
            instr.advance_stage(6, &mut regs),
            Err(SimError::AlreadyRetired { cycle: 6, .. })
        ));
        let _ = instr.stage_at(5);
        let _ = instr.stage_at(6);
        assert_eq!(regs.read("$t1"), Ok(2));
    }

    #[test]
    fn stall_repeats_current_stage() {
        let mut regs = RegisterFile::new();
        let mut instr = add("$t3", "$t0", "$t0");
        run_cycles(&mut instr, 1..=2, &mut regs);
        instr.add_stall(2);

        run_cycles(&mut instr, 3..=4, &mut regs);
        assert_eq!(instr.stage_at(3), Stage::Decode);
        assert_eq!(instr.stage_at(4), Stage::Decode);
        instr.advance_stage(5, &mut regs).unwrap();
        assert_eq!(instr.stage_at(5), Stage::Execute);
        assert_eq!(instr.stall_count(), 2);
        assert_eq!(instr.pending_stalls(), 0);
    }

    #[test]
    fn stall_after_retirement_is_ignored() {
        let mut regs = RegisterFile::new();
        let mut instr = add("$t0", "$t1", "$t2");
        run_cycles(&mut instr, 1..=5, &mut regs);
        instr.add_stall(3);

        assert_eq!(instr.stall_count(), 0);
        assert_eq!(instr.pending_stalls(), 0);
    }

    #[test]
    fn hazard_requires_pending_producer_of_a_source() {
        let mut regs = RegisterFile::new();
        let mut producer = add("$t0", "$t1", "$t2");
        let consumer = add("$t3", "$t0", "$t0");
        let unrelated = add("$t4", "$t1", "$t2");

        assert!(producer.data_hazard_with(&consumer));
        assert!(!producer.data_hazard_with(&unrelated));
        assert!(!consumer.data_hazard_with(&producer));
        assert!(!producer.data_hazard_with(&producer));

        run_cycles(&mut producer, 1..=5, &mut regs);
        assert!(!producer.data_hazard_with(&consumer));
    }

    #[test]
    fn retired_consumer_has_no_hazard() {
        let mut regs = RegisterFile::new();
        let producer = add("$t0", "$t1", "$t2");
        let mut consumer = add("$t3", "$t0", "$t0");
        run_cycles(&mut consumer, 1..=5, &mut regs);

        assert_eq!(consumer.status(), Status::Done);
        assert!(!producer.data_hazard_with(&consumer));
    }

    #[test]
    fn zero_register_destination_is_not_a_dependency() {
        let producer = add("$zero", "$t1", "$t2");
        let consumer = add("$t3", "$zero", "$zero");
        assert!(!producer.data_hazard_with(&consumer));
    }

    #[test]
    fn immediate_literals_are_not_hazard_sources() {
        let producer = add("$t0", "$t1", "$t2");
        let consumer = Instruction::new("addi", "addi $t1,$t2,$t0")
            .unwrap()
            .with_destination("$t1")
            .with_sources("$t2", "$t0");
        assert!(!producer.data_hazard_with(&consumer));
    }

    #[test]
    fn branches_and_nops_never_produce_hazards() {
        let branch = Instruction::new("beq", "beq $t0,$t1,loop")
            .unwrap()
            .with_sources("$t0", "$t1")
            .with_target("loop");
        let consumer = add("$t2", "$t0", "$t1");
        let producer = add("$t0", "$t1", "$t2");

        assert!(!branch.data_hazard_with(&consumer));
        assert!(producer.data_hazard_with(&branch));
        assert!(!producer.make_nop().data_hazard_with(&consumer));
        assert!(!producer.data_hazard_with(&consumer.make_nop()));
    }

    #[test]
    fn branch_write_back_leaves_registers_alone() {
        let mut regs = RegisterFile::new();
        regs.write("$t0", 5).unwrap();
        let before = regs.clone();
        let mut branch = Instruction::new("bne", "bne $t0,$t1,done")
            .unwrap()
            .with_sources("$t0", "$t1")
            .with_target("done");

        run_cycles(&mut branch, 1..=5, &mut regs);
        assert_eq!(regs, before);
        assert_eq!(branch.branch_taken(&regs), Ok(true));
    }

    #[test]
    fn beq_on_same_register_is_always_taken() {
        let branch = Instruction::new("beq", "beq $t0,$t0,L")
            .unwrap()
            .with_sources("$t0", "$t0")
            .with_target("L");
        for val in [i32::MIN, -1, 0, 17, i32::MAX] {
            let regs = RegisterFile::with_registers([("$t0", val)]);
            assert_eq!(branch.branch_taken(&regs), Ok(true));
        }
    }

    #[test]
    fn non_branch_has_no_branch_decision() {
        let regs = RegisterFile::new();
        assert_eq!(
            add("$t0", "$t1", "$t2").branch_taken(&regs),
            Err(SimError::NotABranch {
                instruction: "add $t0,$t1,$t2".to_owned()
            })
        );
    }

    #[test]
    fn write_back_reports_bad_operands() {
        let mut regs = RegisterFile::new();
        let bad_imm = Instruction::new("addi", "addi $t0,$t1,ten")
            .unwrap()
            .with_destination("$t0")
            .with_sources("$t1", "ten");
        assert_eq!(
            bad_imm.write_back(&mut regs),
            Err(SimError::InvalidImmediate {
                operand: "ten".to_owned()
            })
        );

        let bad_reg = add("$t0", "$q1", "$t2");
        assert_eq!(
            bad_reg.write_back(&mut regs),
            Err(SimError::UnknownRegister {
                name: "$q1".to_owned()
            })
        );

        let missing = Instruction::new("or", "or").unwrap();
        assert!(matches!(
            missing.write_back(&mut regs),
            Err(SimError::MissingOperand {
                operand: "destination",
                ..
            })
        ));
        assert_eq!(regs, RegisterFile::new());
    }

    #[test]
    fn unknown_mnemonic_fails_at_construction() {
        assert_eq!(
            Instruction::new("mul", "mul $t0,$t1,$t2"),
            Err(SimError::UnsupportedMnemonic {
                mnemonic: "mul".to_owned()
            })
        );
    }

    #[test]
    fn nop_copies_history_but_not_state() {
        let mut regs = RegisterFile::new();
        let mut instr = add("$t3", "$t0", "$t0");
        run_cycles(&mut instr, 1..=2, &mut regs);
        instr.add_stall(2);

        for cycle in 3..=4 {
            let mut nop = instr.make_nop();
            assert!(nop.is_nop() && nop.destination().is_none());
            assert_eq!(nop.sources().count(), 0);
            assert_eq!(nop.advance_stage(cycle, &mut regs), Ok(Stage::Bubble));
            instr.advance_stage(cycle, &mut regs).unwrap();
            assert_eq!(nop.stage_at(cycle), Stage::Bubble);
        }
        run_cycles(&mut instr, 5..=7, &mut regs);

        let history: Vec<&str> = (1..=7).map(|c| instr.stage_at(c).symbol()).collect();
        assert_eq!(history, ["IF", "ID", "ID", "ID", "EX", "MEM", "WB"]);
    }

    #[test]
    fn nops_cannot_be_stalled() {
        let mut nop = Instruction::new("nop", "nop").unwrap();
        nop.add_stall(3);
        assert_eq!(nop.stall_count(), 0);
        assert_eq!(nop.pending_stalls(), 0);
    }

    #[test]
    fn squashed_instruction_drains_without_effect() {
        let mut regs = RegisterFile::new();
        regs.write("$t1", 3).unwrap();
        let mut instr = add("$t0", "$t1", "$t1");
        run_cycles(&mut instr, 1..=2, &mut regs);
        instr.squash();
        run_cycles(&mut instr, 3..=5, &mut regs);

        assert!(instr.is_done());
        assert_eq!(regs.read("$t0"), Ok(0));
        let history: Vec<&str> = (1..=5).map(|c| instr.stage_at(c).symbol()).collect();
        assert_eq!(history, ["IF", "ID", "*", "*", "*"]);
    }
}

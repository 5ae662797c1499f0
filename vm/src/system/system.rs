use std::fmt::Display;

use log::{info, warn};

use crate::common::Cycle;
use crate::config::SimConfig;
use crate::error::Result;
use crate::pipeline::hazard::StallPolicy;
use crate::pipeline::pipeline::Pipeline;
use crate::register::register_system::RegisterFile;
use crate::system::program::Program;

const RULE_WIDTH: usize = 82;
const TEXT_COLUMN_WIDTH: usize = 20;
const CYCLE_COLUMN_WIDTH: usize = 4;

/// Drives a program through the pipeline one clock cycle at a time
#[derive(Debug, Clone)]
pub struct System {
    pub clock: Cycle,
    pub registers: RegisterFile,
    pub pipeline: Pipeline,
    program: Program,
    program_counter: usize,
    config: SimConfig,
}

impl System {
    pub fn new(program: Program, config: SimConfig) -> Self {
        Self {
            clock: 0,
            registers: RegisterFile::new(),
            pipeline: Pipeline::new(),
            program,
            program_counter: 0,
            config,
        }
    }

    /// Replaces the initial register contents
    #[must_use]
    pub fn with_registers(mut self, registers: RegisterFile) -> Self {
        self.registers = registers;
        self
    }

    /// Clears all run state, keeping the program and configuration
    pub fn reset(&mut self) {
        self.clock = 0;
        self.registers = RegisterFile::new();
        self.pipeline = Pipeline::new();
        self.program_counter = 0;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn config(&self) -> SimConfig {
        self.config
    }

    /// Index of the next instruction to fetch
    pub fn program_counter(&self) -> usize {
        self.program_counter
    }

    /// Every instruction has been fetched and nothing is left in flight
    pub fn is_finished(&self) -> bool {
        self.program_counter >= self.program.len() && self.pipeline.is_empty()
    }

    /// Advances the machine by one clock cycle
    pub fn step(&mut self) -> Result<()> {
        self.clock += 1;
        let cycle = self.clock;
        info!("Starting cycle {cycle}, PC: {}", self.program_counter);

        if let Some(label) = self
            .pipeline
            .tick(cycle, &mut self.registers, self.config.policy)?
        {
            let target = self.program.label_index(&label)?;
            info!(
                "Redirecting fetch to {label} ({target}), old PC: {}",
                self.program_counter
            );
            self.program_counter = target;
        }

        if self.pipeline.fetch_slot_free() {
            if let Some(instr) = self.program.get(self.program_counter) {
                self.pipeline
                    .fetch(instr.clone(), cycle, &mut self.registers)?;
                self.program_counter += 1;
            }
        }

        Ok(())
    }

    /// Steps until the program completes or the cycle limit is reached
    pub fn run(&mut self) -> Result<()> {
        while !self.is_finished() && !self.config.limit_reached(self.clock) {
            self.step()?;
        }
        if !self.is_finished() {
            warn!(
                "Stopped after {} cycles with the program still running",
                self.clock
            );
        }
        Ok(())
    }
}

impl Display for System {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rule = "-".repeat(RULE_WIDTH);
        let mode = match self.config.policy {
            StallPolicy::UntilWriteBack => "no forwarding",
            StallPolicy::Forwarding => "forwarding",
        };
        writeln!(f, "START OF SIMULATION ({mode})")?;
        writeln!(f, "{rule}")?;

        let mut header = format!("{:<TEXT_COLUMN_WIDTH$}", "CPU Cycles ===>");
        for cycle in 1..=self.clock {
            header += &format!("{cycle:<CYCLE_COLUMN_WIDTH$}");
        }
        writeln!(f, "{}", header.trim_end())?;

        for instr in self.pipeline.rows() {
            let mut row = format!("{:<TEXT_COLUMN_WIDTH$}", instr.printable());
            for cycle in 1..=self.clock {
                row += &format!("{:<CYCLE_COLUMN_WIDTH$}", instr.stage_at(cycle).symbol());
            }
            writeln!(f, "{}", row.trim_end())?;
        }

        writeln!(f)?;
        write!(f, "{}", self.registers)?;
        writeln!(f, "{rule}")?;
        write!(f, "END OF SIMULATION")
    }
}

use std::collections::BTreeMap;
use std::fmt::Display;

use log::{info, warn};

use crate::error::{Result, SimError};

pub const SAVED_REG_COUNT: usize = 8;
pub const TEMP_REG_COUNT: usize = 10;
pub const ZERO_REG: &str = "$zero";

/// Number of registers shown per line when the file is printed
const REGS_PER_LINE: usize = 4;

/// Named integer registers. Only write-back mutates this during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterFile {
    regs: BTreeMap<String, i32>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Creates the `$s0`-`$s7`, `$t0`-`$t9` and `$zero` registers, all zeroed
    pub fn new() -> Self {
        let mut regs = BTreeMap::new();
        regs.insert(ZERO_REG.to_owned(), 0);
        for i in 0..SAVED_REG_COUNT {
            regs.insert(format!("$s{i}"), 0);
        }
        for i in 0..TEMP_REG_COUNT {
            regs.insert(format!("$t{i}"), 0);
        }

        RegisterFile { regs }
    }

    /// Creates a register file holding exactly the given registers
    pub fn with_registers<I, S>(regs: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        RegisterFile {
            regs: regs.into_iter().map(|(name, val)| (name.into(), val)).collect(),
        }
    }

    pub fn read(&self, name: &str) -> Result<i32> {
        self.regs
            .get(name)
            .copied()
            .ok_or_else(|| SimError::UnknownRegister {
                name: name.to_owned(),
            })
    }

    /// Writes `value` to an existing register. Writes to `$zero` are dropped
    pub fn write(&mut self, name: &str, value: i32) -> Result<()> {
        if name == ZERO_REG {
            warn!("Attempted to write {value} to {ZERO_REG}, treating write as NOOP");
            return Ok(());
        }
        match self.regs.get_mut(name) {
            Some(reg) => {
                info!("Wrote {value} to register {name}");
                *reg = value;
                Ok(())
            }
            None => Err(SimError::UnknownRegister {
                name: name.to_owned(),
            }),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regs.contains_key(name)
    }

    /// Iterates over `(name, value)` pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.regs.iter().map(|(name, val)| (name.as_str(), *val))
    }
}

impl Display for RegisterFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown: Vec<String> = self
            .iter()
            .filter(|(name, _)| *name != ZERO_REG)
            .map(|(name, val)| format!("{name} = {val}"))
            .collect();

        for line in shown.chunks(REGS_PER_LINE) {
            let line: Vec<String> = line.iter().map(|reg| format!("{reg:<20}")).collect();
            writeln!(f, "{}", line.concat().trim_end())?;
        }
        Ok(())
    }
}

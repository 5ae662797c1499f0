use std::str::FromStr;

use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Result, SimError};

/// Two-operand integer function applied at write-back
pub type AluFn = fn(i32, i32) -> i32;
/// Two-operand predicate deciding whether a branch is taken
pub type CompareFn = fn(i32, i32) -> bool;

/// What an instruction does when it reaches write-back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    NonBranch,
    Branch,
    Nop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    Add,
    Addi,
    And,
    Andi,
    Or,
    Ori,
    Slt,
    Slti,
    Beq,
    Bne,
    Nop,
}

impl Opcode {
    /// Looks up the opcode for an assembly mnemonic (case-insensitive)
    pub fn from_mnemonic(mnemonic: &str) -> Result<Self> {
        Opcode::from_str(&mnemonic.to_ascii_lowercase()).map_err(|_| {
            SimError::UnsupportedMnemonic {
                mnemonic: mnemonic.to_owned(),
            }
        })
    }

    pub fn class(self) -> OpClass {
        match self {
            Opcode::Beq | Opcode::Bne => OpClass::Branch,
            Opcode::Nop => OpClass::Nop,
            _ => OpClass::NonBranch,
        }
    }

    /// Whether the second source operand is a literal rather than a register
    pub fn takes_immediate(self) -> bool {
        matches!(
            self,
            Opcode::Addi | Opcode::Andi | Opcode::Ori | Opcode::Slti
        )
    }

    /// Result function for register-writing operations
    pub fn alu(self) -> Option<AluFn> {
        let func: AluFn = match self {
            Opcode::Add | Opcode::Addi => add,
            Opcode::And | Opcode::Andi => and,
            Opcode::Or | Opcode::Ori => or,
            Opcode::Slt | Opcode::Slti => set_less_than,
            Opcode::Beq | Opcode::Bne | Opcode::Nop => return None,
        };
        Some(func)
    }

    /// Taken/not-taken predicate for branches
    pub fn compare(self) -> Option<CompareFn> {
        let func: CompareFn = match self {
            Opcode::Beq => equal,
            Opcode::Bne => not_equal,
            _ => return None,
        };
        Some(func)
    }
}

// fixed-width arithmetic, overflow wraps
fn add(lhs: i32, rhs: i32) -> i32 {
    lhs.wrapping_add(rhs)
}

fn and(lhs: i32, rhs: i32) -> i32 {
    lhs & rhs
}

fn or(lhs: i32, rhs: i32) -> i32 {
    lhs | rhs
}

fn set_less_than(lhs: i32, rhs: i32) -> i32 {
    i32::from(lhs < rhs)
}

fn equal(lhs: i32, rhs: i32) -> bool {
    lhs == rhs
}

fn not_equal(lhs: i32, rhs: i32) -> bool {
    lhs != rhs
}

/// Parses an immediate operand. Accepts decimal (optionally signed) and
/// `0x`-prefixed hexadecimal literals
pub fn parse_immediate(operand: &str) -> Result<i32> {
    let text = operand.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|_| SimError::InvalidImmediate {
        operand: operand.to_owned(),
    })?;
    let value = if negative { -magnitude } else { magnitude };

    i32::try_from(value).map_err(|_| SimError::InvalidImmediate {
        operand: operand.to_owned(),
    })
}

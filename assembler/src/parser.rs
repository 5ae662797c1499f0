use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;

use pipeline_vm::instruction::instruction::Instruction;
use pipeline_vm::instruction::opcode::{parse_immediate, OpClass};
use pipeline_vm::system::program::Program;

const COMMENT_CHAR: char = '#';
const REGISTER_PREFIX: char = '$';

static LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<label>[A-Za-z_]\w*)\s*:").unwrap());
static INSTR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<opcode>[A-Za-z]+)(?:\s+(?P<operands>.+))?$").unwrap());
static LABEL_NAME_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]\w*$").unwrap());

/// Parses assembly source into a `Program`. Lines hold an optional `label:`
/// followed by an instruction; `#` starts a comment
pub fn parse_program(source: &str) -> Result<Program> {
    let mut instructions = Vec::new();
    let mut labels: HashMap<String, usize> = HashMap::new();

    for (idx, line) in source.lines().enumerate() {
        let line_num = idx + 1;
        let mut text = strip_comment(line).trim();
        if text.is_empty() {
            continue;
        }

        if let Some(caps) = LABEL_REGEX.captures(text) {
            let label = &caps["label"];
            if let Some(prev) = labels.get(label) {
                return Err(anyhow!(
                    "Line {line_num}: Multiple definitions of label {label}. Previous definition names instruction {prev}"
                ));
            }
            info!("Line {line_num}: Adding {label}->{} to label table", instructions.len());
            labels.insert(label.to_owned(), instructions.len());
            text = text[caps[0].len()..].trim();
            if text.is_empty() {
                continue;
            }
        }

        let instr = parse_instruction(text).with_context(|| format!("Line {line_num}: `{text}`"))?;
        info!("Line {line_num}: Parsed `{instr}`");
        instructions.push(instr);
    }

    Program::new(instructions, labels).context("Invalid program")
}

/// Parses a single instruction such as `add $t0,$t1,$t2` or `bne $t0,$t1,loop`
pub fn parse_instruction(text: &str) -> Result<Instruction> {
    let caps = INSTR_REGEX
        .captures(text.trim())
        .ok_or_else(|| anyhow!("Unable to determine instruction: {text}"))?;
    let mnemonic = caps["opcode"].to_ascii_lowercase();
    let operands: Vec<&str> = caps
        .name("operands")
        .map(|ops| ops.as_str().split(',').map(str::trim).collect())
        .unwrap_or_default();

    let printable = if operands.is_empty() {
        mnemonic.clone()
    } else {
        format!("{mnemonic} {}", operands.join(","))
    };
    let instr = Instruction::new(&mnemonic, &printable)?;

    match instr.opcode().class() {
        OpClass::Nop => {
            expect_operands(&mnemonic, &operands, 0)?;
            Ok(instr)
        }
        OpClass::NonBranch => {
            expect_operands(&mnemonic, &operands, 3)?;
            let (dest, arg1, arg2) = (operands[0], operands[1], operands[2]);
            check_register(dest)?;
            check_register(arg1)?;
            if instr.opcode().takes_immediate() {
                parse_immediate(arg2)?;
            } else {
                check_register(arg2)?;
            }
            Ok(instr.with_destination(dest).with_sources(arg1, arg2))
        }
        OpClass::Branch => {
            expect_operands(&mnemonic, &operands, 3)?;
            let (arg1, arg2, label) = (operands[0], operands[1], operands[2]);
            check_register(arg1)?;
            check_register(arg2)?;
            if !LABEL_NAME_REGEX.is_match(label) {
                return Err(anyhow!("Invalid branch label `{label}`"));
            }
            Ok(instr.with_sources(arg1, arg2).with_target(label))
        }
    }
}

fn strip_comment(line: &str) -> &str {
    line.split(COMMENT_CHAR).next().unwrap_or_default()
}

fn expect_operands(mnemonic: &str, operands: &[&str], count: usize) -> Result<()> {
    if operands.len() != count || operands.iter().any(|op| op.is_empty()) {
        return Err(anyhow!(
            "`{mnemonic}` takes {count} operand(s), found {}",
            operands.len()
        ));
    }
    Ok(())
}

fn check_register(operand: &str) -> Result<()> {
    let valid = operand
        .strip_prefix(REGISTER_PREFIX)
        .is_some_and(|name| !name.is_empty() && name.chars().all(char::is_alphanumeric));
    if valid {
        Ok(())
    } else {
        Err(anyhow!("Expected a register, found `{operand}`"))
    }
}

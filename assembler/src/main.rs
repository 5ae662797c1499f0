#![warn(clippy::all, clippy::pedantic)]

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::info;

use pipeline_assembler::parser::parse_program;
use pipeline_vm::common::Cycle;
use pipeline_vm::config::SimConfig;
use pipeline_vm::pipeline::hazard::StallPolicy;
use pipeline_vm::register::register_system::RegisterFile;
use pipeline_vm::system::system::System;

#[derive(Parser, Debug)]
#[command(version, about = "Prints the five-stage pipeline diagram for a program", long_about = None)]
struct SimArgs {
    program: PathBuf,
    #[arg(long, short, help = "Forward results to dependent instructions instead of stalling")]
    forwarding: bool,
    #[arg(long, short, help = "Stop after this many cycles instead of running to completion")]
    max_cycles: Option<Cycle>,
    #[arg(
        long,
        short,
        value_parser = parse_assignment,
        help = "Seed a register before the run, e.g. --set '$t1=3' (repeatable)"
    )]
    set: Vec<(String, i32)>,
    #[arg(long, default_value = "warn", help = "Log level, overridden by RUST_LOG")]
    log_level: String,
}

impl SimArgs {
    fn config(&self) -> SimConfig {
        let policy = if self.forwarding {
            StallPolicy::Forwarding
        } else {
            StallPolicy::UntilWriteBack
        };
        let config = SimConfig::new(policy);
        match self.max_cycles {
            Some(max) => config.with_max_cycles(max),
            None => config,
        }
    }
}

fn parse_assignment(arg: &str) -> Result<(String, i32)> {
    let (name, val) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("Expected NAME=VALUE, found `{arg}`"))?;
    let val = val
        .trim()
        .parse()
        .with_context(|| format!("Invalid register value `{val}`"))?;
    Ok((name.trim().to_owned(), val))
}

fn read_input(path: &Path) -> Result<String> {
    let path = path
        .canonicalize()
        .with_context(|| format!("Unable to find {}", path.display()))?;
    info!("Reading in file: {}", path.display());
    let data = std::fs::read_to_string(&path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    Ok(data)
}

fn main() -> Result<()> {
    let args = SimArgs::parse();
    let _logger = flexi_logger::Logger::try_with_env_or_str(&args.log_level)?.start()?;

    let source = read_input(&args.program)?;
    let program = parse_program(&source)
        .with_context(|| format!("Failed to parse {}", args.program.display()))?;

    let mut registers = RegisterFile::new();
    for (name, val) in &args.set {
        registers.write(name, *val)?;
    }

    let mut system = System::new(program, args.config()).with_registers(registers);
    // print whatever ran before reporting a failure
    let outcome = system.run();
    println!("{system}");
    outcome?;

    Ok(())
}

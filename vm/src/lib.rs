#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::module_inception)]

pub mod common;
pub mod config;
pub mod error;
pub mod instruction;
pub mod pipeline;
pub mod register;
pub mod system;

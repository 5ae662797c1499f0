#![warn(clippy::all, clippy::pedantic)]

pub mod parser;

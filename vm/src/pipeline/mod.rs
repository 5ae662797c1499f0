pub mod hazard;
pub mod pipeline;

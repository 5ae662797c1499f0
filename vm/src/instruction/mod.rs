pub mod instruction;
pub mod opcode;

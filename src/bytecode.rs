pub mod builder;
pub mod data;
pub mod disasm;
pub mod opcode;

pub use builder::{BytecodeBuilder, ConstantPool, Instruction};
pub use data::{BcData, Tag};
pub use opcode::Opcode;

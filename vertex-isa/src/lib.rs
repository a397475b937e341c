//! The Vertex CPU instruction set: the microprogram table that is the
//! single source of truth for both the assembler's opcode lookup and the
//! control-ROM generator's rasterisation of that table into memory.

pub mod control;
pub mod error;
pub mod instruction;
pub mod rom;
pub mod table;

use std::collections::HashMap;
use std::sync::OnceLock;

pub use error::IsaError;
pub use instruction::{FlagScope, Instruction, Scope};

/// The built instruction table together with a name → opcode index,
/// for O(1) mnemonic resolution by the assembler.
pub struct InstructionSet {
    instructions: Vec<Instruction>,
    by_name: HashMap<&'static str, u8>,
}

impl InstructionSet {
    fn build() -> Result<Self, IsaError> {
        let instructions = table::build();
        if instructions.len() > table::MAX_INSTRUCTIONS {
            return Err(IsaError::TooManyInstructions { count: instructions.len() });
        }

        let by_name = instructions
            .iter()
            .enumerate()
            .map(|(opcode, instr)| (instr.name, opcode as u8))
            .collect();

        Ok(InstructionSet { instructions, by_name })
    }

    /// All instructions, ordered by opcode.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Resolve a mnemonic to its opcode byte.
    pub fn opcode(&self, name: &str) -> Result<u8, IsaError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| IsaError::UnknownInstruction { name: name.to_string() })
    }

    /// Look up an instruction by its already-resolved opcode.
    pub fn by_opcode(&self, opcode: u8) -> Option<&Instruction> {
        self.instructions.get(opcode as usize)
    }

    /// Rasterise this instruction set into the 65536-entry control ROM.
    pub fn control_rom(&self) -> Vec<u32> {
        rom::build_control_rom(&self.instructions)
    }
}

static INSTRUCTION_SET: OnceLock<InstructionSet> = OnceLock::new();

/// The process-wide instruction set, built once and shared.
pub fn instruction_set() -> &'static InstructionSet {
    INSTRUCTION_SET.get_or_init(|| InstructionSet::build().expect("instruction table is statically valid"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_known_mnemonics() {
        let set = instruction_set();
        assert!(set.opcode("NOP").is_ok());
        assert!(set.opcode("HLT").is_ok());
        assert_eq!(set.opcode("NOP").unwrap(), 0);
    }

    #[test]
    fn rejects_unknown_mnemonics() {
        let set = instruction_set();
        assert_eq!(
            set.opcode("NOTAREALOPCODE"),
            Err(IsaError::UnknownInstruction { name: "NOTAREALOPCODE".to_string() })
        );
    }

    #[test]
    fn by_opcode_round_trips_with_opcode() {
        let set = instruction_set();
        let opcode = set.opcode("HLT").unwrap();
        assert_eq!(set.by_opcode(opcode).unwrap().name, "HLT");
    }
}

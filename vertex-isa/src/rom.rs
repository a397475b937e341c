//! Rasterises the instruction table into the CPU's control ROM.

use tracing::info;

use crate::instruction::Instruction;
use crate::table::invalid_conditional_jump;

/// Number of addressable control-ROM entries: 65536, matching the
/// hardware's 16-bit control-store address bus.
pub const ROM_ENTRIES: usize = 1 << 16;

/// Build the 65536-entry control ROM for the given instruction table.
///
/// `addr = (flag_state << 12) | (opcode << 4) | microstep`. For each flag
/// state, an instruction's microprogram is installed if its flag scope is
/// satisfied by that state; otherwise the invalid-conditional-jump
/// no-op is installed so the program counter still advances correctly
/// past a two-byte immediate it can't act on.
pub fn build_control_rom(table: &[Instruction]) -> Vec<u32> {
    let mut rom = vec![0u32; ROM_ENTRIES];
    let invalid = invalid_conditional_jump();

    for flag_state in 0u8..8 {
        for (opcode, instruction) in table.iter().enumerate() {
            let microprogram = if instruction.scope.matches(flag_state) {
                &instruction.microprogram
            } else {
                &invalid
            };

            let base = ((flag_state as usize) << 12) | (opcode << 4);
            for (step, word) in microprogram.iter().enumerate() {
                rom[base + step] = *word;
            }
        }
    }

    info!(entries = rom.len(), "built control ROM");
    rom
}

/// Serialise a control ROM as little-endian `u32` words, as written to
/// the 256 KiB ROM image file.
pub fn control_rom_bytes(rom: &[u32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(rom.len() * 4);
    for word in rom {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

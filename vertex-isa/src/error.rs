//! Error types for the instruction set crate.

use thiserror::Error;

/// Failures that can occur while building or looking up in the
/// instruction table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IsaError {
    /// The instruction table grew past the 256-entry opcode space.
    #[error("instruction table has {count} entries, exceeding the 256-opcode limit")]
    TooManyInstructions {
        /// Number of instructions that were built.
        count: usize,
    },

    /// No instruction with this name exists in the table (e.g. an
    /// unsupported register-to-register move, or an unknown mnemonic).
    #[error("no such instruction: {name}")]
    UnknownInstruction {
        /// The mnemonic that failed to resolve.
        name: String,
    },
}

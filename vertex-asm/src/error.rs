//! Error types for the assembler.

use thiserror::Error;
use vertex_isa::IsaError;

/// Failures that can occur while assembling a [`crate::ast::Program`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AsmError {
    /// A mnemonic built from an instruction's family and operands does not
    /// exist in the instruction table (unsupported operand combination,
    /// or a mnemonic the table never defines).
    #[error("unrecognised instruction encoding: {0}")]
    UnknownInstruction(#[from] IsaError),

    /// A label was referenced but never defined locally and not present
    /// among the supplied imports.
    #[error("unresolved label: {0}")]
    UnresolvedLabel(String),

    /// An export was requested for a label that was never defined.
    #[error("cannot export undefined routine: {0}")]
    UnresolvedExport(String),

    /// The placed program does not fit in the 64 KiB address space.
    #[error("program of {len} bytes does not fit at base {base:#06x}")]
    ProgramTooLarge { base: u16, len: usize },

    /// An operand of the wrong kind was given for its position (e.g. a
    /// register where only a label or address is accepted).
    #[error("invalid operand {operand}: expected {expected}")]
    InvalidOperand { operand: String, expected: &'static str },
}

//! `CompileError`: the single error category for all source-visible
//! compilation failures, plus the lower-level assembler error it wraps
//! when a module is assembled.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    // --- Type errors ---
    #[error("lvalue of type {lvalue} cannot be assigned an expression of type {expression}")]
    AssignmentTypeMismatch { lvalue: String, expression: String },

    #[error("cannot project field of non-data type {found}")]
    NotAData { found: String },

    #[error("cannot index non-array type {found}")]
    NotAnArray { found: String },

    #[error("cannot dereference non-reference type {found}")]
    NotAReference { found: String },

    #[error("shift amount must be [8], found {found}")]
    WrongShiftAmountWidth { found: String },

    #[error("logical/bitwise operands of differing widths: {left} vs {right}")]
    OperandWidthMismatch { left: String, right: String },

    #[error("call to {routine} expected argument of type {expected} in position {position}, found {found}")]
    CallArgumentMismatch { routine: String, position: usize, expected: String, found: String },

    #[error("return expression of type {found} does not match routine {routine}'s return type {expected}")]
    ReturnTypeMismatch { routine: String, expected: String, found: String },

    #[error("index expression must be [8], found {found}")]
    WrongIndexWidth { found: String },

    #[error("condition must be [8], found {found}")]
    WrongConditionWidth { found: String },

    // --- Name errors ---
    #[error("reference to unknown variable: {name}")]
    UnknownVariable { name: String },

    #[error("reference to unknown routine: {name}")]
    UnknownRoutine { name: String },

    #[error("reference to unknown data type: {name}")]
    UnknownDataType { name: String },

    #[error("{data} has no field {field}")]
    UnknownField { data: String, field: String },

    #[error("routine {name} is declared more than once")]
    RoutineRedeclared { name: String },

    // --- Structural errors ---
    #[error("data type {data} cannot directly contain a field of its own type ({field})")]
    DirectSelfReference { data: String, field: String },

    #[error("literal width must be 0, 8, or 16, found {width}")]
    InvalidLiteralWidth { width: u16 },

    // --- Unimplemented ---
    #[error("16-bit shift is not implemented")]
    Unimplemented16BitShift,

    #[error("16-bit logical operations are not implemented")]
    Unimplemented16BitLogical,

    #[error("argument count mismatch calling {routine}: expected {expected}, found {found}")]
    ArgumentCountMismatch { routine: String, expected: usize, found: usize },

    #[error("non-base cast must preserve size exactly: {from} is not the same size as {to}")]
    CastSizeMismatch { from: String, to: String },
}

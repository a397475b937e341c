//! Storn: the high-level language compiler for the Vertex toolchain.
//!
//! The code generator consumes a pre-built [`ast::Program`] and never
//! parses text itself; a front end that builds this tree (e.g.
//! `vertex-cli`) is free to swap its grammar without touching this crate.
//! Output is Vtx assembly text (`codegen::Compiled::instructions`), fed
//! back through a Vtx front end and then `vertex-asm` to produce bytes.

pub mod ast;
pub mod codegen;
pub mod error;
pub mod routine;
pub mod types;

pub use codegen::{CodeGenerator, Compiled, GLOBAL_BASE};
pub use error::CompileError;
pub use routine::{layout_locals, layout_parameters, resolve_type_expr, Routine, RoutineTable};
pub use types::{build_data_type, DataTable, Fields, Type};

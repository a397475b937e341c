//! The Vertex toolchain's command-line front ends: hand-written parsers for
//! Storn and Vtx source text, the driver that wires them to
//! `vertex-storn`/`vertex-asm`, and the `storn`/`vtx`/`vertex-microcode`
//! binaries built on top of it.

pub mod driver;
pub mod error;
pub mod lexer;
pub mod peripheral;
pub mod storn_parser;
pub mod vtx_parser;

pub use error::{CliError, ParseError};

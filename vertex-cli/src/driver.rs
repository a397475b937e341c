//! Shared compile/assemble orchestration behind the `storn` and `vtx`
//! binaries. Mirrors the original driver scripts' pipeline shape: parse
//! source text, run the relevant compiler/assembler stage, and return a
//! placed ROM image alongside anything the caller asked to export.

use tracing::info;
use vertex_asm::{assemble, AssembledModule, ModuleInterchange};
use vertex_storn::CodeGenerator;

use crate::error::CliError;
use crate::{storn_parser, vtx_parser};

/// The result of a full `storn` build: the placed bytes plus the
/// intermediate Vtx assembly text, in case the caller asked to keep it.
pub struct StornBuild {
    pub module: AssembledModule,
    pub assembly: String,
}

/// Compile Storn source to Vtx assembly, re-parse that assembly, and
/// assemble it into a placed byte image. Mirrors `compile_storn.py`'s
/// `compile()`: parse, generate, reparse, assemble, in that order. Every
/// declared routine is requested as an export (its label is the
/// upper-cased routine name), matching the original driver's always-on
/// export bookkeeping; the caller decides whether to write it anywhere.
pub fn build_storn(source: &str, imports: &ModuleInterchange, start_address: Option<u16>) -> Result<StornBuild, CliError> {
    let program = storn_parser::parse(source).map_err(|e| CliError::Parse(e, "Storn source"))?;
    let compiled = CodeGenerator::new().compile(&program)?;
    let assembly = compiled.instructions.join("\n");
    let exports_wanted: Vec<String> = compiled.routine_table.keys().map(|name| name.to_uppercase()).collect();

    let vtx_program = vtx_parser::parse(&assembly).map_err(|e| CliError::Parse(e, "generated Vtx assembly"))?;
    let module = assemble(&vtx_program, imports, &exports_wanted, start_address)?;

    info!(bytes = module.bytes.len(), base = module.base, "built Storn module");
    Ok(StornBuild { module, assembly })
}

/// Assemble Vtx source text directly, with no Storn stage and no
/// import/export linking — the simpler path the `vtx` binary takes.
pub fn build_vtx(source: &str, start_address: Option<u16>) -> Result<AssembledModule, CliError> {
    let program = vtx_parser::parse(source).map_err(|e| CliError::Parse(e, "Vtx source"))?;
    let module = assemble(&program, &ModuleInterchange::empty(), &[], start_address)?;
    info!(bytes = module.bytes.len(), base = module.base, "assembled Vtx module");
    Ok(module)
}

/// Render an assembled module's exports as an interchange document, ready
/// to serialize with `serde_yaml`. Global and data sections are left empty
/// here: the driver binaries only ever export routine entry points.
pub fn exports_document(module: &AssembledModule) -> ModuleInterchange {
    let mut doc = ModuleInterchange::empty();
    for (name, address) in &module.exports {
        doc.routines.insert(name.clone(), vertex_asm::RoutineEntry { address: *address });
    }
    doc
}

pub fn load_imports(text: &str) -> Result<ModuleInterchange, CliError> {
    ModuleInterchange::from_yaml(text).map_err(CliError::Imports)
}

pub fn render_exports(doc: &ModuleInterchange) -> Result<String, CliError> {
    doc.to_yaml().map_err(CliError::Exports)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROGRAM: &str = r#"
routine entry ( ) [0] { } {
  output 1:8.
  return.
}
"#;

    #[test]
    fn builds_a_minimal_storn_program_end_to_end() {
        let build = build_storn(PROGRAM, &ModuleInterchange::empty(), Some(0x8000)).unwrap();
        assert_eq!(build.module.base, 0x8000);
        assert!(!build.module.bytes.is_empty());
        assert!(build.assembly.contains("jmp ENTRY"));
    }

    #[test]
    fn exports_every_declared_routine() {
        let build = build_storn(PROGRAM, &ModuleInterchange::empty(), Some(0x8000)).unwrap();
        assert!(build.module.exports.contains_key("ENTRY"));
    }

    #[test]
    fn builds_vtx_source_without_a_storn_stage() {
        let module = build_vtx("ENTRY:\n  nop\n  hlt\n", Some(0x0100)).unwrap();
        assert_eq!(module.base, 0x0100);
        assert_eq!(module.bytes.len(), 2);
    }

    #[test]
    fn rejects_malformed_imports_yaml() {
        let err = load_imports(": not yaml").unwrap_err();
        assert!(matches!(err, CliError::Imports(_)));
    }
}

//! Driver-level integration tests for the six canonical Storn programs:
//! each compiles, reassembles, and produces a placed ROM image with the
//! expected emitted mnemonics. This crate has no CPU emulator (out of
//! scope per the peripheral contract), so these check the generated
//! assembly and byte count rather than executed `out`/`hlt` behaviour.

use vertex_asm::ModuleInterchange;
use vertex_cli::driver::build_storn;

fn build(source: &str) -> vertex_cli::driver::StornBuild {
    build_storn(source, &ModuleInterchange::empty(), Some(0x8000)).expect("source should compile and assemble")
}

#[test]
fn empty_entry_halts_with_no_output() {
    let build = build("routine entry ( ) [0] { } { return. }");
    assert!(build.assembly.contains("hlt"));
    assert!(!build.assembly.contains("out"));
    assert!(!build.module.bytes.is_empty());
}

#[test]
fn a_single_literal_output_pushes_and_emits_the_value() {
    let build = build("routine entry ( ) [0] { } { output 42:8. return. }");
    assert!(build.assembly.contains("psh 42"));
    assert!(build.assembly.contains("out"));
}

#[test]
fn calling_a_routine_with_arguments_emits_a_call_and_both_prologues() {
    let source = "routine add ( x: [8], y: [8] ) [8] { } { return x + y. } \
                  routine entry ( ) [0] { } { output add(3:8, 4:8). return. }";
    let build = build(source);
    assert!(build.assembly.contains("cal ADD"));
    assert!(build.assembly.contains("ADD:"));
    assert!(build.assembly.contains("ENTRY:"));
}

#[test]
fn a_data_field_projection_reads_and_writes_through_a_global() {
    let source = "data pair { a: [8], b: [8] } \
                  p: pair. \
                  routine entry ( ) [0] { } { set p/b = 9:8. output p/b. return. }";
    let build = build(source);
    assert!(build.assembly.contains("psh 9"));
    assert!(build.assembly.contains("out"));
}

#[test]
fn an_array_index_assignment_round_trips_through_output() {
    let source = "xs: [8] ^ 3. \
                  routine entry ( ) [0] { } { set xs@2:8 = 77:8. output xs@2:8. return. }";
    let build = build(source);
    assert!(build.assembly.contains("psh 77"));
    assert!(build.assembly.contains("out"));
}

#[test]
fn a_counting_loop_with_a_guarded_break_compiles_to_a_labelled_loop() {
    let source = "routine entry ( ) [0] { i: [8]. } { \
                  set i = 0:8. \
                  loop { \
                      if i = 3:8 { break. } \
                      output i. \
                      set i = i + 1:8. \
                  } \
                  return. \
                  }";
    let build = build(source);
    assert!(build.assembly.contains("jmp zf L"));
    assert!(build.assembly.contains("out"));
    assert!(build.assembly.matches("L0:").count() >= 1);
}

//! Builds the full instruction table.
//!
//! Mirrors the original tool's `instructions.py`: families of related
//! opcodes (register/immediate/indirect arithmetic, register-to-register
//! moves, push/pop, …) are generated by cartesian products over operand
//! sets rather than hand-expanded one at a time. The order instructions
//! are pushed in fixes their opcode (index into the returned `Vec`), so it
//! must never change once published.

use itertools::iproduct;

use crate::control::*;
use crate::instruction::{FlagScope, Instruction, Scope};

/// Maximum number of instructions representable by an 8-bit opcode.
pub const MAX_INSTRUCTIONS: usize = 256;

fn reg_out(name: &str) -> ControlWord {
    match name {
        "A" => AO,
        "B" => BO,
        "C" => CO,
        "H" => HO,
        "L" => LO,
        "BPH" => BPHO,
        "BPL" => BPLO,
        "SPH" => SPHO,
        "SPL" => SPLO,
        "S" => SO,
        other => panic!("unknown register-out source {other}"),
    }
}

fn reg_in(name: &str) -> ControlWord {
    match name {
        "A" => AI,
        "B" => BI,
        "C" => CI,
        "H" => HI,
        "L" => LI,
        "BPH" => BPHI,
        "BPL" => BPLI,
        "SPH" => SPHI,
        "SPL" => SPLI,
        "S" => SI,
        other => panic!("unknown register-in destination {other}"),
    }
}

fn alu_op(name: &str) -> ControlWord {
    match name {
        "ADD" => ADD,
        "ADDC" => ADDC,
        "SUB" => SUB,
        "SUBC" => SUBC,
        "AND" => AND,
        "OR" => OR,
        "XOR" => XOR,
        "INC" => INC,
        "INCC" => INCC,
        "DEC" => DEC,
        "DECC" => DECC,
        "SHL" => SHL,
        "SHLC" => SHLC,
        "SHR" => SHR,
        "SHRC" => SHRC,
        other => panic!("unknown ALU op {other}"),
    }
}

fn leak(name: String) -> &'static str {
    Box::leak(name.into_boxed_str())
}

/// Build the complete, ordered instruction table. Index == opcode.
pub fn build() -> Vec<Instruction> {
    let mut table = Vec::new();

    // NOP
    table.push(Instruction::fetched("NOP", vec![], FlagScope::UNCONDITIONAL));

    // INTCAL: fixed low opcode, bespoke fetch sequence, not exposed in assembly.
    table.push(Instruction::raw(
        "INTCAL",
        vec![STD | MAS, CNHO | RI, STD | MAS, CNLO | RI, MCI, MAC, RO | II | RST],
        FlagScope::UNCONDITIONAL,
    ));
    // INTRET: exposed, standard fetch prefix.
    table.push(Instruction::fetched(
        "INTRET",
        vec![IEN | MAS, STI | CNLI | RO, MAS, STI | CNHI | RO, RST],
        FlagScope::UNCONDITIONAL,
    ));

    // ALU, register source.
    for (source, op) in iproduct!(["B", "C", "H", "L"], ["ADD", "ADDC", "SUB", "SUBC", "AND", "OR", "XOR"]) {
        let name = leak(format!("{op}{source}"));
        table.push(Instruction::fetched(
            name,
            vec![reg_out(source) | ATI, alu_op(op) | AI, RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // ALU, immediate source.
    for op in ["ADD", "ADDC", "SUB", "SUBC", "AND", "OR", "XOR"] {
        let name = leak(format!("{op}I"));
        table.push(Instruction::fetched(
            name,
            vec![CNI | ADI | RO | ATI, alu_op(op) | AI, RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // ALU, 16-bit address-indirect source (no carry forms).
    for op in ["ADD", "SUB", "AND", "OR", "XOR"] {
        let name = leak(format!("{op}@"));
        table.push(Instruction::fetched(
            name,
            vec![
                CNI | ADI | RO | ATI,
                CNI | ADI | RO | ALI,
                ATO | AHI,
                RO | ATI,
                alu_op(op) | AI,
            ],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // Unary ALU.
    for op in ["INC", "INCC", "DEC", "DECC", "SHL", "SHR", "SHLC", "SHRC"] {
        table.push(Instruction::fetched(op, vec![alu_op(op) | AI, RST | CNI], FlagScope::UNCONDITIONAL));
    }

    // LDR, immediate.
    for dest in ["A", "B", "C", "H", "L"] {
        let name = leak(format!("LDR{dest}I"));
        table.push(Instruction::fetched(
            name,
            vec![CNI | ADI | RO | reg_in(dest), RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // LDR, 16-bit address.
    for dest in ["A", "B", "C", "H", "L"] {
        let name = leak(format!("LDR{dest}@"));
        table.push(Instruction::fetched(
            name,
            vec![
                CNI | ADI | RO | ATI,
                CNI | ADI | RO | ALI,
                ATO | AHI,
                RO | reg_in(dest),
                RST | CNI,
            ],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // LDR, indirect through M (H:L).
    for dest in ["A", "B", "C", "H", "L"] {
        let name = leak(format!("LDR{dest}M"));
        table.push(Instruction::fetched(
            name,
            vec![HO | AHI, LO | ALI, RO | reg_in(dest), RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // Register-to-register moves. The valid (dest, source) pairs are
    // asymmetric, matching the instruction set's wiring.
    let ldr_pairs: &[(&str, &[&str])] = &[
        ("A", &["B", "C", "H", "L", "BPL", "BPH", "SPL", "SPH"]),
        ("B", &["A", "C", "H", "L"]),
        ("C", &["A", "B", "H", "L"]),
        ("L", &["A", "B", "C", "H"]),
        ("H", &["A", "B", "C", "L"]),
        ("BPL", &["A", "SPL"]),
        ("BPH", &["A", "SPH"]),
        ("SPL", &["A", "BPL"]),
        ("SPH", &["A", "BPH"]),
    ];
    for (dest, sources) in ldr_pairs {
        for source in *sources {
            let name = leak(format!("LDR{dest}{source}"));
            table.push(Instruction::fetched(
                name,
                vec![reg_out(source) | reg_in(dest), RST | CNI],
                FlagScope::UNCONDITIONAL,
            ));
        }
    }

    // STR, 16-bit address.
    for source in ["A", "B", "C", "H", "L"] {
        let name = leak(format!("STR@{source}"));
        table.push(Instruction::fetched(
            name,
            vec![
                CNI | ADI | RO | ATI,
                CNI | ADI | RO | ALI,
                ATO | AHI,
                reg_out(source) | RI,
                RST | CNI,
            ],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // STR, indirect through M.
    for source in ["A", "B", "C", "H", "L"] {
        let name = leak(format!("STRM{source}"));
        table.push(Instruction::fetched(
            name,
            vec![HO | AHI, LO | ALI, reg_out(source) | RI, RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // Conditional jumps to a 16-bit immediate.
    let conditions: &[(&str, FlagScope)] = &[
        ("JZFI", FlagScope { zero: Scope::High, sign: Scope::Any, carry: Scope::Any }),
        ("JNZFI", FlagScope { zero: Scope::Low, sign: Scope::Any, carry: Scope::Any }),
        ("JSFI", FlagScope { zero: Scope::Any, sign: Scope::High, carry: Scope::Any }),
        ("JNSFI", FlagScope { zero: Scope::Any, sign: Scope::Low, carry: Scope::Any }),
        ("JCFI", FlagScope { zero: Scope::Any, sign: Scope::Any, carry: Scope::High }),
        ("JNCFI", FlagScope { zero: Scope::Any, sign: Scope::Any, carry: Scope::Low }),
    ];
    for (name, scope) in conditions {
        table.push(Instruction::fetched(name, jump_immediate(), *scope));
    }

    // Unconditional jumps.
    table.push(Instruction::fetched("JI", jump_immediate(), FlagScope::UNCONDITIONAL));
    table.push(Instruction::fetched("JM", jump_m(), FlagScope::UNCONDITIONAL));

    // Stack: push.
    table.push(Instruction::fetched(
        "PSHI",
        vec![CNI | ADI | RO | ATI, STD | MAS, ATO | RI, RST | CNI],
        FlagScope::UNCONDITIONAL,
    ));
    for source in ["A", "B", "C", "H", "L", "BPH", "BPL", "S"] {
        let name = leak(format!("PSH{source}"));
        table.push(Instruction::fetched(
            name,
            vec![STD | MAS, reg_out(source) | RI, RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }
    table.push(Instruction::fetched(
        "PSH@",
        vec![
            CNI | ADI | RO | ATI,
            CNI | ADI | RO | ALI,
            ATO | ALI,
            STD | RO | ATI | MAS,
            ATO | RI,
            RST | CNI,
        ],
        FlagScope::UNCONDITIONAL,
    ));

    // Stack: pop.
    for dest in ["A", "B", "C", "H", "L", "BPH", "BPL", "S"] {
        let name = leak(format!("POP{dest}"));
        table.push(Instruction::fetched(
            name,
            vec![MAS, STI | reg_in(dest) | RO, RST | CNI],
            FlagScope::UNCONDITIONAL,
        ));
    }

    // Call.
    table.push(Instruction::fetched(
        "CAL",
        vec![
            CNI | ADI | RO | ATI,
            CNI | ADI | RO | AI,
            CNI | STD | MAS,
            CNHO | RI,
            STD | MAS,
            CNLO | RI,
            ATO | CNHI,
            AO | CNLI,
            RST,
        ],
        FlagScope::UNCONDITIONAL,
    ));

    // Misc.
    table.push(Instruction::fetched("IEN", vec![IEN, RST | CNI], FlagScope::UNCONDITIONAL));
    table.push(Instruction::fetched("OUT", vec![AO | OUT, RST | CNI], FlagScope::UNCONDITIONAL));
    table.push(Instruction::fetched("HLT", vec![HLT], FlagScope::UNCONDITIONAL));

    table
}

/// The microprogram substituted for a conditional-jump opcode whose flag
/// scope is not satisfied by the current flag state: it advances the
/// program counter past the two-byte immediate operand without jumping.
pub fn invalid_conditional_jump() -> Vec<ControlWord> {
    vec![MAC, RO | II, CNI, CNI, RST | CNI]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_fits_in_one_byte_opcode_space() {
        let table = build();
        assert!(table.len() <= MAX_INSTRUCTIONS, "{} instructions exceeds opcode space", table.len());
        assert_eq!(table.len(), 137);
    }

    #[test]
    fn names_are_unique() {
        let table = build();
        let mut seen = std::collections::HashSet::new();
        for instr in &table {
            assert!(seen.insert(instr.name), "duplicate instruction name {}", instr.name);
        }
    }

    #[test]
    fn intcal_has_bespoke_prefix_others_share_fetch_cycle() {
        let table = build();
        let intcal = table.iter().find(|i| i.name == "INTCAL").unwrap();
        assert_ne!(&intcal.microprogram[..2], &[MAC, RO | II]);

        let nop = table.iter().find(|i| i.name == "NOP").unwrap();
        assert_eq!(&nop.microprogram[..2], &[MAC, RO | II]);
    }

    #[test]
    fn conditional_jump_scopes_are_exclusive() {
        let table = build();
        let jzfi = table.iter().find(|i| i.name == "JZFI").unwrap();
        let jnzfi = table.iter().find(|i| i.name == "JNZFI").unwrap();
        assert!(jzfi.scope.matches(0b001));
        assert!(!jnzfi.scope.matches(0b001));
        assert!(!jzfi.scope.matches(0b000));
        assert!(jnzfi.scope.matches(0b000));
    }

    #[test]
    fn register_move_pairs_are_asymmetric() {
        let table = build();
        assert!(table.iter().any(|i| i.name == "LDRAB"));
        assert!(!table.iter().any(|i| i.name == "LDRBBPL"));
    }
}

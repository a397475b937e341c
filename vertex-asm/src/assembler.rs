//! The two-pass Vtx assembler: a single walk that emits bytes and records
//! label offsets, followed by a fix-up pass that resolves labels (and
//! imported routine addresses) against a base placement address.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::ast::{Instr, JumpCondition, Line, Operand, Program, Register};
use crate::error::AsmError;
use crate::interchange::ModuleInterchange;

/// One emitted byte: either already known, or a placeholder waiting on
/// label resolution. A label reference always occupies two consecutive
/// slots — `LabelHigh` followed by `SentinelLow` — mirroring the
/// high-byte/low-byte order every address operand is read in.
enum Slot {
    Value(u8),
    LabelHigh(String),
    SentinelLow,
}

/// The result of assembling one module: the placed byte image, the base
/// address it was placed at, and the absolute addresses of its exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledModule {
    pub bytes: Vec<u8>,
    pub base: u16,
    pub exports: HashMap<String, u16>,
}

fn address_slots(operand: &Operand) -> Result<Vec<Slot>, AsmError> {
    match operand {
        Operand::Address(addr) => Ok(vec![Slot::Value((addr >> 8) as u8), Slot::Value((addr & 0xFF) as u8)]),
        Operand::Label(name) => Ok(vec![Slot::LabelHigh(name.clone()), Slot::SentinelLow]),
        other => Err(invalid_operand(other, "a label or 16-bit address")),
    }
}

fn invalid_operand(operand: &Operand, expected: &'static str) -> AsmError {
    AsmError::InvalidOperand { operand: format!("{operand:?}"), expected }
}

/// Build the concrete opcode mnemonic and operand bytes for one
/// instruction. The mnemonic is looked up against the instruction table by
/// the caller; an unsupported family/operand combination (e.g. a carry
/// suffix on an address-indirect ALU op) simply fails to resolve there.
fn encode(instr: &Instr) -> Result<(String, Vec<Slot>), AsmError> {
    Ok(match instr {
        Instr::Load { dst, src } => match src {
            Operand::Immediate(v) => (format!("LDR{}I", dst.mnemonic()), vec![Slot::Value(*v)]),
            Operand::Address(_) | Operand::Label(_) => (format!("LDR{}@", dst.mnemonic()), address_slots(src)?),
            Operand::Indirect => (format!("LDR{}M", dst.mnemonic()), vec![]),
            Operand::Register(src_reg) => (format!("LDR{}{}", dst.mnemonic(), src_reg.mnemonic()), vec![]),
        },
        Instr::Store { src, dst } => match dst {
            Operand::Address(_) | Operand::Label(_) => (format!("STR@{}", src.mnemonic()), address_slots(dst)?),
            Operand::Indirect => (format!("STRM{}", src.mnemonic()), vec![]),
            other => return Err(invalid_operand(other, "M or a 16-bit address")),
        },
        Instr::Push(operand) => match operand {
            Operand::Immediate(v) => ("PSHI".to_string(), vec![Slot::Value(*v)]),
            Operand::Register(reg) => (format!("PSH{}", reg.mnemonic()), vec![]),
            Operand::Address(_) | Operand::Label(_) => ("PSH@".to_string(), address_slots(operand)?),
            Operand::Indirect => return Err(invalid_operand(operand, "a register, immediate, or address")),
        },
        Instr::Pop(dst) => (format!("POP{}", dst.mnemonic()), vec![]),
        Instr::Arithmetic { op, src, carry } => {
            let base = op.mnemonic();
            match src {
                Operand::Register(reg) => {
                    let name = if *carry { format!("{base}C{}", reg.mnemonic()) } else { format!("{base}{}", reg.mnemonic()) };
                    (name, vec![])
                }
                Operand::Immediate(v) => {
                    let name = if *carry { format!("{base}CI") } else { format!("{base}I") };
                    (name, vec![Slot::Value(*v)])
                }
                Operand::Address(_) | Operand::Label(_) => {
                    let name = if *carry { format!("{base}C@") } else { format!("{base}@") };
                    (name, address_slots(src)?)
                }
                Operand::Indirect => return Err(invalid_operand(src, "a register, immediate, or address")),
            }
        }
        Instr::Unary { op, carry } => {
            let base = op.mnemonic();
            let name = if *carry { format!("{base}C") } else { base.to_string() };
            (name, vec![])
        }
        Instr::Jump { cond, target } => match target {
            Operand::Indirect => {
                if *cond != JumpCondition::None {
                    return Err(invalid_operand(target, "a label (M only supports unconditional jumps)"));
                }
                ("JM".to_string(), vec![])
            }
            Operand::Address(_) | Operand::Label(_) => {
                let name = match cond {
                    JumpCondition::None => "JI",
                    JumpCondition::Zf => "JZFI",
                    JumpCondition::Nzf => "JNZFI",
                    JumpCondition::Sf => "JSFI",
                    JumpCondition::Nsf => "JNSFI",
                    JumpCondition::Cf => "JCFI",
                    JumpCondition::Ncf => "JNCFI",
                };
                (name.to_string(), address_slots(target)?)
            }
            other => return Err(invalid_operand(other, "M or a label")),
        },
        Instr::Call(operand) => ("CAL".to_string(), address_slots(operand)?),
        Instr::Not => ("NOT".to_string(), vec![]),
        Instr::IntRet => ("INTRET".to_string(), vec![]),
        Instr::Out => ("OUT".to_string(), vec![]),
        Instr::Halt => ("HLT".to_string(), vec![]),
        Instr::Nop => ("NOP".to_string(), vec![]),
        Instr::Ien => ("IEN".to_string(), vec![]),
    })
}

/// Assemble a program against an optional base address, a set of imported
/// routine addresses, and a set of routine names to export.
pub fn assemble(
    program: &Program,
    imports: &ModuleInterchange,
    exports_wanted: &[String],
    start_address: Option<u16>,
) -> Result<AssembledModule, AsmError> {
    let isa = vertex_isa::instruction_set();
    let mut slots: Vec<Slot> = Vec::new();
    let mut label_offset: HashMap<String, u16> = HashMap::new();

    for line in &program.lines {
        match line {
            Line::Label(name) => {
                if label_offset.contains_key(name) {
                    warn!(label = %name, "duplicate label definition; keeping first occurrence");
                } else {
                    label_offset.insert(name.clone(), slots.len() as u16);
                }
            }
            Line::Instruction(instr) => {
                let (name, operand_slots) = encode(instr)?;
                let opcode = isa.opcode(&name)?;
                debug!(mnemonic = %name, opcode, offset = slots.len(), "emitting instruction");
                slots.push(Slot::Value(opcode));
                slots.extend(operand_slots);
            }
        }
    }

    let base = start_address.unwrap_or_else(|| (1usize << 16).wrapping_sub(slots.len()) as u16);
    if base as usize + slots.len() > 1 << 16 {
        return Err(AsmError::ProgramTooLarge { base, len: slots.len() });
    }

    let mut bytes = vec![0u8; slots.len()];
    let mut i = 0;
    while i < slots.len() {
        match &slots[i] {
            Slot::Value(v) => {
                bytes[i] = *v;
                i += 1;
            }
            Slot::LabelHigh(name) => {
                let addr = resolve_label(name, &label_offset, imports, base)?;
                bytes[i] = (addr >> 8) as u8;
                match slots.get(i + 1) {
                    Some(Slot::SentinelLow) => bytes[i + 1] = (addr & 0xFF) as u8,
                    _ => unreachable!("label slot not followed by its sentinel low byte"),
                }
                i += 2;
            }
            Slot::SentinelLow => unreachable!("sentinel low byte without a preceding label slot"),
        }
    }

    let mut exports = HashMap::new();
    for name in exports_wanted {
        let offset = label_offset.get(name).ok_or_else(|| AsmError::UnresolvedExport(name.clone()))?;
        exports.insert(name.clone(), base.wrapping_add(*offset));
    }

    info!(bytes = bytes.len(), base, exports = exports.len(), "assembled module");
    Ok(AssembledModule { bytes, base, exports })
}

fn resolve_label(
    name: &str,
    label_offset: &HashMap<String, u16>,
    imports: &ModuleInterchange,
    base: u16,
) -> Result<u16, AsmError> {
    if let Some(offset) = label_offset.get(name) {
        Ok(base.wrapping_add(*offset))
    } else if let Some(entry) = imports.routines.get(name) {
        Ok(entry.address)
    } else {
        Err(AsmError::UnresolvedLabel(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ArithOp as Op, Instr as I, Line as Ln, Operand as Opd};

    fn reg(name: &str) -> Register {
        match name {
            "A" => Register::A,
            "B" => Register::B,
            "C" => Register::C,
            "H" => Register::H,
            "L" => Register::L,
            other => panic!("unsupported register in test helper: {other}"),
        }
    }

    fn prog(lines: Vec<Ln>) -> Program {
        Program { lines }
    }

    #[test]
    fn resolves_simple_immediate_load() {
        let program = prog(vec![Ln::Instruction(I::Load { dst: reg("A"), src: Opd::Immediate(42) })]);
        let out = assemble(&program, &ModuleInterchange::empty(), &[], Some(0x8000)).unwrap();
        let isa = vertex_isa::instruction_set();
        assert_eq!(out.bytes, vec![isa.opcode("LDRAI").unwrap(), 42]);
        assert_eq!(out.base, 0x8000);
    }

    #[test]
    fn forward_label_reference_resolves_after_full_walk() {
        let program = prog(vec![
            Ln::Instruction(I::Jump { cond: JumpCondition::None, target: Opd::Label("end".to_string()) }),
            Ln::Instruction(I::Nop),
            Ln::Label("end".to_string()),
            Ln::Instruction(I::Halt),
        ]);
        let out = assemble(&program, &ModuleInterchange::empty(), &[], Some(0x0000)).unwrap();
        let isa = vertex_isa::instruction_set();
        let ji = isa.opcode("JI").unwrap();
        let nop = isa.opcode("NOP").unwrap();
        let hlt = isa.opcode("HLT").unwrap();
        // JI <hi> <lo>, NOP, HLT — label "end" is at offset 4.
        assert_eq!(out.bytes, vec![ji, 0x00, 0x04, nop, hlt]);
    }

    #[test]
    fn unresolved_label_is_an_error() {
        let program = prog(vec![Ln::Instruction(I::Call(Opd::Label("missing".to_string())))]);
        let err = assemble(&program, &ModuleInterchange::empty(), &[], Some(0)).unwrap_err();
        assert_eq!(err, AsmError::UnresolvedLabel("missing".to_string()));
    }

    #[test]
    fn duplicate_labels_keep_first_definition() {
        let program = prog(vec![
            Ln::Label("x".to_string()),
            Ln::Instruction(I::Nop),
            Ln::Label("x".to_string()),
            Ln::Instruction(I::Call(Opd::Label("x".to_string()))),
        ]);
        let out = assemble(&program, &ModuleInterchange::empty(), &[], Some(0)).unwrap();
        let isa = vertex_isa::instruction_set();
        // "x" resolves to offset 0, the first definition, not offset 1.
        assert_eq!(&out.bytes[2..], &[isa.opcode("CAL").unwrap(), 0x00, 0x00]);
    }

    #[test]
    fn imported_routine_resolves_without_local_definition() {
        let mut imports = ModuleInterchange::empty();
        imports.routines.insert("helper".to_string(), crate::interchange::RoutineEntry { address: 0x1234 });
        let program = prog(vec![Ln::Instruction(I::Call(Opd::Label("helper".to_string())))]);
        let out = assemble(&program, &imports, &[], Some(0)).unwrap();
        let isa = vertex_isa::instruction_set();
        assert_eq!(out.bytes, vec![isa.opcode("CAL").unwrap(), 0x12, 0x34]);
    }

    #[test]
    fn exports_resolve_to_absolute_addresses() {
        let program = prog(vec![Ln::Label("main".to_string()), Ln::Instruction(I::Halt)]);
        let out = assemble(&program, &ModuleInterchange::empty(), &["main".to_string()], Some(0x4000)).unwrap();
        assert_eq!(out.exports.get("main"), Some(&0x4000));
    }

    #[test]
    fn default_base_places_program_against_top_of_address_space() {
        let program = prog(vec![Ln::Instruction(I::Nop)]);
        let out = assemble(&program, &ModuleInterchange::empty(), &[], None).unwrap();
        assert_eq!(out.base as usize, (1usize << 16) - out.bytes.len());
    }

    #[test]
    fn carry_suffix_selects_the_carry_propagating_mnemonic() {
        let program = prog(vec![Ln::Instruction(I::Arithmetic { op: Op::Add, src: Opd::Register(reg("B")), carry: true })]);
        let out = assemble(&program, &ModuleInterchange::empty(), &[], Some(0)).unwrap();
        let isa = vertex_isa::instruction_set();
        assert_eq!(out.bytes[0], isa.opcode("ADDCB").unwrap());
    }

    #[test]
    fn not_is_not_a_real_instruction() {
        // Mirrors a latent defect in the tool this assembler descends
        // from: the assembly surface advertises NOT, but no instruction
        // of that name is ever registered in the table.
        let program = prog(vec![Ln::Instruction(I::Not)]);
        let err = assemble(&program, &ModuleInterchange::empty(), &[], Some(0)).unwrap_err();
        assert_eq!(err, AsmError::UnknownInstruction(vertex_isa::IsaError::UnknownInstruction { name: "NOT".to_string() }));
    }
}

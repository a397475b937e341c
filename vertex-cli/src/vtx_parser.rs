//! A line-oriented parser from Vtx assembly text to
//! [`vertex_asm::ast::Program`]. One instruction (or label) per line; `;`
//! starts a line comment. This is the exact textual surface the Storn
//! code generator emits (SPEC_FULL.md §6.1), so the driver can always
//! round-trip generated assembly back through this front end before
//! handing it to the assembler.
//!
//! ```text
//! ENTRY:
//!   ldr bph sph
//!   sub cc 1
//!   jmp zf L0
//!   cal HELPER
//!   hlt
//! ```

use vertex_asm::ast::{ArithOp, Instr, JumpCondition, Line, Operand, Program, Register, UnaryOp};

use crate::error::ParseError;

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let mut lines = Vec::new();
    for (number, raw) in source.lines().enumerate() {
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        lines.push(parse_line(text, number + 1)?);
    }
    Ok(Program { lines })
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(index) => &line[..index],
        None => line,
    }
}

fn err(line: usize, message: impl Into<String>) -> ParseError {
    ParseError { message: message.into(), line, column: 1 }
}

fn parse_line(text: &str, line: usize) -> Result<Line, ParseError> {
    if let Some(name) = text.strip_suffix(':') {
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(err(line, format!("malformed label: {text}")));
        }
        return Ok(Line::Label(name.to_string()));
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let instr = parse_instruction(&tokens, line)?;
    Ok(Line::Instruction(instr))
}

fn register(tok: &str) -> Option<Register> {
    Some(match tok {
        "a" => Register::A,
        "b" => Register::B,
        "c" => Register::C,
        "h" => Register::H,
        "l" => Register::L,
        "bph" => Register::Bph,
        "bpl" => Register::Bpl,
        "sph" => Register::Sph,
        "spl" => Register::Spl,
        "s" => Register::S,
        _ => return None,
    })
}

fn address(tok: &str, line: usize) -> Result<u16, ParseError> {
    let digits = tok.strip_prefix('@').ok_or_else(|| err(line, format!("expected an '@' address, found {tok}")))?;
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|_| err(line, format!("malformed address literal: {tok}")))
    } else {
        digits.parse().map_err(|_| err(line, format!("malformed address literal: {tok}")))
    }
}

fn operand(tok: &str, line: usize) -> Result<Operand, ParseError> {
    if tok == "m" {
        return Ok(Operand::Indirect);
    }
    if let Some(reg) = register(tok) {
        return Ok(Operand::Register(reg));
    }
    if tok.starts_with('@') {
        return Ok(Operand::Address(address(tok, line)?));
    }
    if tok.chars().all(|c| c.is_ascii_digit()) {
        let value: u8 = tok.parse().map_err(|_| err(line, format!("immediate out of range: {tok}")))?;
        return Ok(Operand::Immediate(value));
    }
    Ok(Operand::Label(tok.to_string()))
}

fn require_register(tok: &str, line: usize) -> Result<Register, ParseError> {
    register(tok).ok_or_else(|| err(line, format!("expected a register, found {tok}")))
}

fn require<'a>(tokens: &[&'a str], index: usize, line: usize, what: &str) -> Result<&'a str, ParseError> {
    tokens.get(index).copied().ok_or_else(|| err(line, format!("expected {what}")))
}

fn parse_instruction(tokens: &[&str], line: usize) -> Result<Instr, ParseError> {
    let mnemonic = *tokens.first().ok_or_else(|| err(line, "expected an instruction"))?;
    Ok(match mnemonic {
        "ldr" => {
            let dst = require_register(require(tokens, 1, line, "a destination register")?, line)?;
            let src = operand(require(tokens, 2, line, "a source operand")?, line)?;
            Instr::Load { dst, src }
        }
        "str" => {
            let dst = operand(require(tokens, 1, line, "a store destination")?, line)?;
            let src = require_register(require(tokens, 2, line, "a source register")?, line)?;
            Instr::Store { src, dst }
        }
        "psh" => Instr::Push(operand(require(tokens, 1, line, "a push operand")?, line)?),
        "pop" => Instr::Pop(require_register(require(tokens, 1, line, "a destination register")?, line)?),
        "add" | "sub" | "and" | "or" | "xor" => {
            let op = match mnemonic {
                "add" => ArithOp::Add,
                "sub" => ArithOp::Sub,
                "and" => ArithOp::And,
                "or" => ArithOp::Or,
                "xor" => ArithOp::Xor,
                _ => unreachable!(),
            };
            let (carry, index) = if tokens.get(1) == Some(&"cc") { (true, 2) } else { (false, 1) };
            let src = operand(require(tokens, index, line, "an ALU operand")?, line)?;
            Instr::Arithmetic { op, src, carry }
        }
        "inc" | "dec" | "shl" | "shr" => {
            let op = match mnemonic {
                "inc" => UnaryOp::Inc,
                "dec" => UnaryOp::Dec,
                "shl" => UnaryOp::Shl,
                "shr" => UnaryOp::Shr,
                _ => unreachable!(),
            };
            let carry = tokens.get(1) == Some(&"cc");
            Instr::Unary { op, carry }
        }
        "jmp" => {
            let (cond, index) = match tokens.get(1) {
                Some(&"zf") => (JumpCondition::Zf, 2),
                Some(&"nzf") => (JumpCondition::Nzf, 2),
                Some(&"sf") => (JumpCondition::Sf, 2),
                Some(&"nsf") => (JumpCondition::Nsf, 2),
                Some(&"cf") => (JumpCondition::Cf, 2),
                Some(&"ncf") => (JumpCondition::Ncf, 2),
                _ => (JumpCondition::None, 1),
            };
            let target = operand(require(tokens, index, line, "a jump target")?, line)?;
            Instr::Jump { cond, target }
        }
        "cal" => Instr::Call(operand(require(tokens, 1, line, "a call target")?, line)?),
        "not" => Instr::Not,
        "intret" => Instr::IntRet,
        "out" => Instr::Out,
        "hlt" => Instr::Halt,
        "nop" => Instr::Nop,
        "ien" => Instr::Ien,
        other => return Err(err(line, format!("unknown mnemonic: {other}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_label_and_register_load() {
        let program = parse("ENTRY:\n  ldr bph sph\n").unwrap();
        assert_eq!(program.lines[0], Line::Label("ENTRY".to_string()));
        assert_eq!(program.lines[1], Line::Instruction(Instr::Load { dst: Register::Bph, src: Operand::Register(Register::Sph) }));
    }

    #[test]
    fn parses_carry_suffixed_arithmetic() {
        let program = parse("sub cc 5\n").unwrap();
        assert_eq!(program.lines[0], Line::Instruction(Instr::Arithmetic { op: ArithOp::Sub, src: Operand::Immediate(5), carry: true }));
    }

    #[test]
    fn parses_a_conditional_jump_to_a_label() {
        let program = parse("jmp zf L3\n").unwrap();
        assert_eq!(
            program.lines[0],
            Line::Instruction(Instr::Jump { cond: JumpCondition::Zf, target: Operand::Label("L3".to_string()) })
        );
    }

    #[test]
    fn parses_an_unconditional_jump_through_m() {
        let program = parse("jmp m\n").unwrap();
        assert_eq!(program.lines[0], Line::Instruction(Instr::Jump { cond: JumpCondition::None, target: Operand::Indirect }));
    }

    #[test]
    fn parses_hex_and_decimal_addresses() {
        let program = parse("cal @0x8000\nldr a @32768\n").unwrap();
        assert_eq!(program.lines[0], Line::Instruction(Instr::Call(Operand::Address(0x8000))));
        assert_eq!(program.lines[1], Line::Instruction(Instr::Load { dst: Register::A, src: Operand::Address(32768) }));
    }

    #[test]
    fn ignores_comments_and_blank_lines() {
        let program = parse("; a full-line comment\n\nnop ; trailing comment\n").unwrap();
        assert_eq!(program.lines, vec![Line::Instruction(Instr::Nop)]);
    }

    #[test]
    fn rejects_an_unknown_mnemonic() {
        let err = parse("frobnicate a\n").unwrap_err();
        assert!(err.message.contains("frobnicate"));
    }
}

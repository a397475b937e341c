//! A hand-written recursive-descent parser from Storn source text to
//! [`vertex_storn::ast::Program`]. The code generator never sees text; this
//! is the only place that grammar lives.
//!
//! Surface syntax (see SPEC_FULL.md §6.2 for the feature list this
//! realises):
//!
//! ```text
//! data Point { x: [16], y: [16] }
//! counter: [8].
//! routine entry ( ) [0] { n: [8]. } {
//!     set n = 5:8.
//!     loop {
//!         if n = 0:8 { break. }
//!         output n.
//!         set n = n - 1:8.
//!     }
//!     return.
//! }
//! ```
//!
//! Types: `[0]`/`[8]`/`[16]` (Base), a bare identifier (Named), `<Type>`
//! (Reference), `Type ^ N` (Array). Lvalues: a bare name (Primary), `<lv>`
//! (Dereference), `lv/field` (Projection), `lv@expr` (Index). Literals are
//! always `<value>:<width>`; casts are `<expr>:<Type>` at a lower
//! precedence than unary, so a colon after a bare integer is always
//! consumed as that integer's own width rather than as a cast.

use vertex_storn::ast::{
    AdditiveOp, BitwiseOp, CompareOp, DataDecl, Expr, Lvalue, LogicalOp, Program, RoutineDecl, ShiftOp, Stmt,
    TypeExpr, UnaryOp,
};

use crate::error::ParseError;
use crate::lexer::{lex, Spanned, Token};

pub fn parse(source: &str) -> Result<Program, ParseError> {
    let tokens = lex(source)?;
    Parser { tokens, pos: 0 }.parse_program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn current(&self) -> &Spanned {
        &self.tokens[self.pos]
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let here = self.current();
        ParseError { message: message.into(), line: here.line, column: here.column }
    }

    fn advance(&mut self) -> Spanned {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_symbol(&self, sym: &str) -> bool {
        matches!(&self.current().token, Token::Symbol(s) if *s == sym)
    }

    fn at_ident(&self, word: &str) -> bool {
        matches!(&self.current().token, Token::Ident(s) if s == word)
    }

    fn eat_symbol(&mut self, sym: &'static str) -> Result<(), ParseError> {
        if self.at_symbol(sym) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{sym}'")))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> Result<(), ParseError> {
        if self.at_ident(word) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected '{word}'")))
        }
    }

    fn eat_ident(&mut self) -> Result<String, ParseError> {
        match self.advance().token {
            Token::Ident(name) => Ok(name),
            other => Err(ParseError { message: format!("expected an identifier, found {other:?}"), ..self.error("") }),
        }
    }

    fn eat_int(&mut self) -> Result<u16, ParseError> {
        match self.advance().token {
            Token::Int(value) => Ok(value),
            other => Err(ParseError { message: format!("expected an integer, found {other:?}"), ..self.error("") }),
        }
    }

    // --- Top level ---

    fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut program = Program { data: Vec::new(), globals: Vec::new(), routines: Vec::new() };
        while !matches!(self.current().token, Token::Eof) {
            if self.at_ident("data") {
                program.data.push(self.parse_data_decl()?);
            } else if self.at_ident("routine") {
                program.routines.push(self.parse_routine_decl()?);
            } else {
                let name = self.eat_ident()?;
                self.eat_symbol(":")?;
                let ty = self.parse_type_expr()?;
                self.eat_symbol(".")?;
                program.globals.push((name, ty));
            }
        }
        Ok(program)
    }

    fn parse_data_decl(&mut self) -> Result<DataDecl, ParseError> {
        self.eat_keyword("data")?;
        let name = self.eat_ident()?;
        self.eat_symbol("{")?;
        let mut fields = Vec::new();
        while !self.at_symbol("}") {
            let field_name = self.eat_ident()?;
            self.eat_symbol(":")?;
            let ty = self.parse_type_expr()?;
            fields.push((field_name, ty));
            if self.at_symbol(",") {
                self.advance();
            } else {
                break;
            }
        }
        self.eat_symbol("}")?;
        Ok(DataDecl { name, fields })
    }

    fn parse_routine_decl(&mut self) -> Result<RoutineDecl, ParseError> {
        self.eat_keyword("routine")?;
        let name = self.eat_ident()?;
        self.eat_symbol("(")?;
        let mut params = Vec::new();
        while !self.at_symbol(")") {
            let param_name = self.eat_ident()?;
            self.eat_symbol(":")?;
            let ty = self.parse_type_expr()?;
            params.push((param_name, ty));
            if self.at_symbol(",") {
                self.advance();
            } else {
                break;
            }
        }
        self.eat_symbol(")")?;
        let return_type = self.parse_type_expr()?;

        self.eat_symbol("{")?;
        let mut locals = Vec::new();
        while !self.at_symbol("}") {
            let local_name = self.eat_ident()?;
            self.eat_symbol(":")?;
            let ty = self.parse_type_expr()?;
            self.eat_symbol(".")?;
            locals.push((local_name, ty));
        }
        self.eat_symbol("}")?;

        self.eat_symbol("{")?;
        let mut body = Vec::new();
        while !self.at_symbol("}") {
            body.push(self.parse_stmt()?);
        }
        self.eat_symbol("}")?;

        Ok(RoutineDecl { name, params, return_type, locals, body })
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, ParseError> {
        let mut ty = if self.at_symbol("[") {
            self.advance();
            let width = self.eat_int()?;
            self.eat_symbol("]")?;
            TypeExpr::Base(width)
        } else if self.at_symbol("<") {
            self.advance();
            let inner = self.parse_type_expr()?;
            self.eat_symbol(">")?;
            TypeExpr::Reference(Box::new(inner))
        } else {
            TypeExpr::Named(self.eat_ident()?)
        };
        while self.at_symbol("^") {
            self.advance();
            let length = self.eat_int()?;
            ty = TypeExpr::Array(Box::new(ty), length);
        }
        Ok(ty)
    }

    // --- Statements ---

    fn parse_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.eat_symbol("{")?;
        let mut stmts = Vec::new();
        while !self.at_symbol("}") {
            stmts.push(self.parse_stmt()?);
        }
        self.eat_symbol("}")?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        if self.at_ident("set") {
            self.advance();
            let lvalue = self.parse_lvalue()?;
            self.eat_symbol("=")?;
            let value = self.parse_expr()?;
            self.eat_symbol(".")?;
            return Ok(Stmt::Set { lvalue, value });
        }
        if self.at_ident("if") {
            self.advance();
            let mut arms = Vec::new();
            let guard = self.parse_expr()?;
            let body = self.parse_block()?;
            arms.push((guard, body));
            while self.at_ident("elif") {
                self.advance();
                let guard = self.parse_expr()?;
                let body = self.parse_block()?;
                arms.push((guard, body));
            }
            let else_body = if self.at_ident("else") {
                self.advance();
                Some(self.parse_block()?)
            } else {
                None
            };
            return Ok(Stmt::If { arms, else_body });
        }
        if self.at_ident("loop") {
            self.advance();
            return Ok(Stmt::Loop { body: self.parse_block()? });
        }
        if self.at_ident("break") {
            self.advance();
            self.eat_symbol(".")?;
            return Ok(Stmt::Break);
        }
        if self.at_ident("continue") {
            self.advance();
            self.eat_symbol(".")?;
            return Ok(Stmt::Continue);
        }
        if self.at_ident("output") {
            self.advance();
            let expr = self.parse_expr()?;
            self.eat_symbol(".")?;
            return Ok(Stmt::Output(expr));
        }
        if self.at_ident("return") {
            self.advance();
            if self.at_symbol(".") {
                self.advance();
                return Ok(Stmt::Return(None));
            }
            let expr = self.parse_expr()?;
            self.eat_symbol(".")?;
            return Ok(Stmt::Return(Some(expr)));
        }
        let expr = self.parse_expr()?;
        self.eat_symbol(".")?;
        Ok(Stmt::Expr(expr))
    }

    // --- Expressions (precedence low -> high, per SPEC_FULL.md §4.4.5) ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_logical()
    }

    fn parse_logical(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_bitwise()?;
        loop {
            let op = if self.at_ident("or") {
                LogicalOp::Or
            } else if self.at_ident("and") {
                LogicalOp::And
            } else {
                break;
            };
            self.advance();
            let right = self.parse_bitwise()?;
            left = Expr::Logical(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_bitwise(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparative()?;
        loop {
            let op = if self.at_symbol("|") {
                BitwiseOp::Or
            } else if self.at_symbol("&") {
                BitwiseOp::And
            } else if self.at_symbol("^") {
                BitwiseOp::Xor
            } else {
                break;
            };
            self.advance();
            let right = self.parse_comparative()?;
            left = Expr::Bitwise(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparative(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_additive()?;
        let op = if self.at_symbol("=") {
            CompareOp::Eq
        } else if self.at_symbol("<=") {
            CompareOp::Leq
        } else if self.at_symbol(">=") {
            CompareOp::Geq
        } else if self.at_symbol("<") {
            CompareOp::Lt
        } else if self.at_symbol(">") {
            CompareOp::Gt
        } else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        Ok(Expr::Compare(Box::new(left), op, Box::new(right)))
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_shift()?;
        loop {
            let op = if self.at_symbol("+") {
                AdditiveOp::Add
            } else if self.at_symbol("-") {
                AdditiveOp::Sub
            } else {
                break;
            };
            self.advance();
            let right = self.parse_shift()?;
            left = Expr::Additive(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.at_symbol("<<") {
                ShiftOp::Shl
            } else if self.at_symbol(">>") {
                ShiftOp::Shr
            } else {
                break;
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::Shift(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while self.at_symbol("*") {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Multiply(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        if self.at_symbol("-") {
            self.advance();
            return Ok(Expr::Unary(UnaryOp::Negate, Box::new(self.parse_unary()?)));
        }
        if self.at_symbol("!") {
            self.advance();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.parse_unary()?)));
        }
        self.parse_cast()
    }

    fn parse_cast(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_primary()?;
        while self.at_symbol(":") {
            self.advance();
            let ty = self.parse_type_expr()?;
            expr = Expr::Cast(Box::new(expr), ty);
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        if let Token::Int(value) = self.current().token {
            self.advance();
            self.eat_symbol(":")?;
            let width = self.eat_int()?;
            return Ok(Expr::Literal { value, width });
        }
        if self.at_ident("sizeof") {
            self.advance();
            self.eat_symbol("(")?;
            let ty = self.parse_type_expr()?;
            self.eat_symbol(")")?;
            return Ok(Expr::SizeOf(ty));
        }
        if self.at_symbol("(") {
            self.advance();
            let inner = self.parse_expr()?;
            self.eat_symbol(")")?;
            return Ok(inner);
        }
        if let Token::Ident(name) = self.current().token.clone() {
            if matches!(self.tokens.get(self.pos + 1).map(|s| &s.token), Some(&Token::Symbol("("))) {
                self.advance();
                self.advance();
                let mut args = Vec::new();
                while !self.at_symbol(")") {
                    args.push(self.parse_expr()?);
                    if self.at_symbol(",") {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.eat_symbol(")")?;
                return Ok(Expr::Call { routine: name, args });
            }
        }
        Ok(Expr::Lvalue(Box::new(self.parse_lvalue()?)))
    }

    // --- Lvalues ---

    fn parse_lvalue(&mut self) -> Result<Lvalue, ParseError> {
        let mut lvalue = if self.at_symbol("<") {
            self.advance();
            let inner = self.parse_lvalue()?;
            self.eat_symbol(">")?;
            Lvalue::Dereference(Box::new(inner))
        } else {
            Lvalue::Primary(self.eat_ident()?)
        };
        loop {
            if self.at_symbol("/") {
                self.advance();
                let field = self.eat_ident()?;
                lvalue = Lvalue::Projection(Box::new(lvalue), field);
            } else if self.at_symbol("@") {
                self.advance();
                let index = self.parse_additive()?;
                lvalue = Lvalue::Index(Box::new(lvalue), Box::new(index));
            } else {
                break;
            }
        }
        Ok(lvalue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_an_entry_routine_with_a_loop() {
        let source = "routine entry ( ) [0] { n: [8]. } { set n = 3:8. loop { if n = 0:8 { break. } output n. set n = n - 1:8. } return. }";
        let program = parse(source).unwrap();
        assert_eq!(program.routines.len(), 1);
        assert_eq!(program.routines[0].name, "entry");
        assert_eq!(program.routines[0].locals, vec![("n".to_string(), TypeExpr::Base(8))]);
    }

    #[test]
    fn parses_a_data_declaration_and_a_global() {
        let source = "data Point { x: [16], y: [16] } origin: Point.";
        let program = parse(source).unwrap();
        assert_eq!(program.data[0].name, "Point");
        assert_eq!(program.globals[0], ("origin".to_string(), TypeExpr::Named("Point".to_string())));
    }

    #[test]
    fn parses_nested_lvalue_cascades() {
        let source = "routine entry ( ) [0] { } { set <p>/x@1:8 = 0:8. return. }";
        let program = parse(source).unwrap();
        let Stmt::Set { lvalue, .. } = &program.routines[0].body[0] else { panic!("expected a set statement") };
        assert!(matches!(lvalue, Lvalue::Index(..)));
    }

    #[test]
    fn a_literal_consumes_its_own_colon_width_not_a_cast() {
        let source = "routine entry ( ) [0] { } { output 5:8. return. }";
        let program = parse(source).unwrap();
        assert_eq!(program.routines[0].body[0], Stmt::Output(Expr::Literal { value: 5, width: 8 }));
    }

    #[test]
    fn reports_a_location_on_a_missing_terminator() {
        let err = parse("counter: [8]").unwrap_err();
        assert!(err.message.contains('.'));
    }

    #[test]
    fn parses_array_and_reference_types_with_suffix_chaining() {
        let source = "routine entry ( arr: [8] ^ 4, r: <[16]> ) [0] { } { return. }";
        let program = parse(source).unwrap();
        assert_eq!(program.routines[0].params[0].1, TypeExpr::Array(Box::new(TypeExpr::Base(8)), 4));
        assert_eq!(program.routines[0].params[1].1, TypeExpr::Reference(Box::new(TypeExpr::Base(16))));
    }
}

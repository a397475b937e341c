//! A small hand-rolled lexer shared by the Storn front end. Vtx assembly
//! is line-oriented and simple enough to tokenise directly in
//! `vtx_parser` without this machinery.

use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(u16),
    Symbol(&'static str),
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

const MULTI_CHAR_SYMBOLS: &[&str] = &["<=", ">=", "<<", ">>"];

pub fn lex(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    macro_rules! advance {
        ($n:expr) => {{
            for _ in 0..$n {
                if chars[i] == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
                i += 1;
            }
        }};
    }

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            advance!(1);
            continue;
        }
        if c == '#' {
            while i < chars.len() && chars[i] != '\n' {
                advance!(1);
            }
            continue;
        }

        let (start_line, start_column) = (line, column);

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                advance!(1);
            }
            let text: String = chars[start..i].iter().collect();
            let value: u16 = text
                .parse()
                .map_err(|_| ParseError { message: format!("integer literal out of range: {text}"), line: start_line, column: start_column })?;
            tokens.push(Spanned { token: Token::Int(value), line: start_line, column: start_column });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                advance!(1);
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Spanned { token: Token::Ident(text), line: start_line, column: start_column });
            continue;
        }

        let rest: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        if let Some(sym) = MULTI_CHAR_SYMBOLS.iter().find(|s| rest.starts_with(*s)) {
            advance!(2);
            tokens.push(Spanned { token: Token::Symbol(sym), line: start_line, column: start_column });
            continue;
        }

        const SINGLE_CHAR_SYMBOLS: &[(char, &str)] = &[
            ('{', "{"), ('}', "}"), ('(', "("), (')', ")"), ('[', "["), (']', "]"),
            ('<', "<"), ('>', ">"), ('^', "^"), (':', ":"), (',', ","), ('.', "."),
            ('=', "="), ('+', "+"), ('-', "-"), ('*', "*"), ('@', "@"), ('/', "/"), ('!', "!"),
        ];
        if let Some((_, sym)) = SINGLE_CHAR_SYMBOLS.iter().find(|(ch, _)| *ch == c) {
            advance!(1);
            tokens.push(Spanned { token: Token::Symbol(sym), line: start_line, column: start_column });
            continue;
        }

        return Err(ParseError { message: format!("unexpected character '{c}'"), line: start_line, column: start_column });
    }

    tokens.push(Spanned { token: Token::Eof, line, column });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexes_a_typed_declaration() {
        let tokens = lex("counter: [8].").unwrap();
        assert_eq!(tokens[0].token, Token::Ident("counter".to_string()));
        assert_eq!(tokens[1].token, Token::Symbol(":"));
        assert_eq!(tokens[2].token, Token::Symbol("["));
        assert_eq!(tokens[3].token, Token::Int(8));
        assert_eq!(tokens[4].token, Token::Symbol("]"));
        assert_eq!(tokens[5].token, Token::Symbol("."));
    }

    #[test]
    fn distinguishes_shift_from_comparison_symbols() {
        let tokens = lex("<< >> <= >= < >").unwrap();
        let kinds: Vec<_> = tokens.iter().map(|s| s.token.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                Token::Symbol("<<"),
                Token::Symbol(">>"),
                Token::Symbol("<="),
                Token::Symbol(">="),
                Token::Symbol("<"),
                Token::Symbol(">"),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn skips_hash_comments() {
        let tokens = lex("# a comment\ncounter: [8].").unwrap();
        assert_eq!(tokens[0].token, Token::Ident("counter".to_string()));
    }

    #[test]
    fn reports_line_and_column_of_unexpected_character() {
        let err = lex("a = ?").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 5);
    }
}

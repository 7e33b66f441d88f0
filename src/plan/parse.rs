//! Parser for function-call style expressions in the schema document.
//!
//! Select and where overrides carry expressions like
//! `TRIM(CONCAT(firstName, ' ', lastName))`. This parser turns them into
//! [`Expr`] trees at load time, rejecting unknown functions and wrong
//! arities so that a plan can only ever reference the closed function set.

use thiserror::Error;

use super::expr::{col, alias_col, lit_bool, lit_float, lit_int, lit_null, lit_str, Expr, ScalarFn};

/// Errors from expression parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unexpected character '{ch}' at byte {at} in expression '{expr}'")]
    UnexpectedChar { ch: char, at: usize, expr: String },

    #[error("Unexpected end of expression '{expr}'")]
    UnexpectedEnd { expr: String },

    #[error("Expected {expected} at byte {at} in expression '{expr}'")]
    Expected {
        expected: &'static str,
        at: usize,
        expr: String,
    },

    #[error("Unknown function '{name}' in expression '{expr}'")]
    UnknownFunction { name: String, expr: String },

    #[error("Function '{name}' called with {got} argument(s) in expression '{expr}'")]
    WrongArity {
        name: &'static str,
        got: usize,
        expr: String,
    },

    #[error("Unterminated string literal in expression '{expr}'")]
    UnterminatedString { expr: String },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parse one expression.
pub fn parse_expr(input: &str) -> ParseResult<Expr> {
    let mut p = Parser::new(input);
    let expr = p.expr()?;
    p.skip_ws();
    if let Some((at, ch)) = p.peek() {
        return Err(ParseError::UnexpectedChar {
            ch,
            at,
            expr: input.to_string(),
        });
    }
    Ok(expr)
}

struct Parser<'a> {
    input: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<(usize, char)> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        self.chars.next()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some((_, c)) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, ch: char, expected: &'static str) -> ParseResult<()> {
        self.skip_ws();
        match self.peek() {
            Some((_, c)) if c == ch => {
                self.bump();
                Ok(())
            }
            Some((at, _)) => Err(ParseError::Expected {
                expected,
                at,
                expr: self.input.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd {
                expr: self.input.to_string(),
            }),
        }
    }

    fn expr(&mut self) -> ParseResult<Expr> {
        self.skip_ws();
        match self.peek() {
            Some((_, '\'')) => self.string_literal(),
            Some((_, '{')) => self.templated_column(),
            Some((_, c)) if c.is_ascii_digit() || c == '-' => self.number(),
            Some((_, c)) if c.is_alphabetic() || c == '_' => self.ident_or_call(),
            Some((at, ch)) => Err(ParseError::UnexpectedChar {
                ch,
                at,
                expr: self.input.to_string(),
            }),
            None => Err(ParseError::UnexpectedEnd {
                expr: self.input.to_string(),
            }),
        }
    }

    fn string_literal(&mut self) -> ParseResult<Expr> {
        // Opening quote.
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some((_, '\'')) => {
                    // '' escapes a quote inside the literal.
                    if matches!(self.peek(), Some((_, '\''))) {
                        self.bump();
                        out.push('\'');
                    } else {
                        return Ok(lit_str(&out));
                    }
                }
                Some((_, c)) => out.push(c),
                None => {
                    return Err(ParseError::UnterminatedString {
                        expr: self.input.to_string(),
                    })
                }
            }
        }
    }

    fn number(&mut self) -> ParseResult<Expr> {
        let start = self.peek().map(|(i, _)| i).unwrap_or(0);
        let mut end = start;
        let mut is_float = false;
        if matches!(self.peek(), Some((_, '-'))) {
            self.bump();
        }
        while let Some((i, c)) = self.peek() {
            if c.is_ascii_digit() {
                end = i + c.len_utf8();
                self.bump();
            } else if c == '.' && !is_float {
                is_float = true;
                end = i + 1;
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.input[start..end];
        if is_float {
            text.parse::<f64>().map(lit_float).map_err(|_| {
                ParseError::UnexpectedChar {
                    ch: '.',
                    at: start,
                    expr: self.input.to_string(),
                }
            })
        } else {
            text.parse::<i64>().map(lit_int).map_err(|_| {
                ParseError::UnexpectedEnd {
                    expr: self.input.to_string(),
                }
            })
        }
    }

    fn ident(&mut self) -> ParseResult<String> {
        let mut out = String::new();
        while let Some((_, c)) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                out.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(ParseError::UnexpectedEnd {
                expr: self.input.to_string(),
            });
        }
        Ok(out)
    }

    /// `{alias}.column` - a templated alias lowered to a placeholder the
    /// compiler substitutes through `AliasContext`, never by splicing text.
    fn templated_column(&mut self) -> ParseResult<Expr> {
        self.bump();
        let name = self.ident()?;
        self.expect('}', "'}'")?;
        self.expect('.', "'.'")?;
        let column = self.ident()?;
        Ok(alias_col(&format!("{{{name}}}"), &column))
    }

    fn ident_or_call(&mut self) -> ParseResult<Expr> {
        let name = self.ident()?;

        match name.as_str() {
            "TRUE" | "true" => return Ok(lit_bool(true)),
            "FALSE" | "false" => return Ok(lit_bool(false)),
            "NULL" | "null" => return Ok(lit_null()),
            _ => {}
        }

        self.skip_ws();
        match self.peek() {
            // Function call.
            Some((_, '(')) => {
                let func = ScalarFn::from_name(&name).ok_or_else(|| {
                    ParseError::UnknownFunction {
                        name: name.clone(),
                        expr: self.input.to_string(),
                    }
                })?;
                self.bump();
                let mut args = Vec::new();
                self.skip_ws();
                if !matches!(self.peek(), Some((_, ')'))) {
                    loop {
                        args.push(self.expr()?);
                        self.skip_ws();
                        if matches!(self.peek(), Some((_, ','))) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                }
                self.expect(')', "')'")?;
                if !func.accepts(args.len()) {
                    return Err(ParseError::WrongArity {
                        name: func.name(),
                        got: args.len(),
                        expr: self.input.to_string(),
                    });
                }
                Ok(Expr::Func { func, args })
            }
            // Qualified column: alias.column
            Some((_, '.')) => {
                self.bump();
                let column = self.ident()?;
                Ok(alias_col(&name, &column))
            }
            _ => Ok(col(&name)),
        }
    }
}

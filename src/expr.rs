//! Recursive-descent expression evaluator used by the assembler (§4.2).
//!
//! Precedence, low to high: unary `<`/`>` (low/high byte), then `+`/`-`,
//! then `*`/`/`, then unary `+`/`-`, then atoms. Everything evaluates over
//! signed 32-bit integers.

use std::iter::Peekable;
use std::str::Chars;

use crate::error::AssemblerError;
use crate::symtab::SymbolTable;

/// Evaluates `input` against `symtab`, resolving `*` to `pc` (the
/// assembler's current location counter).
pub fn evaluate(input: &str, symtab: &mut SymbolTable, pc: i32) -> Result<i32, AssemblerError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AssemblerError::InvalidExpression("empty expression".to_string()));
    }
    let mut parser = ExpressionParser { chars: trimmed.chars().peekable(), symtab, pc };
    let value = parser.parse_low_high_byte()?;
    parser.skip_whitespace();
    if parser.chars.peek().is_some() {
        let rest: String = parser.chars.collect();
        return Err(AssemblerError::InvalidExpression(format!("trailing input: {rest}")));
    }
    Ok(value)
}

struct ExpressionParser<'a> {
    chars: Peekable<Chars<'a>>,
    symtab: &'a mut SymbolTable,
    pc: i32,
}

impl<'a> ExpressionParser<'a> {
    fn skip_whitespace(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek_nonspace(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.chars.peek().copied()
    }

    fn parse_low_high_byte(&mut self) -> Result<i32, AssemblerError> {
        match self.peek_nonspace() {
            Some('<') => {
                self.chars.next();
                let value = self.parse_add_sub()?;
                Ok(value & 0xFF)
            }
            Some('>') => {
                self.chars.next();
                let value = self.parse_add_sub()?;
                Ok((value >> 8) & 0xFF)
            }
            _ => self.parse_add_sub(),
        }
    }

    fn parse_add_sub(&mut self) -> Result<i32, AssemblerError> {
        let mut value = self.parse_mul_div()?;
        loop {
            match self.peek_nonspace() {
                Some('+') => {
                    self.chars.next();
                    value = value.wrapping_add(self.parse_mul_div()?);
                }
                Some('-') => {
                    self.chars.next();
                    value = value.wrapping_sub(self.parse_mul_div()?);
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_mul_div(&mut self) -> Result<i32, AssemblerError> {
        let mut value = self.parse_unary()?;
        loop {
            match self.peek_nonspace() {
                Some('*') => {
                    self.chars.next();
                    value = value.wrapping_mul(self.parse_unary()?);
                }
                Some('/') => {
                    self.chars.next();
                    let divisor = self.parse_unary()?;
                    if divisor == 0 {
                        return Err(AssemblerError::InvalidExpression(
                            "division by zero".to_string(),
                        ));
                    }
                    value /= divisor;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_unary(&mut self) -> Result<i32, AssemblerError> {
        match self.peek_nonspace() {
            Some('+') => {
                self.chars.next();
                self.parse_unary()
            }
            Some('-') => {
                self.chars.next();
                Ok(-self.parse_unary()?)
            }
            _ => self.parse_atom(),
        }
    }

    fn parse_atom(&mut self) -> Result<i32, AssemblerError> {
        match self.peek_nonspace() {
            Some('(') => {
                self.chars.next();
                let value = self.parse_low_high_byte()?;
                self.skip_whitespace();
                match self.chars.next() {
                    Some(')') => Ok(value),
                    _ => Err(AssemblerError::SyntaxError("missing closing ')'".to_string())),
                }
            }
            Some('$') => {
                self.chars.next();
                self.parse_radix(16, "$")
            }
            Some('%') => {
                self.chars.next();
                self.parse_radix(2, "%")
            }
            Some('*') => {
                self.chars.next();
                Ok(self.pc)
            }
            Some('\'') => {
                self.chars.next();
                let c = self
                    .chars
                    .next()
                    .ok_or_else(|| AssemblerError::SyntaxError("unterminated char literal".to_string()))?;
                if self.chars.peek() == Some(&'\'') {
                    self.chars.next();
                }
                Ok(c as i32)
            }
            Some(c) if c.is_ascii_digit() => self.parse_number(),
            Some(c) if c.is_alphabetic() || c == '_' || c == '.' => self.parse_identifier(),
            Some(c) => Err(AssemblerError::SyntaxError(format!("unexpected character '{c}'"))),
            None => Err(AssemblerError::InvalidExpression("unexpected end of expression".to_string())),
        }
    }

    fn parse_radix(&mut self, radix: u32, prefix: &str) -> Result<i32, AssemblerError> {
        let mut digits = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_digit(radix) || (radix == 16 && c.is_ascii_hexdigit())) {
            digits.push(self.chars.next().unwrap());
        }
        if digits.is_empty() {
            return Err(AssemblerError::SyntaxError(format!("expected digits after '{prefix}'")));
        }
        i32::from_str_radix(&digits, radix)
            .map_err(|_| AssemblerError::SyntaxError(format!("invalid literal {prefix}{digits}")))
    }

    fn parse_number(&mut self) -> Result<i32, AssemblerError> {
        // `0x...` hex literal vs. a plain decimal literal.
        let mut digits = String::new();
        digits.push(self.chars.next().unwrap());
        if digits == "0" && matches!(self.chars.peek(), Some('x') | Some('X')) {
            self.chars.next();
            return self.parse_radix(16, "0x");
        }
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(self.chars.next().unwrap());
        }
        digits
            .parse::<i32>()
            .map_err(|_| AssemblerError::SyntaxError(format!("invalid literal {digits}")))
    }

    fn parse_identifier(&mut self) -> Result<i32, AssemblerError> {
        let mut name = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_' || *c == '.') {
            name.push(self.chars.next().unwrap());
        }
        self.symtab.reference(&name);
        self.symtab
            .lookup(&name)
            .ok_or_else(|| AssemblerError::UndefinedLabel(name.to_ascii_uppercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(input: &str, pc: i32) -> Result<i32, AssemblerError> {
        let mut table = SymbolTable::new();
        table.define("START", 0x0600).unwrap();
        evaluate(input, &mut table, pc)
    }

    #[test]
    fn decimal_hex_binary_and_char_literals() {
        assert_eq!(eval("42", 0).unwrap(), 42);
        assert_eq!(eval("$FF", 0).unwrap(), 255);
        assert_eq!(eval("0xFF", 0).unwrap(), 255);
        assert_eq!(eval("%1010", 0).unwrap(), 10);
        assert_eq!(eval("'A", 0).unwrap(), 65);
        assert_eq!(eval("'A'", 0).unwrap(), 65);
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("2+3*4", 0).unwrap(), 14);
        assert_eq!(eval("(2+3)*4", 0).unwrap(), 20);
        assert_eq!(eval("-5+2", 0).unwrap(), -3);
    }

    #[test]
    fn low_and_high_byte_operators() {
        assert_eq!(eval("<$1234", 0).unwrap(), 0x34);
        assert_eq!(eval(">$1234", 0).unwrap(), 0x12);
    }

    #[test]
    fn location_counter_and_symbol_lookup() {
        assert_eq!(eval("*", 0x0800).unwrap(), 0x0800);
        assert_eq!(eval("START+2", 0).unwrap(), 0x0602);
    }

    #[test]
    fn division_by_zero_is_invalid_expression() {
        let err = eval("1/0", 0).unwrap_err();
        match err {
            AssemblerError::InvalidExpression(msg) => assert!(msg.contains("zero")),
            other => panic!("expected InvalidExpression, got {other:?}"),
        }
    }

    #[test]
    fn unknown_identifier_is_undefined_label() {
        let err = eval("NOPE", 0).unwrap_err();
        assert_eq!(err, AssemblerError::UndefinedLabel("NOPE".to_string()));
    }

    #[test]
    fn empty_input_is_invalid_expression() {
        assert!(matches!(eval("", 0), Err(AssemblerError::InvalidExpression(_))));
        assert!(matches!(eval("   ", 0), Err(AssemblerError::InvalidExpression(_))));
    }
}

//! Dedicated, side-effect-free boolean expression evaluator for branch
//! `expression` mode, edge `condition`s, and loop `exit_when` (spec §4.5,
//! §4.6, §9). Kept deliberately small: literals, `{{...}}` substitution via
//! the template resolver, `==`/`!=`, `&&`/`||`, `!`, and parenthesization —
//! exactly what the named use cases need, nothing more.

use crate::error::{FlowError, Result};
use crate::template::{self, ArtifactMap};

/// Resolve templates in `expr` against `artifacts`, then evaluate the
/// result as a boolean expression.
pub fn eval_bool(expr: &str, artifacts: &ArtifactMap) -> Result<bool> {
    let resolved = template::resolve(expr, artifacts);
    Parser::new(&resolved).parse_bool()
}

#[derive(Debug, Clone, PartialEq)]
enum Value {
    Bool(bool),
    Str(String),
    Num(f64),
}

impl Value {
    fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => template::is_truthy(s),
            Value::Num(n) => *n != 0.0,
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn parse_bool(&mut self) -> Result<bool> {
        let v = self.parse_or()?;
        self.skip_ws();
        if self.pos != self.input.len() {
            return Err(FlowError::Template(format!(
                "unexpected trailing input in expression: '{}'",
                &self.input[self.pos..]
            )));
        }
        Ok(v.truthy())
    }

    fn parse_or(&mut self) -> Result<Value> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.consume("||") {
                let right = self.parse_and()?;
                left = Value::Bool(left.truthy() || right.truthy());
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value> {
        let mut left = self.parse_not()?;
        loop {
            self.skip_ws();
            if self.consume("&&") {
                let right = self.parse_not()?;
                left = Value::Bool(left.truthy() && right.truthy());
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Value> {
        self.skip_ws();
        if self.consume("!") {
            let v = self.parse_not()?;
            return Ok(Value::Bool(!v.truthy()));
        }
        self.parse_equality()
    }

    fn parse_equality(&mut self) -> Result<Value> {
        let left = self.parse_atom()?;
        self.skip_ws();
        if self.consume("==") {
            let right = self.parse_atom()?;
            return Ok(Value::Bool(values_equal(&left, &right)));
        }
        if self.consume("!=") {
            let right = self.parse_atom()?;
            return Ok(Value::Bool(!values_equal(&left, &right)));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Value> {
        self.skip_ws();
        if self.consume("(") {
            let v = self.parse_or()?;
            self.skip_ws();
            if !self.consume(")") {
                return Err(FlowError::Template("expected ')'".into()));
            }
            return Ok(v);
        }
        if self.consume("true") {
            return Ok(Value::Bool(true));
        }
        if self.consume("false") {
            return Ok(Value::Bool(false));
        }
        if self.peek() == Some('\'') || self.peek() == Some('"') {
            return self.parse_string();
        }
        self.parse_bareword_or_number()
    }

    fn parse_string(&mut self) -> Result<Value> {
        let quote = self.peek().unwrap();
        self.pos += quote.len_utf8();
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == quote {
                let s = self.input[start..self.pos].to_string();
                self.pos += quote.len_utf8();
                return Ok(Value::Str(s));
            }
            self.pos += c.len_utf8();
        }
        Err(FlowError::Template("unterminated string literal".into()))
    }

    fn parse_bareword_or_number(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || "()!&|=".contains(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        if start == self.pos {
            return Err(FlowError::Template(format!(
                "unexpected character at position {} in expression",
                self.pos
            )));
        }
        let word = &self.input[start..self.pos];
        if let Ok(n) = word.parse::<f64>() {
            return Ok(Value::Num(n));
        }
        Ok(Value::Str(word.to_string()))
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += c.len_utf8();
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn consume(&mut self, token: &str) -> bool {
        if self.input[self.pos..].starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Num(x), Value::Num(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        // Cross-type comparisons fall back to string representation so
        // `result == 'true'` and similar loosely-typed comparisons work.
        _ => to_display(a) == to_display(b),
    }
}

fn to_display(v: &Value) -> String {
    match v {
        Value::Bool(b) => b.to_string(),
        Value::Num(n) => n.to_string(),
        Value::Str(s) => s.clone(),
    }
}

//! Calculator Plugin
//!
//! Evaluates arithmetic expressions: `+ - * / % ^`, parentheses, unary
//! minus and a few functions (`sqrt`, `abs`, `round`, `floor`, `ceil`).

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Plugin, PluginOutput};

#[derive(Default)]
pub struct CalculatorPlugin;

impl CalculatorPlugin {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Plugin for CalculatorPlugin {
    fn name(&self) -> String {
        "calculator".to_string()
    }

    fn description(&self) -> String {
        "Evaluates arithmetic expressions exactly. Use for any numeric computation.".to_string()
    }

    fn actions(&self) -> Vec<String> {
        vec!["evaluate".to_string()]
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Arithmetic expression, e.g. \"(1200 - 950) / 950 * 100\""
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, _action: &str, params: Value) -> Result<PluginOutput> {
        let Some(expression) = params["expression"].as_str() else {
            return Ok(PluginOutput::failure("Missing 'expression' parameter"));
        };

        match evaluate(expression) {
            Ok(value) => Ok(PluginOutput::success(json!({
                "expression": expression,
                "result": number_value(value),
            }))),
            Err(e) => Ok(PluginOutput::failure(e)),
        }
    }
}

/// Integral results serialize as JSON integers.
fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Deepest nesting of parentheses, calls, signs and exponents accepted.
const MAX_DEPTH: usize = 256;

pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expression.chars().filter(|c| !c.is_whitespace()).collect(),
        pos: 0,
        depth: 0,
    };
    if parser.chars.is_empty() {
        return Err("Empty expression".to_string());
    }

    let value = parser.expr()?;
    if let Some(c) = parser.peek() {
        return Err(format!("Unexpected '{}' at position {}", c, parser.pos));
    }
    if !value.is_finite() {
        return Err("Result is not a finite number".to_string());
    }
    Ok(value)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    /// Run a nested rule, bounded by `MAX_DEPTH`.
    fn descend(&mut self, rule: fn(&mut Self) -> Result<f64, String>) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("Expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = rule(self);
        self.depth -= 1;
        value
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        loop {
            if self.eat('+') {
                value += self.term()?;
            } else if self.eat('-') {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    // term := power (('*' | '/' | '%') power)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.power()?;
        loop {
            if self.eat('*') {
                value *= self.power()?;
            } else if self.eat('/') {
                let rhs = self.power()?;
                if rhs == 0.0 {
                    return Err("Division by zero".to_string());
                }
                value /= rhs;
            } else if self.eat('%') {
                let rhs = self.power()?;
                if rhs == 0.0 {
                    return Err("Division by zero".to_string());
                }
                value %= rhs;
            } else {
                return Ok(value);
            }
        }
    }

    // power := unary ('^' power)?   (right associative)
    fn power(&mut self) -> Result<f64, String> {
        let base = self.unary()?;
        if self.eat('^') {
            let exponent = self.descend(Self::power)?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.descend(Self::unary)?);
        }
        if self.eat('+') {
            return self.descend(Self::unary);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<f64, String> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.descend(Self::expr)?;
                if !self.eat(')') {
                    return Err("Unbalanced parentheses".to_string());
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.function(),
            Some(c) => Err(format!("Unexpected '{}' at position {}", c, self.pos)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }

    fn number(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        let literal: String = self.chars[start..self.pos].iter().collect();
        literal
            .parse::<f64>()
            .map_err(|_| format!("Invalid number '{}'", literal))
    }

    fn function(&mut self) -> Result<f64, String> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if name == "pi" {
            return Ok(std::f64::consts::PI);
        }

        if !self.eat('(') {
            return Err(format!("Expected '(' after '{}'", name));
        }
        let arg = self.descend(Self::expr)?;
        if !self.eat(')') {
            return Err("Unbalanced parentheses".to_string());
        }

        match name.as_str() {
            "sqrt" if arg < 0.0 => Err("sqrt of a negative number".to_string()),
            "sqrt" => Ok(arg.sqrt()),
            "abs" => Ok(arg.abs()),
            "round" => Ok(arg.round()),
            "floor" => Ok(arg.floor()),
            "ceil" => Ok(arg.ceil()),
            _ => Err(format!("Unknown function '{}'", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_parentheses() {
        assert_eq!(evaluate("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(evaluate("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(evaluate("2 ^ 3 ^ 2").unwrap(), 512.0);
        assert_eq!(evaluate("-3 + 5").unwrap(), 2.0);
        assert_eq!(evaluate("10 % 4").unwrap(), 2.0);
        assert_eq!(evaluate("sqrt(16) + abs(-2)").unwrap(), 6.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("").is_err());
        assert_eq!(evaluate("1 / 0").unwrap_err(), "Division by zero");
        assert_eq!(evaluate("(1 + 2").unwrap_err(), "Unbalanced parentheses");
        assert!(evaluate("1 + + ").is_err());
        assert!(evaluate("2 $ 3").is_err());
        assert!(evaluate("foo(1)").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        assert_eq!(evaluate(&nested).unwrap_err(), "Expression nested too deeply");
        assert_eq!(evaluate(&"-".repeat(100_000)).unwrap_err(), "Expression nested too deeply");
        assert_eq!(evaluate(&"2^".repeat(100_000)).unwrap_err(), "Expression nested too deeply");
        assert_eq!(evaluate(&"sqrt(".repeat(100_000)).unwrap_err(), "Expression nested too deeply");

        let shallow = format!("{}7{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&shallow).unwrap(), 7.0);
    }

    #[tokio::test]
    async fn test_plugin_reports_deep_nesting() {
        let plugin = CalculatorPlugin::new();
        let nested = format!("{}1{}", "(".repeat(100_000), ")".repeat(100_000));
        let out = plugin.execute("evaluate", json!({"expression": nested})).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("Expression nested too deeply"));
    }

    #[tokio::test]
    async fn test_plugin_returns_integer_results() {
        let plugin = CalculatorPlugin::new();
        let out = plugin
            .execute("evaluate", json!({"expression": "(1200 - 950) * 4"}))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.data["result"], json!(1000));

        let out = plugin.execute("evaluate", json!({"expression": "1 / 4"})).await.unwrap();
        assert_eq!(out.data["result"], json!(0.25));
    }

    #[tokio::test]
    async fn test_plugin_missing_expression() {
        let plugin = CalculatorPlugin::new();
        let out = plugin.execute("evaluate", json!({})).await.unwrap();
        assert!(!out.success);
        assert_eq!(out.error.as_deref(), Some("Missing 'expression' parameter"));
    }
}

//! Built-in Local Tools
//!
//! Tools every agent starts with, independent of any provider process.

use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::tool::{Tool, ToolArgs};

/// All built-in tools, in registration order
pub fn builtin_tools() -> Vec<Tool> {
    vec![datetime_tool(), calculator_tool()]
}

/// Current date and time
pub fn datetime_tool() -> Tool {
    Tool::local_sync(
        "datetime",
        "Get the current date and time (UTC)",
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "Output format: 'iso', 'human', or 'unix'",
                    "enum": ["iso", "human", "unix"]
                }
            }
        }),
        current_datetime,
    )
}

fn current_datetime(args: ToolArgs) -> Result<Value> {
    let format = args.get("format").and_then(Value::as_str).unwrap_or("human");
    let now = chrono::Utc::now();

    let output = match format {
        "iso" => now.to_rfc3339(),
        "unix" => now.timestamp().to_string(),
        _ => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
    };

    Ok(json!({"datetime": output, "format": format}))
}

/// Arithmetic expression evaluator
pub fn calculator_tool() -> Tool {
    Tool::local_sync(
        "calculate",
        "Evaluate a mathematical expression with + - * / ^ and parentheses",
        json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "Expression to evaluate (e.g., '2 + 2', '(3 + 4) * 5')"
                }
            },
            "required": ["expression"]
        }),
        |args| {
            let expr = args
                .get("expression")
                .and_then(Value::as_str)
                .ok_or_else(|| AgentError::ToolExecution("missing 'expression' argument".into()))?;

            let result = evaluate_expression(expr).map_err(AgentError::ToolExecution)?;
            Ok(json!({"expression": expr, "result": result}))
        },
    )
}

/// Longest expression the calculator accepts; evaluation depth grows with length
const MAX_EXPRESSION_LEN: usize = 512;

/// Evaluate with `evalexpr`, treating every literal as a float
fn evaluate_expression(expr: &str) -> std::result::Result<f64, String> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err("empty expression".into());
    }
    if expr.len() > MAX_EXPRESSION_LEN {
        return Err(format!(
            "expression too long ({} characters, limit {MAX_EXPRESSION_LEN})",
            expr.len()
        ));
    }

    let context: evalexpr::HashMapContext = evalexpr::HashMapContext::new();
    let value = evalexpr::eval_with_context(&promote_integers(expr), &context)
        .map_err(|e| format!("cannot evaluate '{expr}': {e}"))?;
    let result = value
        .as_number()
        .map_err(|_| format!("'{expr}' is not a number"))?;

    if result.is_finite() {
        Ok(result)
    } else {
        Err("division by zero or overflow".into())
    }
}

/// Rewrite integer literals as floats so `7 / 2` is 3.5, not integer division
fn promote_integers(expr: &str) -> String {
    let chars: Vec<char> = expr.chars().collect();
    let mut out = String::with_capacity(expr.len() + 8);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let starts_literal = c.is_ascii_digit()
            && (i == 0 || !(chars[i - 1].is_alphanumeric() || matches!(chars[i - 1], '_' | '.')));
        if !starts_literal {
            out.push(c);
            i += 1;
            continue;
        }

        let begin = i;
        while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
            i += 1;
        }
        out.extend(&chars[begin..i]);

        let fractional = chars[begin..i].contains(&'.');
        let suffixed = i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_');
        if !fractional && !suffixed {
            out.push_str(".0");
        }
    }
    out
}

//! Small recursive evaluator for arithmetic/boolean/conditional expressions
//! against a sampled environment (spec §4.6).

use sdl_parser::{BinaryOp, Expr, ExprKind, UnaryOp};
use std::collections::HashMap;
use thiserror::Error;

pub type Environment = HashMap<String, f64>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("unresolved identifier `{0}`")]
    MissingIdentifier(String),
    #[error("expression kind is not valid in an arithmetic context: {0}")]
    UnsupportedExpression(String),
}

fn currency_multiplier(magnitude: Option<char>) -> f64 {
    match magnitude {
        Some('K') => 1e3,
        Some('M') => 1e6,
        Some('B') => 1e9,
        Some('T') => 1e12,
        _ => 1.0,
    }
}

/// Evaluates `expr` against `env`. Division by zero yields zero (mirrors the
/// source corpus); comparisons return `0.0`/`1.0`; logical operators
/// short-circuit on the `0.0`-is-false convention.
pub fn eval(expr: &Expr, env: &Environment) -> Result<f64, EvalError> {
    match &expr.kind {
        ExprKind::Number(n) => Ok(*n),
        // Percent literals store the percent value as-is; division by 100
        // happens only at specific interpretation sites (e.g. a distribution's
        // relative-sigma argument), never inside general formula evaluation.
        ExprKind::Percentage(p) => Ok(*p),
        ExprKind::Currency { value, magnitude, .. } => Ok(value * currency_multiplier(*magnitude)),
        ExprKind::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        ExprKind::Str(s) => Err(EvalError::UnsupportedExpression(format!("string literal {s:?}"))),
        ExprKind::Identifier(name) => {
            env.get(name).copied().ok_or_else(|| EvalError::MissingIdentifier(name.clone()))
        }
        ExprKind::Unary { op, operand } => {
            let v = eval(operand, env)?;
            Ok(match op {
                UnaryOp::Neg => -v,
                UnaryOp::Not => bool_to_f64(!is_truthy(v)),
                // Outside a distribution argument list `±x` degrades to its
                // magnitude; the validator flags this shape elsewhere.
                UnaryOp::PlusMinus => v,
            })
        }
        ExprKind::Binary { op, left, right } => eval_binary(*op, left, right, env),
        ExprKind::Conditional { condition, then_branch, else_branch } => {
            let cond = eval(condition, env)?;
            if is_truthy(cond) {
                eval(then_branch, env)
            } else {
                eval(else_branch, env)
            }
        }
        ExprKind::Distribution(_) => {
            Err(EvalError::UnsupportedExpression("distribution expression outside a sampling context".to_string()))
        }
        ExprKind::Model(_) => {
            Err(EvalError::UnsupportedExpression("model expression outside a trajectory context".to_string()))
        }
    }
}

fn eval_binary(op: BinaryOp, left: &Expr, right: &Expr, env: &Environment) -> Result<f64, EvalError> {
    // Logical operators short-circuit: the right operand is only evaluated
    // when the left doesn't already decide the result.
    match op {
        BinaryOp::And => {
            let l = eval(left, env)?;
            if !is_truthy(l) {
                return Ok(0.0);
            }
            let r = eval(right, env)?;
            return Ok(bool_to_f64(is_truthy(r)));
        }
        BinaryOp::Or => {
            let l = eval(left, env)?;
            if is_truthy(l) {
                return Ok(1.0);
            }
            let r = eval(right, env)?;
            return Ok(bool_to_f64(is_truthy(r)));
        }
        _ => {}
    }

    let l = eval(left, env)?;
    let r = eval(right, env)?;
    Ok(match op {
        BinaryOp::Add => l + r,
        BinaryOp::Sub => l - r,
        BinaryOp::Mul => l * r,
        BinaryOp::Div => {
            if r == 0.0 {
                0.0
            } else {
                l / r
            }
        }
        BinaryOp::Pow => l.powf(r),
        BinaryOp::Lt => bool_to_f64(l < r),
        BinaryOp::Gt => bool_to_f64(l > r),
        BinaryOp::Le => bool_to_f64(l <= r),
        BinaryOp::Ge => bool_to_f64(l >= r),
        BinaryOp::Eq => bool_to_f64(l == r),
        BinaryOp::Ne => bool_to_f64(l != r),
        BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
    })
}

fn is_truthy(v: f64) -> bool {
    v != 0.0
}

fn bool_to_f64(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdl_parser::parse;

    fn eval_formula(src: &str, env: &Environment) -> Result<f64, EvalError> {
        let full = format!(
            r#"scenario "T" {{ timeframe: 2020 -> 2021 impact i {{ formula: {src} }} simulate {{ runs: 1 seed: 1 }} }}"#
        );
        let (scenario, diags) = parse(&full);
        assert!(!diags.has_errors(), "{diags:?}");
        let scenario = scenario.unwrap();
        let formula = scenario.declarations.iter().find_map(|d| match d {
            sdl_parser::Declaration::Impact(i) => Some(i.formula.clone()),
            _ => None,
        }).unwrap();
        eval(&formula, env)
    }

    #[test]
    fn division_by_zero_yields_zero() {
        let env = Environment::new();
        assert_eq!(eval_formula("10 / 0", &env).unwrap(), 0.0);
    }

    #[test]
    fn comparisons_return_zero_or_one() {
        let env = Environment::new();
        assert_eq!(eval_formula("3 > 2", &env).unwrap(), 1.0);
        assert_eq!(eval_formula("3 < 2", &env).unwrap(), 0.0);
    }

    #[test]
    fn missing_identifier_is_an_error() {
        let env = Environment::new();
        let err = eval_formula("missing_var + 1", &env).unwrap_err();
        assert!(matches!(err, EvalError::MissingIdentifier(name) if name == "missing_var"));
    }

    #[test]
    fn logical_and_short_circuits() {
        let mut env = Environment::new();
        env.insert("x".to_string(), 0.0);
        // `y` is deliberately absent; if `&&` evaluated the right side anyway
        // this would fail with MissingIdentifier instead of returning 0.0.
        assert_eq!(eval_formula("x > 0 && y > 0", &env).unwrap(), 0.0);
    }

    #[test]
    fn precedence_matches_arithmetic_convention() {
        let env = Environment::new();
        assert_eq!(eval_formula("1 + 2 * 3", &env).unwrap(), 7.0);
        assert_eq!(eval_formula("2 ^ 3 + 1", &env).unwrap(), 9.0);
    }
}

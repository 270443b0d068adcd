//! Sensor formula evaluation: register placeholder resolution followed by
//! a constrained arithmetic evaluator (numbers, `+ - * /`, parentheses).

pub mod evaluator;
pub mod lexer;
pub mod parser;

pub use evaluator::{address_tokens, FormulaEvaluator};
pub use parser::{evaluate_expression, Expr};

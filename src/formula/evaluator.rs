use log::debug;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::parser::evaluate_expression;
use crate::modbus::{FunctionCode, RegisterReader, RegisterSpan};
use crate::utils::error::EvaluationError;

fn address_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b0[xX][0-9A-Fa-f]+\b").expect("valid address regex"))
}

/// Distinct register-address tokens in first-occurrence order.
pub fn address_tokens(formula: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for m in address_pattern().find_iter(formula) {
        if !tokens.contains(&m.as_str()) {
            tokens.push(m.as_str());
        }
    }
    tokens
}

pub fn parse_address(token: &str) -> Result<u16, EvaluationError> {
    let digits = &token[2..];
    u16::from_str_radix(digits, 16).map_err(|_| EvaluationError::InvalidAddress {
        token: token.to_string(),
    })
}

/// Computes derived sensor values from formulas such as `0x0001 * 0.1`.
///
/// Every hexadecimal token is a register address on the sensor's device.
/// Registers are read in first-occurrence order and the formula is
/// evaluated only after all of them resolved.
pub struct FormulaEvaluator {
    reader: Arc<dyn RegisterReader>,
    function: FunctionCode,
}

impl FormulaEvaluator {
    pub fn new(reader: Arc<dyn RegisterReader>, function: FunctionCode) -> Self {
        Self { reader, function }
    }

    pub async fn evaluate(
        &self,
        formula: &str,
        device_id: u8,
        signed: bool,
        span: RegisterSpan,
    ) -> Result<f64, EvaluationError> {
        let mut resolved: HashMap<&str, i64> = HashMap::new();
        for token in address_tokens(formula) {
            let register = parse_address(token)?;
            let value = self
                .reader
                .read_register(device_id, register, self.function, signed, span)
                .await?;
            resolved.insert(token, value);
        }

        let expression = if resolved.is_empty() {
            formula.to_string()
        } else {
            address_pattern()
                .replace_all(formula, |caps: &regex::Captures| {
                    let token = &caps[0];
                    resolved
                        .get(token)
                        .map(|v| v.to_string())
                        .unwrap_or_else(|| token.to_string())
                })
                .into_owned()
        };

        debug!("🧮 Device {}: '{}' -> '{}'", device_id, formula, expression);
        evaluate_expression(&expression)
    }
}

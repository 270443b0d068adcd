use crate::utils::error::EvaluationError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset in the source text.
    pub position: usize,
}

/// Splits an arithmetic expression into tokens.
///
/// Only decimal literals (with optional fraction and exponent), the four
/// operators and parentheses are accepted. Anything else is a syntax error.
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvaluationError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let c = bytes[pos];
        let kind = match c {
            b' ' | b'\t' | b'\r' | b'\n' => {
                pos += 1;
                continue;
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'0'..=b'9' | b'.' => {
                let (value, end) = scan_number(source, pos)?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    position: pos,
                });
                pos = end;
                continue;
            }
            _ => {
                let ch = source[pos..].chars().next().unwrap_or('?');
                return Err(EvaluationError::Syntax {
                    position: pos,
                    message: format!("unexpected character '{}'", ch),
                });
            }
        };
        tokens.push(Token { kind, position: pos });
        pos += 1;
    }

    Ok(tokens)
}

fn scan_number(source: &str, start: usize) -> Result<(f64, usize), EvaluationError> {
    let bytes = source.as_bytes();
    let mut end = start;

    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }

    let text = &source[start..end];
    text.parse::<f64>()
        .map(|value| (value, end))
        .map_err(|_| EvaluationError::Syntax {
            position: start,
            message: format!("malformed number '{}'", text),
        })
}

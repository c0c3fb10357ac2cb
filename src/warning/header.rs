//! Parsing for HTTP `Warning` header values (RFC 7234 section 5.5).
//!
//! The API server attaches warnings as `299 - "message"`. A single header
//! value may carry several comma separated warnings, each optionally followed
//! by a quoted date which is dropped here.

use thiserror::Error;

/// One warning parsed out of a `Warning` header value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarningHeader {
    pub code: u16,
    pub agent: String,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WarningHeaderError {
    #[error("invalid warning header: fewer than 3 segments")]
    TooFewSegments,
    #[error("invalid warning header: code segment {0:?} is not 3 digits")]
    InvalidCode(String),
    #[error("invalid warning header: empty agent segment")]
    EmptyAgent,
    #[error("invalid warning header: agent contains control characters")]
    InvalidAgent,
    #[error("invalid warning header: expected a quoted string")]
    MissingQuote,
    #[error("invalid warning header: unterminated quoted string")]
    UnterminatedQuote,
    #[error("invalid warning header: control character in quoted string")]
    ControlCharacter,
    #[error("invalid warning header: unexpected token {0:?} after warn-text")]
    UnexpectedToken(String),
}

/// Parses every warning contained in a single `Warning` header value.
///
/// Parsing stops at the first malformed warning. Warnings that were already
/// parsed from the same value are discarded along with it.
pub fn parse_warning_header(value: &str) -> Result<Vec<WarningHeader>, WarningHeaderError> {
    let mut warnings = Vec::new();
    let mut remainder = value.trim();
    while !remainder.is_empty() {
        let (warning, rest) = parse_one(remainder)?;
        warnings.push(warning);
        remainder = rest;
    }
    Ok(warnings)
}

fn parse_one(input: &str) -> Result<(WarningHeader, &str), WarningHeaderError> {
    let input = input.trim();
    let mut parts = input.splitn(3, ' ');
    let (code, agent, rest) = match (parts.next(), parts.next(), parts.next()) {
        (Some(code), Some(agent), Some(rest)) => (code, agent, rest),
        _ => return Err(WarningHeaderError::TooFewSegments),
    };

    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WarningHeaderError::InvalidCode(code.to_string()));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| WarningHeaderError::InvalidCode(code.to_string()))?;

    if agent.is_empty() {
        return Err(WarningHeaderError::EmptyAgent);
    }
    if agent.chars().any(char::is_control) {
        return Err(WarningHeaderError::InvalidAgent);
    }

    let (text, rest) = parse_quoted(rest)?;
    let mut rest = rest.trim_start();

    if rest.starts_with('"') {
        let (_date, after_date) = parse_quoted(rest)?;
        rest = after_date.trim_start();
    }

    if let Some(next) = rest.strip_prefix(',') {
        rest = next.trim_start();
    } else if !rest.is_empty() {
        return Err(WarningHeaderError::UnexpectedToken(rest.to_string()));
    }

    let warning = WarningHeader {
        code,
        agent: agent.to_string(),
        text,
    };
    Ok((warning, rest))
}

/// Reads a quoted-string from the start of `input`, returning the unescaped
/// contents and whatever follows the closing quote.
fn parse_quoted(input: &str) -> Result<(String, &str), WarningHeaderError> {
    let body = input
        .strip_prefix('"')
        .ok_or(WarningHeaderError::MissingQuote)?;

    let mut out = String::with_capacity(body.len());
    let mut escaped = false;
    for (i, c) in body.char_indices() {
        if c.is_control() {
            return Err(WarningHeaderError::ControlCharacter);
        }
        if escaped {
            out.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => return Ok((out, &body[i + c.len_utf8()..])),
            _ => out.push(c),
        }
    }
    Err(WarningHeaderError::UnterminatedQuote)
}

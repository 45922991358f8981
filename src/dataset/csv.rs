//! Minimal CSV codec for dataset artifacts.
//!
//! Fields are quoted when they contain the delimiter, a quote, whitespace or
//! a line break; embedded quotes are doubled.

use crate::{Error, Result};

const DELIMITER: char = ',';
const QUOTE: char = '"';

fn needs_quotes(field: &str) -> bool {
    field
        .chars()
        .any(|c| c == DELIMITER || c == QUOTE || c.is_whitespace())
}

/// Escape one field.
#[must_use]
pub fn escape(field: &str) -> String {
    if needs_quotes(field) {
        format!("{QUOTE}{}{QUOTE}", field.replace(QUOTE, "\"\""))
    } else {
        field.to_string()
    }
}

/// Append one record, newline terminated.
pub fn write_record<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(DELIMITER);
        }
        out.push_str(&escape(field.as_ref()));
    }
    out.push('\n');
}

/// Parse every record. Blank lines are skipped.
///
/// # Errors
/// Returns `Error::Storage` on an unterminated quoted field or stray
/// characters after a closing quote
pub fn parse(content: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut after_quote = false;
    let mut chars = content.chars().peekable();
    let mut line = 1_usize;

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                QUOTE if chars.peek() == Some(&QUOTE) => {
                    field.push(QUOTE);
                    chars.next();
                }
                QUOTE => {
                    quoted = false;
                    after_quote = true;
                }
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            QUOTE if field.is_empty() && !after_quote => quoted = true,
            DELIMITER => {
                record.push(std::mem::take(&mut field));
                after_quote = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                if !(record.is_empty() && field.is_empty() && !after_quote) {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                after_quote = false;
            }
            _ if after_quote => {
                return Err(Error::storage(format!(
                    "unexpected character {c:?} after closing quote on line {line}"
                )));
            }
            _ => field.push(c),
        }
    }

    if quoted {
        return Err(Error::storage(format!("unterminated quoted field on line {line}")));
    }
    if !(record.is_empty() && field.is_empty() && !after_quote) {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

//! Delimited row encoding shared by the payload and CSV import/export
//!
//! Every emitted field is double-quoted with embedded quotes doubled.
//! The reader also accepts bare (unquoted) fields so hand-edited CSV files
//! can be imported.

use crate::error::{VaultError, VaultResult};

/// Column names of the canonical 14-field row, in order
pub const COLUMNS: [&str; 14] = [
    "website",
    "password",
    "last_modified",
    "email",
    "username",
    "group",
    "remark",
    "two_factor",
    "recovery_email",
    "phone_number",
    "pw_age",
    "pw_reuse",
    "pw_complexity",
    "security_rating",
];

/// Row widths accepted on import: legacy prefixes plus the full shape
pub const ACCEPTED_WIDTHS: [usize; 6] = [2, 3, 4, 5, 10, 14];

pub fn check_width(width: usize) -> VaultResult<()> {
    if ACCEPTED_WIDTHS.contains(&width) {
        Ok(())
    } else {
        Err(VaultError::UnsupportedFileFormat(format!(
            "row has {} fields, expected one of {:?}",
            width, ACCEPTED_WIDTHS
        )))
    }
}

/// True if `row` is the header for its width
pub fn is_header(row: &[String]) -> bool {
    row.len() <= COLUMNS.len() && row.iter().zip(COLUMNS.iter()).all(|(a, b)| a == b)
}

fn quote(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 2);
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
    out
}

pub fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|f| quote(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}

/// Header line followed by one line per row, newline-terminated
pub fn encode_table<S: AsRef<str>>(rows: &[Vec<S>]) -> String {
    let mut out = encode_row(&COLUMNS);
    out.push('\n');
    for row in rows {
        out.push_str(&encode_row(row));
        out.push('\n');
    }
    out
}

/// Split text into rows of fields. Blank lines are skipped.
pub fn parse_rows(text: &str) -> VaultResult<Vec<Vec<String>>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            '"' => {
                return Err(VaultError::UnsupportedFileFormat(
                    "stray quote inside unquoted field".into(),
                ))
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                if field_started || !field.is_empty() || !row.is_empty() {
                    row.push(std::mem::take(&mut field));
                    rows.push(std::mem::take(&mut row));
                }
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(VaultError::UnsupportedFileFormat("unterminated quoted field".into()));
    }
    if field_started || !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }

    Ok(rows)
}

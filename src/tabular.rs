//! Delimited-text reader for ingest payloads.
//!
//! Comma-separated, `\n` or `\r\n` line endings, double-quoted fields with
//! `""` escapes. Quotes are lazy: a quote inside an unquoted field, or text
//! trailing a closing quote, is kept literally. Blank lines are skipped.

use crate::error::IngestError;

/// Split `text` into rows of fields.
///
/// Returns [`IngestError::Tabular`] only for a quoted field that is never
/// closed.
pub fn parse_rows(text: &str) -> Result<Vec<Vec<String>>, IngestError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut row_has_quotes = false;
    let mut line = 1usize;
    let mut quote_line = 1usize;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            ',' => row.push(std::mem::take(&mut field)),
            '"' if field.is_empty() => {
                in_quotes = true;
                row_has_quotes = true;
                quote_line = line;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                finish_row(&mut rows, &mut row, &mut field, row_has_quotes);
                row_has_quotes = false;
                line += 1;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(IngestError::Tabular {
            line: quote_line,
            message: "unterminated quoted field".to_string(),
        });
    }
    finish_row(&mut rows, &mut row, &mut field, row_has_quotes);

    Ok(rows)
}

fn finish_row(
    rows: &mut Vec<Vec<String>>,
    row: &mut Vec<String>,
    field: &mut String,
    row_has_quotes: bool,
) {
    let blank = row.is_empty() && field.is_empty() && !row_has_quotes;
    row.push(std::mem::take(field));
    let finished = std::mem::take(row);
    if !blank {
        rows.push(finished);
    }
}

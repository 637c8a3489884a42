//! Readers for delimited text and JSON record files

use serde_json::Value;

use super::{PreviewError, Table, SAMPLE_ROWS};

/// Cell spellings treated as missing values
const NULL_MARKERS: &[&str] = &["", "na", "n/a", "nan", "null", "none", "nat"];

pub(crate) fn is_null_marker(cell: &str) -> bool {
    let trimmed = cell.trim();
    NULL_MARKERS
        .iter()
        .any(|m| trimmed.eq_ignore_ascii_case(m))
}

/// Pick tab when the header line has more tabs than commas
pub(crate) fn sniff_delimiter(text: &str) -> char {
    let header = text.lines().next().unwrap_or("");
    let tabs = header.matches('\t').count();
    let commas = header.matches(',').count();
    if tabs > commas {
        '\t'
    } else if commas == 0 && header.matches(';').count() > 0 {
        ';'
    } else {
        ','
    }
}

/// Iterator over RFC-4180 records (quoted fields may span lines)
struct Records<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    delimiter: char,
}

impl<'a> Records<'a> {
    fn new(text: &'a str, delimiter: char) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        Self {
            chars: text.chars().peekable(),
            delimiter,
        }
    }
}

impl Iterator for Records<'_> {
    type Item = Vec<String>;

    fn next(&mut self) -> Option<Self::Item> {
        // Skip blank lines between records
        while let Some(&c) = self.chars.peek() {
            if c == '\n' || c == '\r' {
                self.chars.next();
            } else {
                break;
            }
        }
        self.chars.peek()?;

        let mut fields = Vec::new();
        let mut field = String::new();
        let mut in_quotes = false;

        while let Some(c) = self.chars.next() {
            if in_quotes {
                if c == '"' {
                    if self.chars.peek() == Some(&'"') {
                        field.push('"');
                        self.chars.next();
                    } else {
                        in_quotes = false;
                    }
                } else {
                    field.push(c);
                }
                continue;
            }

            match c {
                '"' if field.is_empty() => in_quotes = true,
                '\r' => {}
                '\n' => {
                    fields.push(std::mem::take(&mut field));
                    return Some(fields);
                }
                c if c == self.delimiter => fields.push(std::mem::take(&mut field)),
                c => field.push(c),
            }
        }

        fields.push(field);
        Some(fields)
    }
}

/// Read delimited text, keeping at most `sample_rows` data rows
pub(crate) fn read_delimited(text: &str, delimiter: char, sample_rows: usize) -> Table {
    let mut records = Records::new(text, delimiter);

    let columns: Vec<String> = match records.next() {
        Some(header) => dedupe_names(header.into_iter().map(|h| h.trim().to_string()).collect()),
        None => {
            return Table {
                columns: Vec::new(),
                rows: Vec::new(),
                total_rows: 0,
            }
        }
    };

    let mut rows = Vec::new();
    let mut total_rows = 0;
    for record in records {
        total_rows += 1;
        if rows.len() < sample_rows {
            let row = (0..columns.len())
                .map(|i| {
                    record
                        .get(i)
                        .filter(|cell| !is_null_marker(cell))
                        .map(|cell| cell.trim().to_string())
                })
                .collect();
            rows.push(row);
        }
    }

    Table {
        columns,
        rows,
        total_rows,
    }
}

/// Read a JSON array of objects (or a `{"data": [...]}` wrapper)
pub(crate) fn read_json(text: &str) -> Result<Table, PreviewError> {
    let value: Value = serde_json::from_str(text).map_err(|e| PreviewError::Parse {
        format: "json",
        message: e.to_string(),
    })?;

    let records = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(map)],
        },
        _ => {
            return Err(PreviewError::Parse {
                format: "json",
                message: "expected an array of records".to_string(),
            })
        }
    };

    Ok(records_to_table(records))
}

/// Read newline-delimited JSON objects
pub(crate) fn read_json_lines(text: &str) -> Result<Table, PreviewError> {
    let mut records = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| PreviewError::Parse {
            format: "jsonl",
            message: format!("line {}: {}", line_no + 1, e),
        })?;
        records.push(value);
    }
    Ok(records_to_table(records))
}

fn records_to_table(records: Vec<Value>) -> Table {
    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        if let Value::Object(map) = record {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    let total_rows = records.len();
    let rows = records
        .iter()
        .take(SAMPLE_ROWS)
        .map(|record| {
            columns
                .iter()
                .map(|col| record.get(col).and_then(cell_text))
                .collect()
        })
        .collect();

    Table {
        columns,
        rows,
        total_rows,
    }
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if is_null_marker(s) => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// Give blank or repeated header names unique labels, pandas style
fn dedupe_names(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for (i, name) in names.into_iter().enumerate() {
        let base = if name.is_empty() {
            format!("Unnamed: {}", i)
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut n = 1;
        while out.contains(&candidate) {
            candidate = format!("{}.{}", base, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

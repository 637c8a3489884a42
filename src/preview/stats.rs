//! Dtype inference, descriptive statistics and table rendering

use std::collections::{BTreeMap, HashMap};

use lazy_static::lazy_static;
use regex::Regex;

use super::{RichPreview, Table, HEAD_ROWS, SAMPLE_ROWS};

lazy_static! {
    static ref ISO_DATE: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}([ T]\d{2}:\d{2}(:\d{2}(\.\d+)?)?)?(Z|[+-]\d{2}:?\d{2})?$"
    )
    .expect("valid ISO date pattern");
    static ref SLASH_DATE: Regex =
        Regex::new(r"^\d{1,2}/\d{1,2}/\d{4}( \d{1,2}:\d{2}(:\d{2})?)?$").expect("valid slash date pattern");
}

/// Longest cell rendered in head/describe tables
const MAX_CELL_WIDTH: usize = 24;

fn is_bool(s: &str) -> bool {
    matches!(s, "true" | "false" | "True" | "False" | "TRUE" | "FALSE")
}

fn is_date(s: &str) -> bool {
    ISO_DATE.is_match(s) || SLASH_DATE.is_match(s)
}

/// Infer a pandas-style dtype name from the non-null values of a column
pub fn infer_dtype(values: &[&str]) -> &'static str {
    if values.is_empty() {
        return "object";
    }
    if values.iter().all(|v| v.parse::<i64>().is_ok()) {
        "int64"
    } else if values.iter().all(|v| v.parse::<f64>().is_ok()) {
        "float64"
    } else if values.iter().all(|v| is_bool(v)) {
        "bool"
    } else if values.iter().all(|v| is_date(v)) {
        "datetime64[ns]"
    } else {
        "object"
    }
}

fn is_numeric_dtype(dtype: &str) -> bool {
    dtype == "int64" || dtype == "float64"
}

/// Turn a parsed table into a preview
pub(crate) fn summarize(table: Table) -> RichPreview {
    let col_count = table.columns.len();
    let mut dtypes = BTreeMap::new();
    let mut null_counts = BTreeMap::new();
    let mut column_dtypes = Vec::with_capacity(col_count);

    for (i, name) in table.columns.iter().enumerate() {
        let values: Vec<&str> = table
            .rows
            .iter()
            .filter_map(|row| row.get(i).and_then(|c| c.as_deref()))
            .collect();
        let dtype = infer_dtype(&values);
        let nulls = table.rows.len() - values.len();

        dtypes.insert(name.clone(), dtype.to_string());
        null_counts.insert(name.clone(), nulls);
        column_dtypes.push(dtype);
    }

    RichPreview {
        shape: [table.total_rows, col_count],
        head: render_head(&table),
        describe: render_describe(&table, &column_dtypes),
        columns: table.columns,
        dtypes,
        null_counts,
        sampled: table.total_rows > SAMPLE_ROWS,
    }
}

fn render_head(table: &Table) -> String {
    let mut header = vec![String::new()];
    header.extend(table.columns.iter().cloned());

    let rows: Vec<Vec<String>> = table
        .rows
        .iter()
        .take(HEAD_ROWS)
        .enumerate()
        .map(|(idx, row)| {
            let mut cells = vec![idx.to_string()];
            cells.extend(
                row.iter()
                    .map(|c| c.clone().unwrap_or_else(|| "NaN".to_string())),
            );
            cells
        })
        .collect();

    render_table(&header, &rows)
}

fn render_describe(table: &Table, dtypes: &[&str]) -> String {
    let numeric: Vec<usize> = (0..dtypes.len())
        .filter(|&i| is_numeric_dtype(dtypes[i]))
        .collect();

    if !numeric.is_empty() {
        describe_numeric(table, &numeric)
    } else {
        describe_categorical(table)
    }
}

fn describe_numeric(table: &Table, columns: &[usize]) -> String {
    let labels = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];
    let stats: Vec<[Option<f64>; 8]> = columns
        .iter()
        .map(|&i| {
            let mut values: Vec<f64> = table
                .rows
                .iter()
                .filter_map(|row| row.get(i).and_then(|c| c.as_deref()))
                .filter_map(|v| v.parse::<f64>().ok())
                .collect();
            values.sort_by(|a, b| a.total_cmp(b));
            numeric_summary(&values)
        })
        .collect();

    let mut header = vec![String::new()];
    header.extend(columns.iter().map(|&i| table.columns[i].clone()));

    let rows: Vec<Vec<String>> = labels
        .iter()
        .enumerate()
        .map(|(stat_idx, label)| {
            let mut cells = vec![label.to_string()];
            cells.extend(stats.iter().map(|s| format_stat(s[stat_idx])));
            cells
        })
        .collect();

    render_table(&header, &rows)
}

/// count, mean, std, min, 25%, 50%, 75%, max over sorted values
fn numeric_summary(sorted: &[f64]) -> [Option<f64>; 8] {
    let n = sorted.len();
    if n == 0 {
        return [Some(0.0), None, None, None, None, None, None, None];
    }
    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };
    [
        Some(n as f64),
        Some(mean),
        std,
        Some(sorted[0]),
        Some(quantile(sorted, 0.25)),
        Some(quantile(sorted, 0.50)),
        Some(quantile(sorted, 0.75)),
        Some(sorted[n - 1]),
    ]
}

/// Linear-interpolated quantile of sorted, non-empty data
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

fn describe_categorical(table: &Table) -> String {
    let mut header = vec![String::new()];
    header.extend(table.columns.iter().cloned());

    let mut counts = vec!["count".to_string()];
    let mut uniques = vec!["unique".to_string()];
    let mut tops = vec!["top".to_string()];
    let mut freqs = vec!["freq".to_string()];

    for i in 0..table.columns.len() {
        let mut freq: HashMap<&str, usize> = HashMap::new();
        let mut first_seen: Vec<&str> = Vec::new();
        for value in table
            .rows
            .iter()
            .filter_map(|row| row.get(i).and_then(|c| c.as_deref()))
        {
            let entry = freq.entry(value).or_insert(0);
            if *entry == 0 {
                first_seen.push(value);
            }
            *entry += 1;
        }

        let count: usize = freq.values().sum();
        // Most frequent value; ties go to the value seen first
        let top = first_seen
            .iter()
            .fold(None::<(&str, usize)>, |best, v| {
                let f = freq[v];
                match best {
                    Some((_, bf)) if bf >= f => best,
                    _ => Some((*v, f)),
                }
            });

        counts.push(count.to_string());
        uniques.push(freq.len().to_string());
        tops.push(top.map(|(v, _)| v.to_string()).unwrap_or_else(|| "NaN".to_string()));
        freqs.push(top.map(|(_, f)| f.to_string()).unwrap_or_else(|| "NaN".to_string()));
    }

    render_table(&header, &[counts, uniques, tops, freqs])
}

fn format_stat(value: Option<f64>) -> String {
    match value {
        None => "NaN".to_string(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{:.1}", v),
        Some(v) => format!("{:.6}", v)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string(),
    }
}

fn clip(cell: &str) -> String {
    let single_line = cell.replace('\n', " ");
    if single_line.chars().count() <= MAX_CELL_WIDTH {
        single_line
    } else {
        let kept: String = single_line.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{}...", kept)
    }
}

/// Right-aligned plain-text table
fn render_table(header: &[String], rows: &[Vec<String>]) -> String {
    let header: Vec<String> = header.iter().map(|h| clip(h)).collect();
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|r| r.iter().map(|c| clip(c)).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let render_row = |cells: &[String]| -> String {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:>width$}", cell, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render_row(&header)];
    lines.extend(rows.iter().map(|r| render_row(r)));
    lines.join("\n")
}

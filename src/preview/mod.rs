//! Rich structural preview of tabular files
//!
//! Turns the raw bytes of an uploaded (or sandbox-generated) file into the
//! metadata the profiler and the prompt builder work from: shape, column
//! names, per-column dtype, the first rows, descriptive statistics and null
//! counts.
//!
//! ```text
//! bytes ──► parse (csv / tsv / json / jsonl) ──► sample ≤ SAMPLE_ROWS rows
//!                                                     │
//!                         infer dtypes ◄──────────────┤
//!                         describe()   ◄──────────────┤
//!                         head()       ◄──────────────┘
//! ```
//!
//! Statistics are computed over a bounded sample. `shape[0]` still reports
//! the true number of records because counting records is cheap compared
//! to keeping them.

mod parse;
mod stats;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use stats::infer_dtype;

/// Largest file accepted for previewing (10 MB)
pub const MAX_PREVIEW_BYTES: usize = 10 * 1024 * 1024;

/// Maximum number of data rows used for statistics
pub const SAMPLE_ROWS: usize = 5_000;

/// Number of rows rendered in `head`
pub const HEAD_ROWS: usize = 5;

/// Extensions the previewer understands
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "tsv", "txt", "json", "jsonl"];

/// Structural preview of a tabular file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichPreview {
    /// `[rows, cols]`, rows being the true total record count
    pub shape: [usize; 2],
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub head: String,
    pub describe: String,
    pub null_counts: BTreeMap<String, usize>,
    /// True when statistics were computed over a sample of the rows
    pub sampled: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("unsupported file type '{extension}' (supported: {})", SUPPORTED_EXTENSIONS.join(", "))]
    Unsupported { extension: String },
    #[error("file is {size} bytes, previews are limited to {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    #[error("file contains no tabular data")]
    Empty,
    #[error("failed to parse {format}: {message}")]
    Parse { format: &'static str, message: String },
}

/// Lower-cased extension of a file name, if any
pub fn extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Whether the file name has a tabular extension the previewer accepts
pub fn is_tabular(name: &str) -> bool {
    extension(name)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reject uploads before any parsing work is done
pub fn check_upload(name: &str, size: usize) -> Result<(), PreviewError> {
    if !is_tabular(name) {
        return Err(PreviewError::Unsupported {
            extension: extension(name).unwrap_or_default(),
        });
    }
    if size > MAX_PREVIEW_BYTES {
        return Err(PreviewError::TooLarge {
            size,
            limit: MAX_PREVIEW_BYTES,
        });
    }
    Ok(())
}

/// First `max_lines` lines of a file as text
///
/// Only the bytes up to the last kept newline are decoded.
pub fn cheap_preview(bytes: &[u8], max_lines: usize) -> String {
    let end = bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .nth(max_lines.saturating_sub(1))
        .map_or(bytes.len(), |(i, _)| i);
    let head = if max_lines == 0 { &bytes[..0] } else { &bytes[..end] };
    let text = String::from_utf8_lossy(head);
    text.lines().take(max_lines).collect::<Vec<_>>().join("\n")
}

/// Build a rich preview of the named file
pub fn preview_bytes(name: &str, bytes: &[u8]) -> Result<RichPreview, PreviewError> {
    check_upload(name, bytes.len())?;

    let text = String::from_utf8_lossy(bytes);
    let table = match extension(name).as_deref() {
        Some("json") => parse::read_json(&text)?,
        Some("jsonl") => parse::read_json_lines(&text)?,
        Some("tsv") => parse::read_delimited(&text, '\t', SAMPLE_ROWS),
        _ => parse::read_delimited(&text, parse::sniff_delimiter(&text), SAMPLE_ROWS),
    };

    if table.columns.is_empty() {
        return Err(PreviewError::Empty);
    }

    Ok(stats::summarize(table))
}

/// Parsed table: header plus the sampled rows and the true record count
#[derive(Debug, Clone)]
pub(crate) struct Table {
    pub columns: Vec<String>,
    /// Cells are `None` for null/missing values
    pub rows: Vec<Vec<Option<String>>>,
    pub total_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SALES: &str = "date,revenue,region\n\
        2024-01-01,100.5,north\n\
        2024-01-02,200,south\n\
        2024-01-03,,north\n";

    #[test]
    fn test_extension_detection() {
        assert_eq!(extension("data.CSV").as_deref(), Some("csv"));
        assert_eq!(extension(".hidden"), None);
        assert_eq!(extension("noext"), None);
        assert!(is_tabular("sales.tsv"));
        assert!(!is_tabular("photo.png"));
    }

    #[test]
    fn test_check_upload_limits() {
        assert!(matches!(
            check_upload("model.pkl", 10),
            Err(PreviewError::Unsupported { .. })
        ));
        assert!(matches!(
            check_upload("big.csv", MAX_PREVIEW_BYTES + 1),
            Err(PreviewError::TooLarge { limit: MAX_PREVIEW_BYTES, .. })
        ));
        assert!(check_upload("ok.csv", 1024).is_ok());
    }

    #[test]
    fn test_csv_preview() {
        let preview = preview_bytes("sales.csv", SALES.as_bytes()).unwrap();
        assert_eq!(preview.shape, [3, 3]);
        assert_eq!(preview.columns, vec!["date", "revenue", "region"]);
        assert_eq!(preview.dtypes["date"], "datetime64[ns]");
        assert_eq!(preview.dtypes["revenue"], "float64");
        assert_eq!(preview.dtypes["region"], "object");
        assert_eq!(preview.null_counts["revenue"], 1);
        assert_eq!(preview.null_counts["region"], 0);
        assert!(!preview.sampled);
        assert!(preview.head.contains("north"));
        assert!(preview.describe.contains("mean"));
    }

    #[test]
    fn test_json_records_preview() {
        let json = r#"[{"id": 1, "name": "a"}, {"id": 2, "name": null, "extra": true}]"#;
        let preview = preview_bytes("rows.json", json.as_bytes()).unwrap();
        assert_eq!(preview.shape, [2, 3]);
        assert_eq!(preview.columns, vec!["id", "name", "extra"]);
        assert_eq!(preview.dtypes["id"], "int64");
        assert_eq!(preview.null_counts["name"], 1);
        assert_eq!(preview.null_counts["extra"], 1);
    }

    #[test]
    fn test_sampling_reports_true_row_count() {
        let mut csv = String::from("x\n");
        for i in 0..(SAMPLE_ROWS + 250) {
            csv.push_str(&format!("{}\n", i));
        }
        let preview = preview_bytes("big.csv", csv.as_bytes()).unwrap();
        assert!(preview.sampled);
        assert_eq!(preview.shape, [SAMPLE_ROWS + 250, 1]);
    }

    #[test]
    fn test_empty_file_rejected() {
        assert!(matches!(
            preview_bytes("empty.csv", b""),
            Err(PreviewError::Empty)
        ));
    }

    #[test]
    fn test_cheap_preview_truncates_lines() {
        assert_eq!(cheap_preview(SALES.as_bytes(), 2), "date,revenue,region\n2024-01-01,100.5,north");
        assert_eq!(cheap_preview(SALES.as_bytes(), 0), "");
        assert_eq!(cheap_preview(b"a\nb", 5), "a\nb");
    }

    #[test]
    fn test_cheap_preview_ignores_bytes_past_the_cut() {
        let mut bytes = b"x,y\n1,2\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, b'\n']);
        assert_eq!(cheap_preview(&bytes, 2), "x,y\n1,2");
    }
}

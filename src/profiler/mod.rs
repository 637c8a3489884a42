//! Dataset profiler
//!
//! Classifies a tabular file from its [`RichPreview`] and produces a ranked
//! analysis playbook for the prompt.
//!
//! ```text
//! RichPreview ──► classify columns ──► ColumnCensus
//!                                          │
//!                 ┌────────────────────────┼──────────────────┐
//!                 ▼                        ▼                  ▼
//!          category scoring          tag thresholds     strategy gates
//!                 └──────────────► DatasetProfile ◄───────────┘
//! ```
//!
//! # Category tie-break
//!
//! Candidates are scored in [`CATEGORY_ORDER`]. A later candidate replaces
//! the current winner only with a strictly higher score, so equal scores
//! resolve to the category evaluated first.

pub mod columns;
pub mod strategy;

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::preview::RichPreview;
use columns::{classify, ColumnCensus};

pub use strategy::AnalysisStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TimeSeries,
    CrossSectional,
    TextHeavy,
    Geospatial,
    Transactional,
    HighDimensional,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::TimeSeries => "time_series",
            Category::CrossSectional => "cross_sectional",
            Category::TextHeavy => "text_heavy",
            Category::Geospatial => "geospatial",
            Category::Transactional => "transactional",
            Category::HighDimensional => "high_dimensional",
            Category::General => "general",
        }
    }
}

/// Order in which categories are scored (and ties resolved)
pub const CATEGORY_ORDER: [Category; 6] = [
    Category::TimeSeries,
    Category::Geospatial,
    Category::Transactional,
    Category::TextHeavy,
    Category::HighDimensional,
    Category::CrossSectional,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Temporal,
    Geospatial,
    Text,
    Transactional,
    HighDimensional,
    MissingData,
    NumericHeavy,
    CategoricalHeavy,
}

impl Tag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Temporal => "temporal",
            Tag::Geospatial => "geospatial",
            Tag::Text => "text",
            Tag::Transactional => "transactional",
            Tag::HighDimensional => "high_dimensional",
            Tag::MissingData => "missing_data",
            Tag::NumericHeavy => "numeric_heavy",
            Tag::CategoricalHeavy => "categorical_heavy",
        }
    }
}

/// Structural classification of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub category: Category,
    pub tags: BTreeSet<Tag>,
    pub numeric_ratio: f64,
    pub categorical_ratio: f64,
    pub has_datetime: bool,
    pub has_text: bool,
    pub has_missing_data: bool,
    pub row_count: usize,
    pub col_count: usize,
}

#[cfg(test)]
impl DatasetProfile {
    pub(crate) fn empty_for_tests(row_count: usize, col_count: usize) -> Self {
        Self {
            category: Category::General,
            tags: BTreeSet::new(),
            numeric_ratio: 0.0,
            categorical_ratio: 0.0,
            has_datetime: false,
            has_text: false,
            has_missing_data: false,
            row_count,
            col_count,
        }
    }
}

/// Profile plus its ranked strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfiledDataset {
    pub profile: DatasetProfile,
    pub strategies: Vec<AnalysisStrategy>,
}

/// Score a category, `None` when its structural precondition fails
fn score(category: Category, c: &ColumnCensus) -> Option<f64> {
    match category {
        Category::TimeSeries if c.datetime >= 1 && c.numeric >= 1 => {
            Some(2.0 + 3.0 * c.numeric_ratio())
        }
        Category::Geospatial if c.geo >= 2 => Some((3.0 + c.geo as f64).min(6.0)),
        Category::Transactional if c.amount >= 1 && c.identifier >= 1 => {
            let dated = if c.datetime >= 1 { 1.0 } else { 0.0 };
            Some((2.0 + c.amount as f64 + dated).min(6.0))
        }
        Category::TextHeavy if c.text >= 1 => Some((2.0 + 2.0 * c.text as f64).min(6.0)),
        Category::HighDimensional if c.total >= 20 && c.numeric >= 10 => {
            Some(3.0 + 3.0 * c.numeric_ratio())
        }
        Category::CrossSectional if c.numeric >= 1 => Some(1.0),
        _ => None,
    }
}

fn choose_category(census: &ColumnCensus) -> Category {
    let mut best: Option<(Category, f64)> = None;
    for category in CATEGORY_ORDER {
        if let Some(s) = score(category, census) {
            match best {
                Some((_, current)) if s <= current => {}
                _ => best = Some((category, s)),
            }
        }
    }
    best.map(|(c, _)| c).unwrap_or(Category::General)
}

fn collect_tags(c: &ColumnCensus) -> BTreeSet<Tag> {
    let mut tags = BTreeSet::new();
    if c.datetime >= 1 {
        tags.insert(Tag::Temporal);
    }
    if c.geo >= 2 {
        tags.insert(Tag::Geospatial);
    }
    if c.text >= 1 {
        tags.insert(Tag::Text);
    }
    let ledger_like = c.amount >= 3 && c.identifier >= 1 && c.datetime >= 1;
    let dated_payments = c.amount >= 1 && c.identifier >= 1 && c.datetime >= 1;
    if ledger_like || dated_payments {
        tags.insert(Tag::Transactional);
    }
    if c.total >= 20 {
        tags.insert(Tag::HighDimensional);
    }
    if c.with_missing >= 1 {
        tags.insert(Tag::MissingData);
    }
    if c.numeric_ratio() >= 0.7 {
        tags.insert(Tag::NumericHeavy);
    }
    if c.categorical_ratio() >= 0.6 {
        tags.insert(Tag::CategoricalHeavy);
    }
    tags
}

/// Profile a dataset from its structural preview
///
/// Returns `None` when the preview has no columns.
pub fn profile(preview: &RichPreview) -> Option<ProfiledDataset> {
    if preview.columns.is_empty() {
        return None;
    }

    let mut census = ColumnCensus::default();
    for name in &preview.columns {
        let dtype = preview.dtypes.get(name).map(String::as_str).unwrap_or("object");
        let nulls = preview.null_counts.get(name).copied().unwrap_or(0);
        census.add(classify(name, dtype), nulls);
    }

    let profile = DatasetProfile {
        category: choose_category(&census),
        tags: collect_tags(&census),
        numeric_ratio: census.numeric_ratio(),
        categorical_ratio: census.categorical_ratio(),
        has_datetime: census.datetime >= 1,
        has_text: census.text >= 1,
        has_missing_data: census.with_missing >= 1,
        row_count: preview.shape[0],
        col_count: census.total,
    };
    let strategies = strategy::select(&census, &profile);

    Some(ProfiledDataset {
        profile,
        strategies,
    })
}

impl ProfiledDataset {
    /// Prompt-ready description of the profile and its playbook
    pub fn describe(&self) -> String {
        let p = &self.profile;
        let mut out = String::new();
        let tags: Vec<&str> = p.tags.iter().map(Tag::as_str).collect();

        let _ = writeln!(
            out,
            "Dataset type: {} ({} rows x {} columns)",
            p.category.as_str(),
            p.row_count,
            p.col_count
        );
        if !tags.is_empty() {
            let _ = writeln!(out, "Tags: {}", tags.join(", "));
        }
        let _ = writeln!(
            out,
            "Numeric ratio: {:.2}, categorical ratio: {:.2}",
            p.numeric_ratio, p.categorical_ratio
        );
        let _ = writeln!(out, "Recommended analyses:");
        for (i, s) in self.strategies.iter().enumerate() {
            let _ = writeln!(out, "{}. {} (priority {}): {}", i + 1, s.name, s.priority, s.reason);
            for step in &s.steps {
                let _ = writeln!(out, "   - {}", step);
            }
        }
        out
    }
}

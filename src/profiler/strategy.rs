//! Analysis strategy catalog
//!
//! Every template carries its own gate. Selection is non-exclusive: every
//! template whose gate passes is included, then the list is stable-sorted by
//! descending priority so catalog order breaks ties.

use serde::{Deserialize, Serialize};

use super::columns::ColumnCensus;
use super::{DatasetProfile, Tag};

/// One recommended line of analysis for a dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisStrategy {
    pub name: String,
    pub reason: String,
    pub steps: Vec<String>,
    pub suggested_tools: Vec<String>,
    /// 1 (nice to have) ..= 10 (do first)
    pub priority: u8,
}

struct Template {
    name: &'static str,
    priority: u8,
    steps: &'static [&'static str],
    tools: &'static [&'static str],
    gate: fn(&ColumnCensus, &DatasetProfile) -> bool,
    reason: fn(&ColumnCensus, &DatasetProfile) -> String,
}

const CATALOG: &[Template] = &[
    Template {
        name: "Basic exploratory analysis",
        priority: 10,
        steps: &[
            "Load the file and confirm shape, dtypes and memory usage",
            "Summarize every column with describe(include='all')",
            "Inspect value counts of the main categorical columns",
            "Plot histograms of the key numeric columns",
        ],
        tools: &["profile_dataset", "execute_python"],
        gate: |_, _| true,
        reason: |_, p| {
            format!(
                "Establish a baseline for {} rows x {} columns before deeper work",
                p.row_count, p.col_count
            )
        },
    },
    Template {
        name: "Data quality and imputation",
        priority: 9,
        steps: &[
            "Quantify missing values per column and per row",
            "Check whether missingness correlates with other columns",
            "Choose drop, fill (median/mode) or model-based imputation per column",
            "Re-run summaries after cleaning and compare",
        ],
        tools: &["execute_python"],
        gate: |_, p| p.tags.contains(&Tag::MissingData),
        reason: |c, _| format!("{} column(s) contain missing values", c.with_missing),
    },
    Template {
        name: "Time series analysis",
        priority: 8,
        steps: &[
            "Parse the datetime column and sort by it",
            "Resample to a regular frequency and plot the trend",
            "Decompose into trend, seasonality and residual",
            "Check stationarity and autocorrelation",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.datetime >= 1 && c.numeric >= 1,
        reason: |c, _| {
            format!(
                "{} datetime column(s) alongside {} numeric measure(s)",
                c.datetime, c.numeric
            )
        },
    },
    Template {
        name: "Correlation analysis",
        priority: 7,
        steps: &[
            "Compute Pearson and Spearman correlation matrices",
            "Render a correlation heatmap",
            "List the strongest positive and negative pairs",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.numeric >= 3,
        reason: |c, _| format!("{} numeric columns allow pairwise relationships", c.numeric),
    },
    Template {
        name: "Distribution analysis",
        priority: 6,
        steps: &[
            "Plot histograms and box plots for numeric columns",
            "Measure skewness and kurtosis",
            "Flag outliers with the IQR rule",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.numeric >= 1,
        reason: |c, _| format!("{} numeric column(s) to characterize", c.numeric),
    },
    Template {
        name: "Geospatial analysis",
        priority: 6,
        steps: &[
            "Validate coordinate or location columns",
            "Aggregate measures by location",
            "Plot points or a choropleth of the aggregates",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.geo >= 2,
        reason: |c, _| format!("{} location-like columns detected", c.geo),
    },
    Template {
        name: "Transaction analysis",
        priority: 6,
        steps: &[
            "Aggregate amounts per entity identifier",
            "Compute frequency and monetary value per entity",
            "Look for unusually large or repeated transactions",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.amount >= 1 && c.identifier >= 1,
        reason: |c, _| {
            format!(
                "{} monetary column(s) keyed by {} identifier(s)",
                c.amount, c.identifier
            )
        },
    },
    Template {
        name: "Text analysis",
        priority: 5,
        steps: &[
            "Measure text length distributions",
            "Extract the most frequent terms and n-grams",
            "Estimate sentiment or topics where relevant",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.text >= 1,
        reason: |c, _| format!("{} free-text column(s) detected", c.text),
    },
    Template {
        name: "Categorical breakdown",
        priority: 5,
        steps: &[
            "Group numeric measures by each categorical column",
            "Compare group means and spreads",
            "Plot grouped bar charts",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.categorical >= 1 && c.numeric >= 1,
        reason: |c, _| {
            format!(
                "{} categorical column(s) can segment {} numeric measure(s)",
                c.categorical, c.numeric
            )
        },
    },
    Template {
        name: "Clustering and segmentation",
        priority: 4,
        steps: &[
            "Scale the numeric columns",
            "Pick k with the elbow or silhouette method",
            "Fit k-means and profile each cluster",
        ],
        tools: &["execute_python"],
        gate: |c, p| c.numeric >= 3 && p.row_count >= 50,
        reason: |c, p| {
            format!(
                "{} numeric features over {} rows support segmentation",
                c.numeric, p.row_count
            )
        },
    },
    Template {
        name: "Dimensionality reduction",
        priority: 4,
        steps: &[
            "Standardize numeric features",
            "Run PCA and plot explained variance",
            "Project onto the first two components",
        ],
        tools: &["execute_python"],
        gate: |c, _| c.numeric >= 10,
        reason: |c, _| format!("{} numeric features are hard to inspect pairwise", c.numeric),
    },
];

/// All unlocked strategies, highest priority first
pub fn select(census: &ColumnCensus, profile: &DatasetProfile) -> Vec<AnalysisStrategy> {
    let mut selected: Vec<AnalysisStrategy> = CATALOG
        .iter()
        .filter(|t| (t.gate)(census, profile))
        .map(|t| AnalysisStrategy {
            name: t.name.to_string(),
            reason: (t.reason)(census, profile),
            steps: t.steps.iter().map(|s| s.to_string()).collect(),
            suggested_tools: t.tools.iter().map(|s| s.to_string()).collect(),
            priority: t.priority,
        })
        .collect();

    // sort_by is stable, catalog order survives for equal priorities
    selected.sort_by(|a, b| b.priority.cmp(&a.priority));
    selected
}

//! Auto-executable tool implementations

use std::fmt::Write as _;

use serde_json::{json, Value};

use super::ToolContext;
use crate::files::FileAttachment;
use crate::preview::{self, PreviewError, RichPreview};
use crate::profiler::{self, AnalysisStrategy, ProfiledDataset};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no file named '{name}' (available: {available})")]
    FileNotFound { name: String, available: String },
    #[error("'{name}' has no columns to profile")]
    NoColumns { name: String },
    #[error("cannot preview '{name}': {source}")]
    Preview {
        name: String,
        #[source]
        source: PreviewError,
    },
}

pub(super) fn list_files(ctx: &ToolContext<'_>) -> Value {
    let files: Vec<Value> = ctx
        .files
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "size": f.size,
                "origin": f.origin(),
                "tabular": preview::is_tabular(&f.name),
            })
        })
        .collect();
    json!({ "files": files })
}

fn find<'a>(ctx: &ToolContext<'a>, name: &str) -> Result<&'a FileAttachment, ToolError> {
    ctx.files
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| ToolError::FileNotFound {
            name: name.to_string(),
            available: ctx
                .files
                .iter()
                .map(|f| f.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

fn profiled(file: &FileAttachment) -> Result<ProfiledDataset, ToolError> {
    let computed: RichPreview;
    let rich = match &file.rich_preview {
        Some(rich) => rich,
        None => {
            computed = preview::preview_bytes(&file.name, &file.content).map_err(|source| {
                ToolError::Preview {
                    name: file.name.clone(),
                    source,
                }
            })?;
            &computed
        }
    };
    profiler::profile(rich).ok_or_else(|| ToolError::NoColumns {
        name: file.name.clone(),
    })
}

pub(super) fn profile_dataset(ctx: &ToolContext<'_>, name: &str) -> Result<Value, ToolError> {
    let profiled = profiled(find(ctx, name)?)?;
    Ok(json!({
        "file": name,
        "profile": profiled.profile,
        "strategies": profiled.strategies,
    }))
}

pub(super) fn suggest_analysis(
    ctx: &ToolContext<'_>,
    name: &str,
    goal: Option<&str>,
) -> Result<Value, ToolError> {
    let profiled = profiled(find(ctx, name)?)?;
    let strategies = focus(profiled.strategies, goal);

    let mut plan = String::new();
    if let Some(goal) = goal {
        let _ = writeln!(plan, "Goal: {}", goal);
    }
    let mut n = 1;
    for strategy in &strategies {
        let _ = writeln!(plan, "{} ({})", strategy.name, strategy.reason);
        for step in &strategy.steps {
            let _ = writeln!(plan, "  {}. {}", n, step);
            n += 1;
        }
    }

    Ok(json!({
        "file": name,
        "category": profiled.profile.category,
        "plan": plan,
    }))
}

/// Move strategies mentioning any word of the goal to the front
///
/// The partition is stable, so priority order holds within both halves.
fn focus(strategies: Vec<AnalysisStrategy>, goal: Option<&str>) -> Vec<AnalysisStrategy> {
    let words: Vec<String> = goal
        .unwrap_or("")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3)
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return strategies;
    }

    let mentions = |s: &AnalysisStrategy| {
        let haystack = format!("{} {} {}", s.name, s.reason, s.steps.join(" ")).to_lowercase();
        words.iter().any(|w| haystack.contains(w.as_str()))
    };
    let (mut matched, rest): (Vec<_>, Vec<_>) = strategies.into_iter().partition(|s| mentions(s));
    matched.extend(rest);
    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files() -> Vec<FileAttachment> {
        let mut generated = FileAttachment::upload("plot.png", vec![0x89, 0x50]);
        generated.is_generated = true;
        vec![
            FileAttachment::upload(
                "sales.csv",
                b"date,revenue,region\n2024-01-01,10,north\n2024-01-02,12,south\n".to_vec(),
            ),
            generated,
        ]
    }

    #[test]
    fn test_list_files() {
        let files = files();
        let out = list_files(&ToolContext { files: &files });
        assert_eq!(out["files"][0]["name"], "sales.csv");
        assert_eq!(out["files"][0]["tabular"], true);
        assert_eq!(out["files"][1]["origin"], "generated");
    }

    #[test]
    fn test_profile_dataset() {
        let files = files();
        let out = profile_dataset(&ToolContext { files: &files }, "sales.csv").unwrap();
        assert_eq!(out["profile"]["category"], "time_series");
        assert_eq!(out["strategies"][0]["name"], "Basic exploratory analysis");
    }

    #[test]
    fn test_profile_without_stored_preview() {
        let mut files = files();
        files[0].rich_preview = None;
        let out = profile_dataset(&ToolContext { files: &files }, "sales.csv").unwrap();
        assert_eq!(out["profile"]["row_count"], 2);
    }

    #[test]
    fn test_missing_file_lists_available() {
        let files = files();
        let err = profile_dataset(&ToolContext { files: &files }, "nope.csv").unwrap_err();
        assert!(err.to_string().contains("sales.csv, plot.png"));
    }

    #[test]
    fn test_goal_reorders_plan() {
        let files = files();
        let out =
            suggest_analysis(&ToolContext { files: &files }, "sales.csv", Some("seasonality trend")).unwrap();
        let plan = out["plan"].as_str().unwrap();
        assert!(plan.starts_with("Goal: seasonality trend\nTime series analysis"));
        assert!(plan.contains("  1. Parse the datetime column"));
    }
}

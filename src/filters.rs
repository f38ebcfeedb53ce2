//! Cascading taxonomy filters: city → center → course → batch.
//!
//! Given what a caller has selected so far, work out which level comes next
//! and how to query its options.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterLevel {
    City,
    Center,
    Course,
    Batch,
}

impl FilterLevel {
    pub fn table(self) -> &'static str {
        match self {
            FilterLevel::City => "cities",
            FilterLevel::Center => "centers",
            FilterLevel::Course => "courses",
            FilterLevel::Batch => "batches",
        }
    }

    /// Column on this level's table that points at the previous level.
    pub fn parent_column(self) -> Option<&'static str> {
        match self {
            FilterLevel::City => None,
            FilterLevel::Center => Some("city"),
            FilterLevel::Course => Some("center_id"),
            FilterLevel::Batch => Some("course_id"),
        }
    }
}

/// Selections made so far. Blank values count as unselected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterSelection {
    pub city: Option<String>,
    pub center: Option<String>,
    pub course: Option<String>,
}

/// A resolved lookup: which table to read and the parent constraint, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelQuery {
    pub level: FilterLevel,
    pub parent: Option<(&'static str, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterOption {
    pub id: Value,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterOptions {
    pub level: FilterLevel,
    pub options: Vec<FilterOption>,
}

fn selected(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// The first level that is not yet selected. Selecting a level without its
/// parent is an error.
pub fn next_level(selection: &FilterSelection) -> Result<FilterLevel, String> {
    match (
        selected(&selection.city),
        selected(&selection.center),
        selected(&selection.course),
    ) {
        (None, None, None) => Ok(FilterLevel::City),
        (Some(_), None, None) => Ok(FilterLevel::Center),
        (Some(_), Some(_), None) => Ok(FilterLevel::Course),
        (Some(_), Some(_), Some(_)) => Ok(FilterLevel::Batch),
        (None, _, _) => Err("a city must be selected first".to_string()),
        (Some(_), None, Some(_)) => Err("a center must be selected before a course".to_string()),
    }
}

pub fn resolve(selection: &FilterSelection) -> Result<LevelQuery, String> {
    let level = next_level(selection)?;
    let parent_value = match level {
        FilterLevel::City => None,
        FilterLevel::Center => selected(&selection.city),
        FilterLevel::Course => selected(&selection.center),
        FilterLevel::Batch => selected(&selection.course),
    };
    let parent = level
        .parent_column()
        .zip(parent_value)
        .map(|(column, value)| (column, value.to_string()));

    Ok(LevelQuery { level, parent })
}

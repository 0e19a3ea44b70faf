use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Macro totals for one civil day in the reporting timezone. Sums are plain
/// numbers: a meal with a missing macro contributes zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMacroSummary {
    pub day: NaiveDate,
    pub kcal: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
}

/// Macro totals for one ISO week, keyed by its Monday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyMacroSummary {
    pub week_start: NaiveDate,
    pub kcal: f64,
    pub protein_g: f64,
    pub fat_g: f64,
    pub carbs_g: f64,
}

/// Extended-nutrition totals for one civil day. Unlike macros these stay
/// None when no meal that day carried the field, so "no data" and "zero
/// grams" remain distinguishable downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyExtrasSummary {
    pub day: NaiveDate,
    pub fats_total: Option<f64>,
    pub fats_saturated: Option<f64>,
    pub fats_mono: Option<f64>,
    pub fats_poly: Option<f64>,
    pub fats_trans: Option<f64>,
    pub omega6: Option<f64>,
    pub omega3: Option<f64>,
    /// Recomputed from the day's omega sums, not averaged per-meal ratios.
    pub omega_ratio: Option<f64>,
    pub fiber_total: Option<f64>,
    pub fiber_soluble: Option<f64>,
    pub fiber_insoluble: Option<f64>,
}

/// One day of the compliance series. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceDay {
    pub day: NaiveDate,
    pub compliant: bool,
}

/// Run-length unit of the compliance series. An ordered segment sequence
/// reconstructs the gap-filled boolean series exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub value: bool,
    pub len: usize,
}

/// Micronutrient mention with its frequency across a set of meals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicronutrientMention {
    pub name_amount: String,
    pub count: usize,
}

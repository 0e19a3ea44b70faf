use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Persisted meal entry as the capture pipeline stores it. `extras` carries
/// the extended nutrition payload: `{fats: {total, saturated, mono, poly,
/// trans, omega6, omega3}, fiber: {total, soluble, insoluble}, water_ml,
/// vegetables_g, is_sweet, ...}` — every field optional, values sometimes
/// numeric strings.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MealRow {
    pub id: Uuid,
    pub client_id: Uuid,
    pub title: Option<String>,
    pub portion_g: Option<i32>,
    pub kcal: Option<i32>,
    pub protein_g: Option<i32>,
    pub fat_g: Option<i32>,
    pub carbs_g: Option<i32>,
    pub flags: Option<Value>,
    pub micronutrients: Option<Value>,
    pub extras: Option<Value>,
    pub captured_at: DateTime<Utc>,
}

/// Flattened analytic view of a meal: extras expanded into typed columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MealRecord {
    pub captured_at: DateTime<Utc>,
    pub title: Option<String>,
    pub kcal: Option<f64>,
    pub protein_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fats_total: Option<f64>,
    pub fats_saturated: Option<f64>,
    pub fats_mono: Option<f64>,
    pub fats_poly: Option<f64>,
    pub fats_trans: Option<f64>,
    pub omega6: Option<f64>,
    pub omega3: Option<f64>,
    pub omega_ratio: Option<f64>,
    pub fiber_total: Option<f64>,
    pub fiber_soluble: Option<f64>,
    pub fiber_insoluble: Option<f64>,
    pub micronutrients: Vec<String>,
}

impl MealRecord {
    pub fn from_row(row: &MealRow) -> Self {
        let extras = row.extras.as_ref();
        let fats = extras.and_then(|e| e.get("fats"));
        let fiber = extras.and_then(|e| e.get("fiber"));

        let omega6 = fats.and_then(|f| coerce_f64(f.get("omega6")));
        let omega3 = fats.and_then(|f| coerce_f64(f.get("omega3")));
        let omega_ratio = omega_ratio(omega6, omega3);

        let micronutrients = row
            .micronutrients
            .as_ref()
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            captured_at: row.captured_at,
            title: row.title.clone(),
            kcal: row.kcal.map(f64::from),
            protein_g: row.protein_g.map(f64::from),
            fat_g: row.fat_g.map(f64::from),
            carbs_g: row.carbs_g.map(f64::from),
            fats_total: fats.and_then(|f| coerce_f64(f.get("total"))),
            fats_saturated: fats.and_then(|f| coerce_f64(f.get("saturated"))),
            fats_mono: fats.and_then(|f| coerce_f64(f.get("mono"))),
            fats_poly: fats.and_then(|f| coerce_f64(f.get("poly"))),
            fats_trans: fats.and_then(|f| coerce_f64(f.get("trans"))),
            omega6,
            omega3,
            omega_ratio,
            fiber_total: fiber.and_then(|f| coerce_f64(f.get("total"))),
            fiber_soluble: fiber.and_then(|f| coerce_f64(f.get("soluble"))),
            fiber_insoluble: fiber.and_then(|f| coerce_f64(f.get("insoluble"))),
            micronutrients,
        }
    }
}

/// omega6:omega3, rounded to two decimals. Skipped when omega3 is absent or
/// non-positive.
pub fn omega_ratio(omega6: Option<f64>, omega3: Option<f64>) -> Option<f64> {
    match (omega6, omega3) {
        (Some(six), Some(three)) if three > 0.0 => Some((six / three * 100.0).round() / 100.0),
        _ => None,
    }
}

/// Defensive numeric coercion: numbers pass through, numeric strings parse,
/// everything else (including non-finite values) is None.
pub fn coerce_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Integer variant of [`coerce_f64`]; truncates fractional values.
pub fn coerce_i32(value: Option<&Value>) -> Option<i32> {
    coerce_f64(value).map(|v| v as i32)
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Per-day habit record. Resolved columns (`water_ml`, `vegetables_g`,
/// `had_sweets`) already have manual-over-automatic precedence applied;
/// `extras` keeps both sides so the automatic pass can rerun at any time
/// without losing overrides.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DailyHabitLog {
    pub id: Uuid,
    pub client_id: Uuid,
    pub date: NaiveDate,
    pub water_ml: i32,
    pub vegetables_g: i32,
    pub had_sweets: bool,
    pub steps: Option<i32>,
    pub logged_meals: i32,
    pub total_kcal: i32,
    pub protein_g: i32,
    pub fat_g: i32,
    pub carbs_g: i32,
    pub extras: Json<DailyLogExtras>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Auto/manual bookkeeping behind the resolved columns. Manual fields are
/// written only by explicit override calls; the automatic pass rewrites
/// `sources` and `auto_had_sweets` and nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyLogExtras {
    #[serde(default)]
    pub sources: DailyLogSources,
    #[serde(default)]
    pub auto_had_sweets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_water_ml: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_vegetables_g: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_had_sweets: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyLogSources {
    #[serde(default)]
    pub auto_water_ml: i32,
    #[serde(default)]
    pub auto_vegetables_g: i32,
}

/// Manual override payload for one day. Unset fields fall through to the
/// automatic values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualLogUpdate {
    pub water_ml: Option<i32>,
    pub vegetables_g: Option<i32>,
    pub had_sweets: Option<bool>,
    pub steps: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extras_round_trip_keeps_manual_fields() {
        let extras = DailyLogExtras {
            sources: DailyLogSources {
                auto_water_ml: 500,
                auto_vegetables_g: 150,
            },
            auto_had_sweets: true,
            manual_water_ml: Some(1800),
            manual_vegetables_g: None,
            manual_had_sweets: Some(false),
        };

        let value = serde_json::to_value(&extras).unwrap();
        assert!(value.get("manual_vegetables_g").is_none());
        let back: DailyLogExtras = serde_json::from_value(value).unwrap();
        assert_eq!(back, extras);
    }

    #[test]
    fn empty_extras_deserialize_with_defaults() {
        let back: DailyLogExtras = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(back, DailyLogExtras::default());
    }
}

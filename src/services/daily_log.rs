use anyhow::Result;
use chrono::{FixedOffset, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{coerce_i32, DailyHabitLog, DailyLogExtras, ManualLogUpdate, MealRow};
use crate::services::meal_analytics::day_bounds_utc;

// Fallback when the capture pipeline did not set an explicit sweets flag.
static SWEET_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(sweets?|dessert|cake|chocolate|candy|cookie|pastry|donut|doughnut|ice\s*cream)\b")
        .expect("sweet keyword pattern is valid")
});

/// Truthy check for the loosely-typed sweets flags the pipeline stores:
/// booleans, non-zero numbers, and affirmative strings all count.
pub fn truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |v| v != 0.0),
        Value::String(s) => {
            let s = s.trim().to_lowercase();
            matches!(s.as_str(), "true" | "1" | "yes" | "да")
        }
        _ => false,
    }
}

/// A meal counts as sweet when its extras carry an explicit flag, or the
/// title matches the keyword heuristic.
pub fn is_sweet_meal(title: Option<&str>, extras: Option<&Value>) -> bool {
    let flagged = extras
        .map(|e| {
            ["is_sweet", "had_sweets", "sweet"]
                .iter()
                .filter_map(|key| e.get(key))
                .any(truthy_flag)
        })
        .unwrap_or(false);

    flagged || title.map_or(false, |t| SWEET_TITLE_RE.is_match(t))
}

/// Per-day values derived from the meal records alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoDailyTotals {
    pub water_ml: i32,
    pub vegetables_g: i32,
    pub had_sweets: bool,
    pub logged_meals: i32,
    pub total_kcal: i32,
    pub protein_g: i32,
    pub fat_g: i32,
    pub carbs_g: i32,
}

pub fn auto_totals(meals: &[MealRow]) -> AutoDailyTotals {
    let mut totals = AutoDailyTotals {
        logged_meals: meals.len() as i32,
        ..AutoDailyTotals::default()
    };

    for meal in meals {
        totals.total_kcal += meal.kcal.unwrap_or(0);
        totals.protein_g += meal.protein_g.unwrap_or(0);
        totals.fat_g += meal.fat_g.unwrap_or(0);
        totals.carbs_g += meal.carbs_g.unwrap_or(0);

        let extras = meal.extras.as_ref();
        totals.water_ml += extras
            .and_then(|e| coerce_i32(e.get("water_ml")))
            .unwrap_or(0);
        totals.vegetables_g += extras
            .and_then(|e| coerce_i32(e.get("vegetables_g")))
            .unwrap_or(0);
        totals.had_sweets =
            totals.had_sweets || is_sweet_meal(meal.title.as_deref(), extras);
    }

    totals
}

/// Resolved habit fields for the day after precedence is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedHabits {
    pub water_ml: i32,
    pub vegetables_g: i32,
    pub had_sweets: bool,
}

/// Rewrite the automatic side of the extras bookkeeping and resolve the
/// day's fields. Manual overrides always win for their field; the automatic
/// pass never clears them.
pub fn apply_automatic(
    mut extras: DailyLogExtras,
    totals: &AutoDailyTotals,
) -> (DailyLogExtras, ResolvedHabits) {
    extras.sources.auto_water_ml = totals.water_ml;
    extras.sources.auto_vegetables_g = totals.vegetables_g;
    extras.auto_had_sweets = totals.had_sweets;

    let resolved = ResolvedHabits {
        water_ml: extras.manual_water_ml.unwrap_or(totals.water_ml),
        vegetables_g: extras.manual_vegetables_g.unwrap_or(totals.vegetables_g),
        had_sweets: extras.manual_had_sweets.unwrap_or(totals.had_sweets),
    };

    (extras, resolved)
}

/// Merges per-day automatic aggregation from meals with manual overrides
/// into one [`DailyHabitLog`] row.
#[derive(Clone)]
pub struct DailyLogService {
    db: PgPool,
    reporting_offset: FixedOffset,
}

impl DailyLogService {
    pub fn new(db: PgPool, config: &EngineConfig) -> Self {
        Self {
            db,
            reporting_offset: config.reporting_offset(),
        }
    }

    async fn fetch_day_meals(&self, client_id: Uuid, day: NaiveDate) -> Result<Vec<MealRow>> {
        let (start, end) = day_bounds_utc(day, self.reporting_offset);
        let rows = sqlx::query_as::<_, MealRow>(
            "SELECT id, client_id, title, portion_g, kcal, protein_g, fat_g, carbs_g, \
             flags, micronutrients, extras, captured_at \
             FROM meals \
             WHERE client_id = $1 AND captured_at >= $2 AND captured_at < $3 \
             ORDER BY captured_at",
        )
        .bind(client_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn fetch_extras(
        &self,
        client_id: Uuid,
        day: NaiveDate,
    ) -> Result<Option<DailyLogExtras>> {
        let extras: Option<Json<DailyLogExtras>> = sqlx::query_scalar(
            "SELECT extras FROM daily_habit_logs WHERE client_id = $1 AND date = $2",
        )
        .bind(client_id)
        .bind(day)
        .fetch_optional(&self.db)
        .await?;
        Ok(extras.map(|json| json.0))
    }

    /// Re-derive the day's automatic values from its meal records and upsert
    /// the log row. Idempotent; stored manual overrides survive every rerun.
    /// `steps` is manual-only and is never touched here.
    pub async fn recalc_from_meals(
        &self,
        client_id: Uuid,
        day: NaiveDate,
    ) -> Result<DailyHabitLog> {
        let meals = self.fetch_day_meals(client_id, day).await?;
        let totals = auto_totals(&meals);
        let prior = self.fetch_extras(client_id, day).await?.unwrap_or_default();
        let (extras, resolved) = apply_automatic(prior, &totals);

        let now = Utc::now();
        let log: DailyHabitLog = sqlx::query_as(
            "INSERT INTO daily_habit_logs \
             (id, client_id, date, water_ml, vegetables_g, had_sweets, steps, logged_meals, \
              total_kcal, protein_g, fat_g, carbs_g, extras, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $14) \
             ON CONFLICT (client_id, date) DO UPDATE SET \
                 water_ml = EXCLUDED.water_ml, \
                 vegetables_g = EXCLUDED.vegetables_g, \
                 had_sweets = EXCLUDED.had_sweets, \
                 logged_meals = EXCLUDED.logged_meals, \
                 total_kcal = EXCLUDED.total_kcal, \
                 protein_g = EXCLUDED.protein_g, \
                 fat_g = EXCLUDED.fat_g, \
                 carbs_g = EXCLUDED.carbs_g, \
                 extras = EXCLUDED.extras, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(day)
        .bind(resolved.water_ml)
        .bind(resolved.vegetables_g)
        .bind(resolved.had_sweets)
        .bind(Option::<i32>::None)
        .bind(totals.logged_meals)
        .bind(totals.total_kcal)
        .bind(totals.protein_g)
        .bind(totals.fat_g)
        .bind(totals.carbs_g)
        .bind(Json(&extras))
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        Ok(log)
    }

    /// Record manual overrides for the day, then re-run the automatic pass
    /// so resolved columns and meal-derived sums stay consistent.
    pub async fn update_manual(
        &self,
        client_id: Uuid,
        day: NaiveDate,
        update: ManualLogUpdate,
    ) -> Result<DailyHabitLog> {
        info!("Manual daily log update for client {} on {}", client_id, day);

        let mut extras = self.fetch_extras(client_id, day).await?.unwrap_or_default();
        if let Some(water) = update.water_ml {
            extras.manual_water_ml = Some(water);
        }
        if let Some(vegetables) = update.vegetables_g {
            extras.manual_vegetables_g = Some(vegetables);
        }
        if let Some(sweets) = update.had_sweets {
            extras.manual_had_sweets = Some(sweets);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO daily_habit_logs \
             (id, client_id, date, water_ml, vegetables_g, had_sweets, steps, logged_meals, \
              total_kcal, protein_g, fat_g, carbs_g, extras, created_at, updated_at) \
             VALUES ($1, $2, $3, 0, 0, FALSE, $4, 0, 0, 0, 0, 0, $5, $6, $6) \
             ON CONFLICT (client_id, date) DO UPDATE SET \
                 extras = EXCLUDED.extras, \
                 steps = COALESCE(EXCLUDED.steps, daily_habit_logs.steps), \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(day)
        .bind(update.steps)
        .bind(Json(&extras))
        .bind(now)
        .execute(&self.db)
        .await?;

        self.recalc_from_meals(client_id, day).await
    }
}

use anyhow::Result;
use chrono::{Duration, FixedOffset, NaiveDate, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    ChallengeConfig, ChallengeDefinition, ChallengeMetric, ChallengeOption, ChallengePeriod,
    ChallengeProgress, ChallengeStatus, ChallengeWithProgress, ClientChallenge, ClientTargets,
    DailyHabitLog, DailyMacroSummary, ProgressSnapshot,
};
use crate::services::compliance::is_day_compliant;
use crate::services::meal_analytics::{
    daily_macro_summaries, day_bounds_utc, MealAnalyticsService,
};
use crate::services::load_client_targets;

const DEFAULT_DIFFICULTY_MIN_PCT: f64 = 0.05;
const DEFAULT_DIFFICULTY_MAX_PCT: f64 = 0.15;
const PROTEIN_FLOOR_G: f64 = 10.0;

struct SeedDefinition {
    code: &'static str,
    name: &'static str,
    description: &'static str,
    period: ChallengePeriod,
    metric: ChallengeMetric,
    config: ChallengeConfig,
}

fn default_catalog() -> Vec<SeedDefinition> {
    vec![
        SeedDefinition {
            code: "water_daily",
            name: "Water On Track",
            description: "Drink more clean water through the day.",
            period: ChallengePeriod::Daily,
            metric: ChallengeMetric::WaterMl,
            config: ChallengeConfig {
                baseline_days: Some(14),
                default_target: Some(1800.0),
                unit: Some("ml".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "log_meals_daily",
            name: "Log Every Meal",
            description: "Capture every meal of the day, no skips.",
            period: ChallengePeriod::Daily,
            metric: ChallengeMetric::LoggedMeals,
            config: ChallengeConfig {
                baseline_days: Some(14),
                min_meals: Some(3),
                unit: Some("meals".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "protein_balance_weekly",
            name: "Protein Balance",
            description: "Hit the protein corridor through the week.",
            period: ChallengePeriod::Weekly,
            metric: ChallengeMetric::ProteinBalance,
            config: ChallengeConfig {
                baseline_weeks: Some(4),
                tolerance_pct: Some(0.20),
                unit: Some("days".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "no_sweets_weekly",
            name: "Five Days Sweet-Free",
            description: "At least five days of the week without desserts or sweets.",
            period: ChallengePeriod::Weekly,
            metric: ChallengeMetric::SweetFreeDays,
            config: ChallengeConfig {
                baseline_weeks: Some(4),
                minimum_days: Some(5),
                unit: Some("days".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "vegetables_weekly",
            name: "Vegetable Minimum 400 g/day",
            description: "Eat at least 400 g of vegetables a day, several days a week.",
            period: ChallengePeriod::Weekly,
            metric: ChallengeMetric::VegetablesG,
            config: ChallengeConfig {
                baseline_weeks: Some(4),
                daily_min: Some(400.0),
                unit: Some("days".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "streak_21_30",
            name: "Streak 21 of 30",
            description: "Stay on plan at least 21 of the last 30 days.",
            period: ChallengePeriod::Monthly,
            metric: ChallengeMetric::ComplianceDays,
            config: ChallengeConfig {
                window_days: Some(30),
                required_days: Some(21),
                unit: Some("days".to_string()),
                ..ChallengeConfig::default()
            },
        },
        SeedDefinition {
            code: "steps_10k_monthly",
            name: "10k Steps on 20 Days",
            description: "Walk 10,000 steps on at least 20 days of the month.",
            period: ChallengePeriod::Monthly,
            metric: ChallengeMetric::Steps,
            config: ChallengeConfig {
                baseline_days: Some(30),
                daily_target: Some(10000.0),
                required_days: Some(20),
                unit: Some("days".to_string()),
                ..ChallengeConfig::default()
            },
        },
    ]
}

/// Difficulty step-up as a fraction. Defaults to the midpoint of the
/// definition's band, rounded to three decimals; an explicit override is
/// clamped into the band.
pub fn difficulty_factor(min_pct: f64, max_pct: f64, override_value: Option<f64>) -> f64 {
    let low = if min_pct > 0.0 {
        min_pct
    } else {
        DEFAULT_DIFFICULTY_MIN_PCT
    };
    let high = if max_pct > 0.0 {
        max_pct
    } else {
        DEFAULT_DIFFICULTY_MAX_PCT
    }
    .max(low);

    match override_value {
        Some(value) => value.clamp(low, high),
        None => ((low + high) / 2.0 * 1000.0).round() / 1000.0,
    }
}

/// Map (baseline, difficulty factor) to a personalized target plus
/// metric-specific meta. Monotonic non-decreasing in the factor; counts are
/// rounded up, continuous quantities to the nearest unit, and every target
/// is clamped into its metric's sane domain.
pub fn target_for(
    metric: ChallengeMetric,
    cfg: &ChallengeConfig,
    baseline: f64,
    factor: f64,
) -> (f64, Value) {
    let unit = |fallback: &str| cfg.unit.clone().unwrap_or_else(|| fallback.to_string());

    match metric {
        ChallengeMetric::WaterMl => {
            let base = cfg.default_target.unwrap_or(1800.0).max(baseline.max(0.0));
            let target = (base * (1.0 + factor)).round();
            (target, json!({ "unit": unit("ml") }))
        }
        ChallengeMetric::LoggedMeals => {
            let min_meals = cfg.min_meals.unwrap_or(3) as f64;
            let base = if baseline > 0.0 {
                min_meals.max(baseline.ceil())
            } else {
                min_meals
            };
            let target = min_meals.max((base * (1.0 + factor)).ceil());
            (target, json!({ "unit": unit("meals") }))
        }
        ChallengeMetric::ProteinBalance => {
            let target = (baseline.max(0.0) * (1.0 + factor)).ceil().clamp(3.0, 7.0);
            (
                target,
                json!({
                    "unit": unit("days"),
                    "tolerance_pct": cfg.tolerance_pct.unwrap_or(0.2),
                }),
            )
        }
        ChallengeMetric::SweetFreeDays => {
            let minimum = cfg.minimum_days.unwrap_or(5) as f64;
            let base = minimum.max(baseline);
            let target = minimum.max(((base * (1.0 + factor)).ceil()).min(7.0));
            (target, json!({ "unit": unit("days") }))
        }
        ChallengeMetric::VegetablesG => {
            let base_days = if baseline > 0.0 { baseline } else { 3.0 };
            let target = ((base_days * (1.0 + factor)).ceil()).clamp(3.0, 7.0);
            (
                target,
                json!({
                    "daily_requirement": cfg.daily_min.unwrap_or(400.0),
                    "unit": unit("days"),
                }),
            )
        }
        ChallengeMetric::ComplianceDays => {
            let required = cfg.required_days.unwrap_or(21) as f64;
            let window = cfg.window_days.unwrap_or(30) as f64;
            let base = required.max(baseline);
            let target = required.max(((base * (1.0 + factor)).ceil()).min(window));
            (
                target,
                json!({ "unit": unit("days"), "window_days": window }),
            )
        }
        ChallengeMetric::Steps => {
            let required = cfg.required_days.unwrap_or(20) as f64;
            let window = cfg.window_days.unwrap_or(30) as f64;
            let base = required.max(baseline);
            let target = required.max(((base * (1.0 + factor)).ceil()).min(window));
            (
                target,
                json!({
                    "unit": unit("days"),
                    "daily_steps_target": cfg.daily_target.unwrap_or(10000.0),
                }),
            )
        }
    }
}

fn average(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        sum += value;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Days in `[start, end]` whose logged protein sits inside the corridor
/// `max(10 g, target * tolerance)` around the protein target. Returns
/// (success_days, total_days); days without a log never succeed.
pub fn protein_success_days(
    logs_by_date: &HashMap<NaiveDate, &DailyHabitLog>,
    targets: &ClientTargets,
    tolerance: f64,
    start: NaiveDate,
    end: NaiveDate,
) -> (i64, i64) {
    let threshold = targets.protein_target_g;
    let mut total = 0;
    let mut success = 0;

    let mut day = start;
    while day <= end {
        total += 1;
        if threshold > 0.0 {
            if let Some(log) = logs_by_date.get(&day) {
                let allowed = PROTEIN_FLOOR_G.max(threshold * tolerance);
                if (f64::from(log.protein_g) - threshold).abs() <= allowed {
                    success += 1;
                }
            }
        }
        day += Duration::days(1);
    }

    (success, total)
}

pub fn count_sweet_free_days<'a>(logs: impl IntoIterator<Item = &'a DailyHabitLog>) -> i64 {
    logs.into_iter().filter(|log| !log.had_sweets).count() as i64
}

pub fn count_days_at_or_above<'a, F>(
    logs: impl IntoIterator<Item = &'a DailyHabitLog>,
    threshold: f64,
    field: F,
) -> i64
where
    F: Fn(&DailyHabitLog) -> Option<f64>,
{
    logs.into_iter()
        .filter(|log| field(log).map_or(false, |value| value >= threshold))
        .count() as i64
}

/// Compliant days among the daily summaries that fall inside `[start, end]`.
pub fn count_compliance_days(
    summaries: &[DailyMacroSummary],
    targets: &ClientTargets,
    start: NaiveDate,
    end: NaiveDate,
) -> i64 {
    summaries
        .iter()
        .filter(|summary| summary.day >= start && summary.day <= end)
        .filter(|summary| is_day_compliant(summary, targets))
        .count() as i64
}

/// Average per-bucket day count over 7-day buckets keyed by date offset from
/// the window start. Only buckets that contain at least one log participate
/// in the average.
pub fn weekly_bucket_average<F>(
    logs: &[DailyHabitLog],
    window_start: NaiveDate,
    hit: F,
) -> f64
where
    F: Fn(&DailyHabitLog) -> bool,
{
    let mut buckets: BTreeMap<i64, i64> = BTreeMap::new();
    for log in logs {
        let offset = (log.date - window_start).num_days();
        if offset < 0 {
            continue;
        }
        let entry = buckets.entry(offset / 7).or_insert(0);
        if hit(log) {
            *entry += 1;
        }
    }

    average(buckets.into_values().map(|count| count as f64))
}

/// Catalog management, baselines, adaptive targets and the challenge
/// lifecycle.
#[derive(Clone)]
pub struct ChallengeService {
    db: PgPool,
    analytics: MealAnalyticsService,
    reporting_offset: FixedOffset,
}

impl ChallengeService {
    pub fn new(db: PgPool, config: &EngineConfig) -> Self {
        let analytics = MealAnalyticsService::new(db.clone(), config);
        Self {
            db,
            analytics,
            reporting_offset: config.reporting_offset(),
        }
    }

    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.reporting_offset).date_naive()
    }

    /// Upsert the static catalog by code. Safe to call repeatedly; re-seeding
    /// refreshes the display copy and config without duplicating rows or
    /// touching per-deployment difficulty bands.
    pub async fn seed_default_definitions(&self) -> Result<Vec<ChallengeDefinition>> {
        info!("Seeding default challenge definitions");

        let now = Utc::now();
        let mut out = Vec::new();
        for seed in default_catalog() {
            let row: ChallengeDefinition = sqlx::query_as(
                "INSERT INTO challenge_definitions \
                 (id, code, name, description, period, metric, config, \
                  difficulty_min_pct, difficulty_max_pct, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10) \
                 ON CONFLICT (code) DO UPDATE SET \
                     name = EXCLUDED.name, \
                     description = EXCLUDED.description, \
                     period = EXCLUDED.period, \
                     metric = EXCLUDED.metric, \
                     config = EXCLUDED.config, \
                     updated_at = EXCLUDED.updated_at \
                 RETURNING *",
            )
            .bind(Uuid::new_v4())
            .bind(seed.code)
            .bind(seed.name)
            .bind(seed.description)
            .bind(seed.period)
            .bind(seed.metric)
            .bind(sqlx::types::Json(&seed.config))
            .bind(DEFAULT_DIFFICULTY_MIN_PCT)
            .bind(DEFAULT_DIFFICULTY_MAX_PCT)
            .bind(now)
            .fetch_one(&self.db)
            .await?;
            out.push(row);
        }

        Ok(out)
    }

    pub async fn get_definition_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ChallengeDefinition>> {
        let row = sqlx::query_as::<_, ChallengeDefinition>(
            "SELECT * FROM challenge_definitions WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    async fn fetch_definitions(&self) -> Result<HashMap<Uuid, ChallengeDefinition>> {
        let rows = sqlx::query_as::<_, ChallengeDefinition>(
            "SELECT * FROM challenge_definitions ORDER BY code",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    async fn fetch_logs_between(
        &self,
        client_id: Uuid,
        from: NaiveDate,
        to_inclusive: NaiveDate,
    ) -> Result<Vec<DailyHabitLog>> {
        let rows = sqlx::query_as::<_, DailyHabitLog>(
            "SELECT * FROM daily_habit_logs \
             WHERE client_id = $1 AND date >= $2 AND date <= $3 \
             ORDER BY date",
        )
        .bind(client_id)
        .bind(from)
        .bind(to_inclusive)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn compliance_days_between(
        &self,
        client_id: Uuid,
        targets: &ClientTargets,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<i64> {
        let (from, _) = day_bounds_utc(start, self.reporting_offset);
        let (_, to) = day_bounds_utc(end, self.reporting_offset);
        let records = self
            .analytics
            .fetch_meal_records(client_id, Some(from), Some(to))
            .await?;
        let summaries = daily_macro_summaries(&records, self.reporting_offset);
        Ok(count_compliance_days(&summaries, targets, start, end))
    }

    /// Historical aggregate of the definition's metric over its configured
    /// lookback window, ending yesterday.
    async fn baseline_for(
        &self,
        client_id: Uuid,
        definition: &ChallengeDefinition,
        today: NaiveDate,
    ) -> Result<f64> {
        let cfg = &definition.config.0;

        match definition.metric {
            ChallengeMetric::WaterMl => {
                let days = cfg.baseline_days.unwrap_or(14);
                let logs = self
                    .fetch_logs_between(
                        client_id,
                        today - Duration::days(days),
                        today - Duration::days(1),
                    )
                    .await?;
                Ok(average(
                    logs.iter()
                        .filter(|log| log.water_ml > 0)
                        .map(|log| f64::from(log.water_ml)),
                ))
            }
            ChallengeMetric::LoggedMeals => {
                let days = cfg.baseline_days.unwrap_or(14);
                let logs = self
                    .fetch_logs_between(
                        client_id,
                        today - Duration::days(days),
                        today - Duration::days(1),
                    )
                    .await?;
                Ok(average(
                    logs.iter()
                        .filter(|log| log.logged_meals > 0)
                        .map(|log| f64::from(log.logged_meals)),
                ))
            }
            ChallengeMetric::ProteinBalance => {
                let weeks = cfg.baseline_weeks.unwrap_or(4);
                let start = today - Duration::days(7 * weeks);
                let logs = self
                    .fetch_logs_between(client_id, start, today - Duration::days(1))
                    .await?;
                let logs_by_date: HashMap<NaiveDate, &DailyHabitLog> =
                    logs.iter().map(|log| (log.date, log)).collect();
                let targets = load_client_targets(&self.db, client_id).await?;
                let tolerance = cfg.tolerance_pct.unwrap_or(0.2);

                let mut total_success = 0i64;
                let mut buckets = 0i64;
                let mut cur = start;
                while cur < today {
                    let end = (cur + Duration::days(6)).min(today);
                    let (success, total) =
                        protein_success_days(&logs_by_date, &targets, tolerance, cur, end);
                    if total > 0 {
                        total_success += success;
                        buckets += 1;
                    }
                    cur = end + Duration::days(1);
                }
                Ok(if buckets > 0 {
                    total_success as f64 / buckets as f64
                } else {
                    0.0
                })
            }
            ChallengeMetric::SweetFreeDays => {
                let weeks = cfg.baseline_weeks.unwrap_or(4);
                let start = today - Duration::days(7 * weeks);
                let logs = self
                    .fetch_logs_between(client_id, start, today - Duration::days(1))
                    .await?;
                Ok(weekly_bucket_average(&logs, start, |log| !log.had_sweets))
            }
            ChallengeMetric::VegetablesG => {
                let weeks = cfg.baseline_weeks.unwrap_or(4);
                let start = today - Duration::days(7 * weeks);
                let daily_min = cfg.daily_min.unwrap_or(400.0);
                let logs = self
                    .fetch_logs_between(client_id, start, today - Duration::days(1))
                    .await?;
                Ok(weekly_bucket_average(&logs, start, |log| {
                    f64::from(log.vegetables_g) >= daily_min
                }))
            }
            ChallengeMetric::ComplianceDays => {
                let window = cfg.window_days.unwrap_or(30);
                let targets = load_client_targets(&self.db, client_id).await?;
                let days = self
                    .compliance_days_between(
                        client_id,
                        &targets,
                        today - Duration::days(window),
                        today,
                    )
                    .await?;
                Ok(days as f64)
            }
            ChallengeMetric::Steps => {
                let days = cfg.baseline_days.unwrap_or(30);
                let threshold = cfg.daily_target.unwrap_or(10000.0);
                let logs = self
                    .fetch_logs_between(
                        client_id,
                        today - Duration::days(days),
                        today - Duration::days(1),
                    )
                    .await?;
                Ok(count_days_at_or_above(&logs, threshold, |log| {
                    log.steps.map(f64::from)
                }) as f64)
            }
        }
    }

    /// Catalog with per-client previews: current baseline, suggested target
    /// at the default difficulty, and whether the challenge is already
    /// running.
    pub async fn list_available_challenges(&self, client_id: Uuid) -> Result<Vec<ChallengeOption>> {
        self.seed_default_definitions().await?;

        let active_codes: Vec<String> = sqlx::query_scalar(
            "SELECT d.code FROM client_challenges c \
             JOIN challenge_definitions d ON d.id = c.definition_id \
             WHERE c.client_id = $1 AND c.status = $2",
        )
        .bind(client_id)
        .bind(ChallengeStatus::Active)
        .fetch_all(&self.db)
        .await?;

        let today = self.today();
        let mut definitions: Vec<ChallengeDefinition> =
            self.fetch_definitions().await?.into_values().collect();
        definitions.sort_by(|a, b| a.code.cmp(&b.code));

        let mut options = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let baseline = self.baseline_for(client_id, &definition, today).await?;
            let factor = difficulty_factor(
                definition.difficulty_min_pct,
                definition.difficulty_max_pct,
                None,
            );
            let (target, meta) = target_for(definition.metric, &definition.config.0, baseline, factor);

            options.push(ChallengeOption {
                already_active: active_codes.contains(&definition.code),
                code: definition.code,
                name: definition.name,
                description: definition.description,
                period: definition.period,
                metric: definition.metric,
                suggested_baseline: baseline,
                suggested_target: target,
                difficulty_factor: factor,
                meta,
            });
        }

        Ok(options)
    }

    /// Create a challenge instance anchored at `[start, start + period − 1]`
    /// and run the first progress recomputation immediately.
    pub async fn assign_challenge(
        &self,
        client_id: Uuid,
        definition_code: &str,
        start_date: Option<NaiveDate>,
        difficulty_override: Option<f64>,
    ) -> Result<ClientChallenge> {
        let definition = self
            .get_definition_by_code(definition_code)
            .await?
            .ok_or_else(|| EngineError::UnknownChallenge(definition_code.to_string()))?;

        let today = self.today();
        let start = start_date.unwrap_or(today);
        let end = start + Duration::days(definition.period.length_days() - 1);

        let baseline = self.baseline_for(client_id, &definition, today).await?;
        let factor = difficulty_factor(
            definition.difficulty_min_pct,
            definition.difficulty_max_pct,
            difficulty_override,
        );
        let (target, meta) = target_for(definition.metric, &definition.config.0, baseline, factor);

        info!(
            "Assigning challenge {} to client {} ({} -> {})",
            definition.code, client_id, start, end
        );

        let now = Utc::now();
        let mut challenge: ClientChallenge = sqlx::query_as(
            "INSERT INTO client_challenges \
             (id, client_id, definition_id, status, start_date, end_date, \
              baseline_value, target_value, difficulty_factor, meta, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11) \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(client_id)
        .bind(definition.id)
        .bind(ChallengeStatus::Active)
        .bind(start)
        .bind(end)
        .bind(baseline)
        .bind(target)
        .bind(factor)
        .bind(&meta)
        .bind(now)
        .fetch_one(&self.db)
        .await?;

        let (_, status) = self.recalculate_progress(&challenge).await?;
        challenge.status = status;

        Ok(challenge)
    }

    /// Recompute the instance's progress from data inside its fixed date
    /// window, overwrite the live progress row, and advance the status.
    /// Idempotent: unchanged data produces an identical row and status.
    pub async fn recalculate_progress(
        &self,
        challenge: &ClientChallenge,
    ) -> Result<(ChallengeProgress, ChallengeStatus)> {
        let definition = sqlx::query_as::<_, ChallengeDefinition>(
            "SELECT * FROM challenge_definitions WHERE id = $1",
        )
        .bind(challenge.definition_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or(EngineError::DefinitionMissing(challenge.id))?;

        let cfg = &definition.config.0;
        let start = challenge.start_date;
        let end = challenge.end_date;
        let logs = self.fetch_logs_between(challenge.client_id, start, end).await?;
        let logs_by_date: HashMap<NaiveDate, &DailyHabitLog> =
            logs.iter().map(|log| (log.date, log)).collect();

        let unit = |fallback: &str| {
            cfg.unit
                .clone()
                .unwrap_or_else(|| fallback.to_string())
        };

        let (value, meta): (f64, Value) = match definition.metric {
            ChallengeMetric::WaterMl => {
                let value = logs_by_date
                    .get(&start)
                    .map(|log| f64::from(log.water_ml))
                    .unwrap_or(0.0);
                (value, json!({ "unit": unit("ml") }))
            }
            ChallengeMetric::LoggedMeals => {
                let value = logs_by_date
                    .get(&start)
                    .map(|log| f64::from(log.logged_meals))
                    .unwrap_or(0.0);
                (value, json!({ "unit": unit("meals") }))
            }
            ChallengeMetric::ProteinBalance => {
                let targets = load_client_targets(&self.db, challenge.client_id).await?;
                let tolerance = cfg.tolerance_pct.unwrap_or(0.2);
                let (success, total) =
                    protein_success_days(&logs_by_date, &targets, tolerance, start, end);
                (
                    success as f64,
                    json!({ "total_days": total, "unit": unit("days") }),
                )
            }
            ChallengeMetric::SweetFreeDays => (
                count_sweet_free_days(&logs) as f64,
                json!({ "unit": unit("days") }),
            ),
            ChallengeMetric::VegetablesG => {
                let requirement = challenge
                    .meta
                    .get("daily_requirement")
                    .and_then(Value::as_f64)
                    .or(cfg.daily_min)
                    .unwrap_or(400.0);
                let value = count_days_at_or_above(&logs, requirement, |log| {
                    Some(f64::from(log.vegetables_g))
                });
                (
                    value as f64,
                    json!({ "daily_requirement": requirement, "unit": unit("days") }),
                )
            }
            ChallengeMetric::ComplianceDays => {
                let targets = load_client_targets(&self.db, challenge.client_id).await?;
                let days = self
                    .compliance_days_between(challenge.client_id, &targets, start, end)
                    .await?;
                (
                    days as f64,
                    json!({
                        "unit": unit("days"),
                        "window_days": cfg.window_days.unwrap_or(30),
                    }),
                )
            }
            ChallengeMetric::Steps => {
                let threshold = challenge
                    .meta
                    .get("daily_steps_target")
                    .and_then(Value::as_f64)
                    .or(cfg.daily_target)
                    .unwrap_or(10000.0);
                let value =
                    count_days_at_or_above(&logs, threshold, |log| log.steps.map(f64::from));
                (
                    value as f64,
                    json!({ "daily_steps_target": threshold, "unit": unit("days") }),
                )
            }
        };

        let completed = value >= challenge.target_value;
        let status = if completed {
            ChallengeStatus::Completed
        } else if self.today() > challenge.end_date {
            ChallengeStatus::Failed
        } else {
            challenge.status
        };

        let progress: ChallengeProgress = sqlx::query_as(
            "INSERT INTO client_challenge_progress \
             (id, client_challenge_id, value, target_value, completed, \
              period_start, period_end, meta, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (client_challenge_id) DO UPDATE SET \
                 value = EXCLUDED.value, \
                 target_value = EXCLUDED.target_value, \
                 completed = EXCLUDED.completed, \
                 period_start = EXCLUDED.period_start, \
                 period_end = EXCLUDED.period_end, \
                 meta = EXCLUDED.meta, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(challenge.id)
        .bind(value)
        .bind(challenge.target_value)
        .bind(completed)
        .bind(challenge.start_date)
        .bind(challenge.end_date)
        .bind(&meta)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        sqlx::query("UPDATE client_challenges SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(challenge.id)
            .bind(status)
            .bind(Utc::now())
            .execute(&self.db)
            .await?;

        Ok((progress, status))
    }

    /// Active and completed instances with freshly recomputed progress,
    /// newest first.
    pub async fn active_challenges_with_progress(
        &self,
        client_id: Uuid,
    ) -> Result<Vec<ChallengeWithProgress>> {
        let challenges = self.fetch_refreshable(client_id).await?;
        let definitions = self.fetch_definitions().await?;

        let mut out = Vec::with_capacity(challenges.len());
        for mut challenge in challenges {
            let (progress, status) = self.recalculate_progress(&challenge).await?;
            challenge.status = status;

            let definition = definitions
                .get(&challenge.definition_id)
                .ok_or(EngineError::DefinitionMissing(challenge.id))?;

            out.push(ChallengeWithProgress {
                id: challenge.id,
                code: definition.code.clone(),
                name: definition.name.clone(),
                description: definition.description.clone(),
                period: definition.period,
                status: challenge.status,
                start_date: challenge.start_date,
                end_date: challenge.end_date,
                baseline_value: challenge.baseline_value,
                target_value: challenge.target_value,
                difficulty_factor: challenge.difficulty_factor,
                meta: challenge.meta.clone(),
                progress: ProgressSnapshot::from(&progress),
            });
        }

        Ok(out)
    }

    /// Recompute progress for every refreshable instance of the client.
    pub async fn refresh_all_active(&self, client_id: Uuid) -> Result<()> {
        let challenges = self.fetch_refreshable(client_id).await?;
        for challenge in &challenges {
            self.recalculate_progress(challenge).await?;
        }
        Ok(())
    }

    async fn fetch_refreshable(&self, client_id: Uuid) -> Result<Vec<ClientChallenge>> {
        let rows = sqlx::query_as::<_, ClientChallenge>(
            "SELECT * FROM client_challenges \
             WHERE client_id = $1 AND (status = $2 OR status = $3) \
             ORDER BY start_date DESC",
        )
        .bind(client_id)
        .bind(ChallengeStatus::Active)
        .bind(ChallengeStatus::Completed)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }
}

use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{
    BadgeCode, BadgeEvaluation, BadgeStatus, ClientTargets, ComplianceDay, DailyExtrasSummary,
    DailyMacroSummary, MealRecord, Segment,
};
use crate::services::meal_analytics::{
    daily_extras_summaries, daily_macro_summaries, MealAnalyticsService,
};
use crate::services::{compliance, load_client_targets, streaks};

const STEADY_WEEK_DAYS: f64 = 7.0;
const FIBER_WINDOW_DAYS: usize = 7;
const FIBER_MIN_DAYS: f64 = 3.0;
const FIBER_TARGET_AVG_G: f64 = 25.0;
const OMEGA_WINDOW_DAYS: usize = 7;
const OMEGA_MIN_DAYS: f64 = 3.0;
const OMEGA_RATIO_RANGE: (f64, f64) = (2.0, 5.0);
const RETURN_MIN_CURRENT: f64 = 3.0;
const RETURN_MIN_BREAK: f64 = 3.0;
const RETURN_MIN_PREVIOUS_BEST: f64 = 5.0;

/// Everything a badge evaluator may look at, assembled once per client and
/// shared across all five evaluators.
#[derive(Debug, Clone)]
pub struct BadgeContext {
    pub total_meals: usize,
    pub daily_macros: Vec<DailyMacroSummary>,
    pub daily_extras: Vec<DailyExtrasSummary>,
    pub targets: ClientTargets,
    pub compliance_series: Vec<bool>,
    pub segments: Vec<Segment>,
    pub current_streak: usize,
    pub best_streak: usize,
}

impl BadgeContext {
    /// Pure assembly from flattened meal records: bucket to days, run the
    /// compliance check per day, gap-fill and segment the series.
    pub fn assemble(records: &[MealRecord], targets: ClientTargets, offset: FixedOffset) -> Self {
        let daily_macros = daily_macro_summaries(records, offset);
        let daily_extras = daily_extras_summaries(records, offset);

        let compliance_days: Vec<ComplianceDay> = daily_macros
            .iter()
            .map(|summary| ComplianceDay {
                day: summary.day,
                compliant: compliance::is_day_compliant(summary, &targets),
            })
            .collect();

        let compliance_series = streaks::fill_gaps(&compliance_days);
        let segments = streaks::segments(&compliance_series);
        let current_streak = streaks::current_streak(&compliance_series);
        let best_streak = streaks::best_streak(&segments);

        Self {
            total_meals: records.len(),
            daily_macros,
            daily_extras,
            targets,
            compliance_series,
            segments,
            current_streak,
            best_streak,
        }
    }
}

/// Evaluate one badge. Deterministic and idempotent: the same context always
/// produces the same evaluation.
pub fn evaluate_badge(code: BadgeCode, ctx: &BadgeContext) -> BadgeEvaluation {
    match code {
        BadgeCode::FirstMeal => eval_first_meal(ctx),
        BadgeCode::SteadyWeek => eval_steady_week(ctx),
        BadgeCode::FiberFan => eval_fiber_fan(ctx),
        BadgeCode::OmegaBalance => eval_omega_balance(ctx),
        BadgeCode::HeroReturn => eval_hero_return(ctx),
    }
}

/// Evaluate the whole catalog in order, clamping progress into [0, 1].
pub fn evaluate_all(ctx: &BadgeContext) -> Vec<BadgeStatus> {
    BadgeCode::ALL
        .iter()
        .map(|&code| {
            let definition = code.definition();
            let evaluation = evaluate_badge(code, ctx);
            BadgeStatus {
                code,
                title: definition.title.to_string(),
                description: definition.description.to_string(),
                earned: evaluation.earned,
                progress: evaluation.progress.clamp(0.0, 1.0),
                meta: evaluation.meta,
                latest_award_at: None,
            }
        })
        .collect()
}

fn meta(entries: &[(&str, f64)]) -> HashMap<String, f64> {
    entries
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

fn eval_first_meal(ctx: &BadgeContext) -> BadgeEvaluation {
    let earned = ctx.total_meals > 0;
    BadgeEvaluation {
        earned,
        progress: if earned { 1.0 } else { 0.0 },
        meta: meta(&[("total_meals", ctx.total_meals as f64)]),
    }
}

fn eval_steady_week(ctx: &BadgeContext) -> BadgeEvaluation {
    let streak = ctx.current_streak as f64;
    BadgeEvaluation {
        earned: streak >= STEADY_WEEK_DAYS,
        progress: (streak / STEADY_WEEK_DAYS).min(1.0),
        meta: meta(&[
            ("current_streak", streak),
            ("best_streak", ctx.best_streak as f64),
        ]),
    }
}

fn eval_fiber_fan(ctx: &BadgeContext) -> BadgeEvaluation {
    let window_start = ctx.daily_extras.len().saturating_sub(FIBER_WINDOW_DAYS);
    let window = &ctx.daily_extras[window_start..];
    if window.is_empty() {
        return BadgeEvaluation {
            earned: false,
            progress: 0.0,
            meta: meta(&[("days", 0.0), ("avg_fiber", 0.0)]),
        };
    }

    let days_count = window.len() as f64;
    // A logged day without fiber data counts as zero grams, not as no day.
    let avg_fiber = window
        .iter()
        .map(|day| day.fiber_total.unwrap_or(0.0))
        .sum::<f64>()
        / days_count;

    let earned = days_count >= FIBER_MIN_DAYS && avg_fiber >= FIBER_TARGET_AVG_G;
    let coverage_progress = (days_count / FIBER_MIN_DAYS).min(1.0);
    let avg_progress = (avg_fiber / FIBER_TARGET_AVG_G).min(1.0);
    BadgeEvaluation {
        earned,
        progress: ((coverage_progress + avg_progress) / 2.0).min(1.0),
        meta: meta(&[
            ("days", days_count),
            ("avg_fiber", (avg_fiber * 100.0).round() / 100.0),
        ]),
    }
}

fn eval_omega_balance(ctx: &BadgeContext) -> BadgeEvaluation {
    let window_start = ctx.daily_extras.len().saturating_sub(OMEGA_WINDOW_DAYS);
    let window = &ctx.daily_extras[window_start..];
    if window.is_empty() {
        return BadgeEvaluation {
            earned: false,
            progress: 0.0,
            meta: meta(&[("days", 0.0), ("in_range", 0.0)]),
        };
    }

    let ratios: Vec<f64> = window.iter().filter_map(|day| day.omega_ratio).collect();
    let (lo, hi) = OMEGA_RATIO_RANGE;
    let in_range = ratios.iter().filter(|&&r| r >= lo && r <= hi).count() as f64;

    BadgeEvaluation {
        earned: in_range >= OMEGA_MIN_DAYS,
        progress: (in_range / OMEGA_MIN_DAYS).min(1.0),
        meta: meta(&[("days", ratios.len() as f64), ("in_range", in_range)]),
    }
}

fn eval_hero_return(ctx: &BadgeContext) -> BadgeEvaluation {
    let segments = &ctx.segments;
    let Some(last) = segments.last().filter(|s| s.value) else {
        // No trailing compliant run: nothing to come back with.
        return BadgeEvaluation {
            earned: false,
            progress: 0.0,
            meta: meta(&[
                ("current_streak", ctx.current_streak as f64),
                ("previous_best", ctx.best_streak as f64),
                ("break_length", 0.0),
            ]),
        };
    };

    let current_len = last.len as f64;
    let break_len = match segments.len().checked_sub(2).map(|i| segments[i]) {
        Some(segment) if !segment.value => segment.len as f64,
        _ => 0.0,
    };

    let mut previous_best = 0.0f64;
    if segments.len() >= 3 {
        // Search backwards; stop once a qualifying streak is found.
        for segment in segments[..segments.len() - 2].iter().rev() {
            if segment.value {
                previous_best = previous_best.max(segment.len as f64);
                if previous_best >= RETURN_MIN_PREVIOUS_BEST {
                    break;
                }
            }
        }
    }

    let parts = [
        (current_len / RETURN_MIN_CURRENT).min(1.0),
        if previous_best > 0.0 {
            (previous_best / RETURN_MIN_PREVIOUS_BEST).min(1.0)
        } else {
            0.0
        },
        if break_len > 0.0 {
            (break_len / RETURN_MIN_BREAK).min(1.0)
        } else {
            0.0
        },
    ];
    let progress = parts.iter().sum::<f64>() / parts.len() as f64;

    BadgeEvaluation {
        earned: current_len >= RETURN_MIN_CURRENT
            && break_len >= RETURN_MIN_BREAK
            && previous_best >= RETURN_MIN_PREVIOUS_BEST,
        progress: progress.min(1.0),
        meta: meta(&[
            ("current_streak", ctx.current_streak as f64),
            ("previous_best", previous_best),
            ("break_length", break_len),
        ]),
    }
}

/// Badge evaluation over persisted data, plus award bookkeeping.
#[derive(Clone)]
pub struct BadgeService {
    db: PgPool,
    analytics: MealAnalyticsService,
    reporting_offset: FixedOffset,
}

impl BadgeService {
    pub fn new(db: PgPool, config: &EngineConfig) -> Self {
        let analytics = MealAnalyticsService::new(db.clone(), config);
        Self {
            db,
            analytics,
            reporting_offset: config.reporting_offset(),
        }
    }

    async fn build_context(&self, client_id: Uuid) -> Result<BadgeContext> {
        let records = self
            .analytics
            .fetch_meal_records(client_id, None, None)
            .await?;
        let targets = load_client_targets(&self.db, client_id).await?;
        Ok(BadgeContext::assemble(
            &records,
            targets,
            self.reporting_offset,
        ))
    }

    /// Evaluate all badges for the client. Read-only: no award rows are
    /// touched.
    pub async fn evaluate_badges(&self, client_id: Uuid) -> Result<Vec<BadgeStatus>> {
        let ctx = self.build_context(client_id).await?;
        Ok(evaluate_all(&ctx))
    }

    /// Evaluate all badges and sync award rows. One row per (client, badge),
    /// updated in place; `latest_award_at` is frozen at the first earn, so a
    /// second call on unchanged data returns identical statuses and writes
    /// no new rows.
    pub async fn refresh_client_badges(&self, client_id: Uuid) -> Result<Vec<BadgeStatus>> {
        info!("Refreshing badges for client {}", client_id);

        let ctx = self.build_context(client_id).await?;
        let mut statuses = evaluate_all(&ctx);

        let existing: Vec<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT badge_code, latest_award_at FROM client_badge_awards WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_all(&self.db)
        .await?;
        let existing: HashMap<String, Option<DateTime<Utc>>> = existing.into_iter().collect();

        let now = Utc::now();
        for status in &mut statuses {
            let meta_json = serde_json::to_value(&status.meta)?;

            if status.earned {
                let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
                    "INSERT INTO client_badge_awards \
                     (id, client_id, badge_code, earned, progress, meta, latest_award_at, created_at, updated_at) \
                     VALUES ($1, $2, $3, TRUE, $4, $5, $6, $7, $7) \
                     ON CONFLICT (client_id, badge_code) DO UPDATE SET \
                         earned = TRUE, \
                         progress = EXCLUDED.progress, \
                         meta = EXCLUDED.meta, \
                         latest_award_at = COALESCE(client_badge_awards.latest_award_at, EXCLUDED.latest_award_at), \
                         updated_at = EXCLUDED.updated_at \
                     RETURNING latest_award_at",
                )
                .bind(Uuid::new_v4())
                .bind(client_id)
                .bind(status.code.as_str())
                .bind(status.progress)
                .bind(&meta_json)
                .bind(now)
                .bind(now)
                .fetch_one(&self.db)
                .await?;

                status.latest_award_at = latest;
            } else if existing.contains_key(status.code.as_str()) {
                // Keep the row but record that the badge is no longer held.
                let latest: Option<DateTime<Utc>> = sqlx::query_scalar(
                    "UPDATE client_badge_awards \
                     SET earned = FALSE, progress = $3, meta = $4, updated_at = $5 \
                     WHERE client_id = $1 AND badge_code = $2 \
                     RETURNING latest_award_at",
                )
                .bind(client_id)
                .bind(status.code.as_str())
                .bind(status.progress)
                .bind(&meta_json)
                .bind(now)
                .fetch_one(&self.db)
                .await?;

                status.latest_award_at = latest;
            }
        }

        Ok(statuses)
    }
}

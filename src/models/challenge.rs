use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "challenge_period", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ChallengePeriod {
    /// Fixed instance window length: daily 1, weekly 7, monthly 30.
    pub fn length_days(&self) -> i64 {
        match self {
            ChallengePeriod::Daily => 1,
            ChallengePeriod::Weekly => 7,
            ChallengePeriod::Monthly => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "challenge_metric", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengeMetric {
    WaterMl,
    LoggedMeals,
    ProteinBalance,
    SweetFreeDays,
    VegetablesG,
    ComplianceDays,
    Steps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "challenge_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Active,
    Completed,
    Failed,
    Archived,
}

/// Metric-specific knobs stored as JSONB on the definition. All optional;
/// consumers fall back to the metric's documented default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline_weeks: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_meals: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_days: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub daily_target: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Static catalog row, seeded once and re-seeded idempotently by code.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChallengeDefinition {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub period: ChallengePeriod,
    pub metric: ChallengeMetric,
    pub config: Json<ChallengeConfig>,
    pub difficulty_min_pct: f64,
    pub difficulty_max_pct: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One assigned challenge instance with its fixed date window.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientChallenge {
    pub id: Uuid,
    pub client_id: Uuid,
    pub definition_id: Uuid,
    pub status: ChallengeStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub baseline_value: f64,
    pub target_value: f64,
    pub difficulty_factor: f64,
    pub meta: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Live progress row, one per challenge instance, overwritten on every
/// recomputation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChallengeProgress {
    pub id: Uuid,
    pub client_challenge_id: Uuid,
    pub value: f64,
    pub target_value: f64,
    pub completed: bool,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub meta: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry offered to a client, with a personalized preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeOption {
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub period: ChallengePeriod,
    pub metric: ChallengeMetric,
    pub already_active: bool,
    pub suggested_baseline: f64,
    pub suggested_target: f64,
    pub difficulty_factor: f64,
    pub meta: serde_json::Value,
}

/// Challenge instance joined with its definition copy and current progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeWithProgress {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub period: ChallengePeriod,
    pub status: ChallengeStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub baseline_value: f64,
    pub target_value: f64,
    pub difficulty_factor: f64,
    pub meta: serde_json::Value,
    pub progress: ProgressSnapshot,
}

/// Progress fields exposed to callers, without row identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub value: f64,
    pub target_value: f64,
    pub completed: bool,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub meta: serde_json::Value,
}

impl From<&ChallengeProgress> for ProgressSnapshot {
    fn from(progress: &ChallengeProgress) -> Self {
        Self {
            value: progress.value,
            target_value: progress.target_value,
            completed: progress.completed,
            period_start: progress.period_start,
            period_end: progress.period_end,
            meta: progress.meta.clone(),
        }
    }
}

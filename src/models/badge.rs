use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Closed set of badge codes. Dispatch is a match on this enum; there is no
/// way to register a badge at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeCode {
    FirstMeal,
    SteadyWeek,
    FiberFan,
    OmegaBalance,
    HeroReturn,
}

impl BadgeCode {
    pub const ALL: [BadgeCode; 5] = [
        BadgeCode::FirstMeal,
        BadgeCode::SteadyWeek,
        BadgeCode::FiberFan,
        BadgeCode::OmegaBalance,
        BadgeCode::HeroReturn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeCode::FirstMeal => "first_meal",
            BadgeCode::SteadyWeek => "steady_week",
            BadgeCode::FiberFan => "fiber_fan",
            BadgeCode::OmegaBalance => "omega_balance",
            BadgeCode::HeroReturn => "hero_return",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == code)
    }

    pub fn definition(&self) -> &'static BadgeDefinition {
        match self {
            BadgeCode::FirstMeal => &BADGE_CATALOG[0],
            BadgeCode::SteadyWeek => &BADGE_CATALOG[1],
            BadgeCode::FiberFan => &BADGE_CATALOG[2],
            BadgeCode::OmegaBalance => &BADGE_CATALOG[3],
            BadgeCode::HeroReturn => &BADGE_CATALOG[4],
        }
    }
}

impl fmt::Display for BadgeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static badge definition: code plus display copy. Loaded once, process-wide.
#[derive(Debug, Clone, Copy)]
pub struct BadgeDefinition {
    pub code: BadgeCode,
    pub title: &'static str,
    pub description: &'static str,
}

pub const BADGE_CATALOG: [BadgeDefinition; 5] = [
    BadgeDefinition {
        code: BadgeCode::FirstMeal,
        title: "First Step",
        description: "Logged the very first meal.",
    },
    BadgeDefinition {
        code: BadgeCode::SteadyWeek,
        title: "Steady Week",
        description: "Seven consecutive days inside the macro corridor.",
    },
    BadgeDefinition {
        code: BadgeCode::FiberFan,
        title: "Fiber Fan",
        description: "Average fiber intake of 25 g or more across at least three of the last seven logged days.",
    },
    BadgeDefinition {
        code: BadgeCode::OmegaBalance,
        title: "Omega Balance",
        description: "Omega-6 to omega-3 ratio between 2 and 5 on at least three of the last seven logged days.",
    },
    BadgeDefinition {
        code: BadgeCode::HeroReturn,
        title: "Hero's Return",
        description: "Back on plan for at least three days after a real break.",
    },
];

/// Outcome of one badge evaluator over an assembled context.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeEvaluation {
    pub earned: bool,
    /// Always within [0, 1].
    pub progress: f64,
    pub meta: HashMap<String, f64>,
}

/// Per-badge status returned to callers. `latest_award_at` is populated only
/// by the persisting path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeStatus {
    pub code: BadgeCode,
    pub title: String,
    pub description: String,
    pub earned: bool,
    pub progress: f64,
    pub meta: HashMap<String, f64>,
    pub latest_award_at: Option<DateTime<Utc>>,
}

/// Persisted award row, one per (client, badge). Upserted in place;
/// `latest_award_at` is set when the badge first becomes earned and frozen
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientBadgeAward {
    pub id: Uuid,
    pub client_id: Uuid,
    pub badge_code: String,
    pub earned: bool,
    pub progress: f64,
    pub meta: serde_json::Value,
    pub latest_award_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_strings() {
        for code in BadgeCode::ALL {
            assert_eq!(BadgeCode::parse(code.as_str()), Some(code));
        }
        assert_eq!(BadgeCode::parse("no_such_badge"), None);
    }

    #[test]
    fn catalog_is_aligned_with_codes() {
        for (i, code) in BadgeCode::ALL.iter().enumerate() {
            assert_eq!(BADGE_CATALOG[i].code, *code);
            assert_eq!(code.definition().code, *code);
        }
    }
}

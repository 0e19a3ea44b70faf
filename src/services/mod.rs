// Business logic services

pub mod badges;
pub mod challenges;
pub mod compliance;
pub mod daily_log;
pub mod meal_analytics;
pub mod streaks;

pub use badges::{BadgeContext, BadgeService};
pub use challenges::ChallengeService;
pub use daily_log::DailyLogService;
pub use meal_analytics::MealAnalyticsService;

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ClientTargets, ClientTargetsRow};

/// Load the client's targets with defaults applied when no row exists.
pub async fn load_client_targets(db: &PgPool, client_id: Uuid) -> Result<ClientTargets> {
    let row = sqlx::query_as::<_, ClientTargetsRow>(
        "SELECT client_id, kcal_target, protein_target_g, fat_target_g, carbs_target_g, tolerances \
         FROM client_targets WHERE client_id = $1",
    )
    .bind(client_id)
    .fetch_optional(db)
    .await?;

    Ok(ClientTargets::resolve(row))
}

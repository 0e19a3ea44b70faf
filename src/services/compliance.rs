use crate::models::{ClientTargets, DailyMacroSummary};

/// Per-macro tolerance check. The corridor is `max(floor, target * pct)`
/// around the target; kcal passes a zero floor so its corridor is purely
/// percentage-based. Fails closed: a non-positive target or a non-finite
/// actual is never ok.
pub fn within_tolerance(actual: f64, target: f64, pct: f64, floor: f64) -> bool {
    if target <= 0.0 || !actual.is_finite() {
        return false;
    }
    let allowed = floor.max(target * pct);
    (actual - target).abs() <= allowed
}

/// A day is compliant iff kcal and all three macros sit inside their
/// corridors. Never errors; malformed inputs read as non-compliant.
pub fn is_day_compliant(day: &DailyMacroSummary, targets: &ClientTargets) -> bool {
    let tol = &targets.tolerances;

    within_tolerance(day.kcal, targets.kcal_target, tol.kcal_pct, 0.0)
        && within_tolerance(
            day.protein_g,
            targets.protein_target_g,
            tol.protein_pct,
            tol.min_g.protein,
        )
        && within_tolerance(day.fat_g, targets.fat_target_g, tol.fat_pct, tol.min_g.fat)
        && within_tolerance(
            day.carbs_g,
            targets.carbs_target_g,
            tol.carbs_pct,
            tol.min_g.carbs,
        )
}

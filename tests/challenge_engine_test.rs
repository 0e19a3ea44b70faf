use chrono::{NaiveDate, Utc};
use pretty_assertions::assert_eq;
use sqlx::types::Json;
use std::collections::HashMap;
use uuid::Uuid;

use nutrios_engine::models::{
    ChallengeConfig, ChallengeMetric, ClientTargets, DailyHabitLog, DailyLogExtras,
    DailyMacroSummary,
};
use nutrios_engine::services::challenges::{
    count_compliance_days, count_days_at_or_above, count_sweet_free_days, difficulty_factor,
    protein_success_days, target_for, weekly_bucket_average,
};

fn d(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

fn habit_log(
    date: NaiveDate,
    water: i32,
    vegetables: i32,
    sweets: bool,
    protein: i32,
    steps: Option<i32>,
) -> DailyHabitLog {
    DailyHabitLog {
        id: Uuid::new_v4(),
        client_id: Uuid::new_v4(),
        date,
        water_ml: water,
        vegetables_g: vegetables,
        had_sweets: sweets,
        steps,
        logged_meals: 3,
        total_kcal: 2000,
        protein_g: protein,
        fat_g: 70,
        carbs_g: 250,
        extras: Json(DailyLogExtras::default()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn water_config() -> ChallengeConfig {
    ChallengeConfig {
        baseline_days: Some(14),
        default_target: Some(1800.0),
        unit: Some("ml".to_string()),
        ..ChallengeConfig::default()
    }
}

#[test]
fn water_target_uses_default_floor_then_baseline() {
    // Baseline below the default target: 1800 * 1.10 = 1980.
    let (target, meta) = target_for(ChallengeMetric::WaterMl, &water_config(), 1200.0, 0.10);
    assert_eq!(target, 1980.0);
    assert_eq!(meta["unit"], "ml");

    // Baseline above the default: scale the baseline.
    let (target, _) = target_for(ChallengeMetric::WaterMl, &water_config(), 2500.0, 0.10);
    assert_eq!(target, 2750.0);
}

#[test]
fn logged_meals_target_never_drops_below_minimum() {
    let cfg = ChallengeConfig {
        baseline_days: Some(14),
        min_meals: Some(3),
        unit: Some("meals".to_string()),
        ..ChallengeConfig::default()
    };

    let (no_history, _) = target_for(ChallengeMetric::LoggedMeals, &cfg, 0.0, 0.10);
    assert_eq!(no_history, 4.0); // ceil(3 * 1.10)

    let (light_logger, _) = target_for(ChallengeMetric::LoggedMeals, &cfg, 1.4, 0.10);
    assert_eq!(light_logger, 4.0); // base lifted to the minimum first

    let (heavy_logger, _) = target_for(ChallengeMetric::LoggedMeals, &cfg, 4.6, 0.10);
    assert_eq!(heavy_logger, 6.0); // ceil(ceil(4.6) * 1.10)
}

#[test]
fn weekly_day_count_targets_clamp_to_period() {
    let sweets_cfg = ChallengeConfig {
        minimum_days: Some(5),
        ..ChallengeConfig::default()
    };
    // Even a perfect baseline cannot push past seven days a week.
    let (target, _) = target_for(ChallengeMetric::SweetFreeDays, &sweets_cfg, 7.0, 0.15);
    assert_eq!(target, 7.0);
    // And the floor holds with no history at all.
    let (target, _) = target_for(ChallengeMetric::SweetFreeDays, &sweets_cfg, 0.0, 0.05);
    assert_eq!(target, 6.0); // max(5, min(7, ceil(5 * 1.05)))

    let veg_cfg = ChallengeConfig {
        daily_min: Some(400.0),
        ..ChallengeConfig::default()
    };
    for baseline in [0.0, 1.0, 4.0, 10.0] {
        let (target, meta) = target_for(ChallengeMetric::VegetablesG, &veg_cfg, baseline, 0.12);
        assert!((3.0..=7.0).contains(&target));
        assert_eq!(meta["daily_requirement"], 400.0);
    }
}

#[test]
fn monthly_day_count_targets_clamp_to_window() {
    let streak_cfg = ChallengeConfig {
        window_days: Some(30),
        required_days: Some(21),
        ..ChallengeConfig::default()
    };
    let (target, meta) = target_for(ChallengeMetric::ComplianceDays, &streak_cfg, 28.0, 0.15);
    assert_eq!(target, 30.0);
    assert_eq!(meta["window_days"], 30.0);

    let steps_cfg = ChallengeConfig {
        baseline_days: Some(30),
        daily_target: Some(10000.0),
        required_days: Some(20),
        ..ChallengeConfig::default()
    };
    let (target, meta) = target_for(ChallengeMetric::Steps, &steps_cfg, 12.0, 0.10);
    assert_eq!(target, 22.0); // ceil(max(20, 12) * 1.10)
    assert_eq!(meta["daily_steps_target"], 10000.0);
}

#[test]
fn target_monotone_in_difficulty_for_fixed_baseline() {
    let metrics_and_configs: Vec<(ChallengeMetric, ChallengeConfig)> = vec![
        (ChallengeMetric::WaterMl, water_config()),
        (ChallengeMetric::LoggedMeals, ChallengeConfig::default()),
        (ChallengeMetric::ProteinBalance, ChallengeConfig::default()),
        (ChallengeMetric::SweetFreeDays, ChallengeConfig::default()),
        (ChallengeMetric::VegetablesG, ChallengeConfig::default()),
        (ChallengeMetric::ComplianceDays, ChallengeConfig::default()),
        (ChallengeMetric::Steps, ChallengeConfig::default()),
    ];

    for (metric, cfg) in &metrics_and_configs {
        for baseline in [0.0, 1.0, 3.7, 22.0, 2100.0] {
            let mut previous = f64::NEG_INFINITY;
            for step in 0..=30 {
                let factor = step as f64 * 0.01;
                let (target, _) = target_for(*metric, cfg, baseline, factor);
                assert!(
                    target >= previous,
                    "{metric:?} not monotone at baseline {baseline}, factor {factor}"
                );
                previous = target;
            }
        }
    }
}

#[test]
fn difficulty_override_is_clamped_into_band() {
    assert_eq!(difficulty_factor(0.05, 0.15, None), 0.10);
    assert_eq!(difficulty_factor(0.04, 0.08, None), 0.06);
    assert_eq!(difficulty_factor(0.05, 0.15, Some(0.40)), 0.15);
    assert_eq!(difficulty_factor(0.05, 0.15, Some(-1.0)), 0.05);
    assert_eq!(difficulty_factor(0.05, 0.15, Some(0.07)), 0.07);
    // Inverted band collapses onto the low edge.
    assert_eq!(difficulty_factor(0.20, 0.10, None), 0.20);
}

#[test]
fn sweet_free_baseline_averages_date_keyed_weeks() {
    let start = d(3, 1);
    let logs = vec![
        // Week 1: three sweet-free days out of four logged.
        habit_log(d(3, 1), 0, 0, false, 100, None),
        habit_log(d(3, 2), 0, 0, false, 100, None),
        habit_log(d(3, 4), 0, 0, true, 100, None),
        habit_log(d(3, 6), 0, 0, false, 100, None),
        // Week 2: one sweet-free day.
        habit_log(d(3, 10), 0, 0, false, 100, None),
        habit_log(d(3, 11), 0, 0, true, 100, None),
        // Week 4: no logs at all; the bucket must not exist.
    ];

    let baseline = weekly_bucket_average(&logs, start, |log| !log.had_sweets);
    assert_eq!(baseline, 2.0); // (3 + 1) / 2 buckets with data
}

#[test]
fn vegetables_baseline_counts_threshold_days() {
    let start = d(3, 1);
    let logs = vec![
        habit_log(d(3, 1), 0, 420, false, 100, None),
        habit_log(d(3, 2), 0, 380, false, 100, None),
        habit_log(d(3, 3), 0, 400, false, 100, None),
        habit_log(d(3, 9), 0, 450, false, 100, None),
    ];

    let baseline = weekly_bucket_average(&logs, start, |log| f64::from(log.vegetables_g) >= 400.0);
    assert_eq!(baseline, 1.5); // week 1: 2 days, week 2: 1 day
}

#[test]
fn protein_corridor_week() {
    let targets = ClientTargets::default(); // 100 g protein, 20% tolerance
    let logs = vec![
        habit_log(d(3, 4), 0, 0, false, 100, None),
        habit_log(d(3, 5), 0, 0, false, 119, None),
        habit_log(d(3, 6), 0, 0, false, 121, None),
        habit_log(d(3, 7), 0, 0, false, 80, None),
    ];
    let by_date: HashMap<NaiveDate, &DailyHabitLog> =
        logs.iter().map(|log| (log.date, log)).collect();

    let (success, total) = protein_success_days(&by_date, &targets, 0.2, d(3, 4), d(3, 10));
    assert_eq!(total, 7);
    assert_eq!(success, 3); // 100, 119 and 80 are inside |Δ| <= 20
}

#[test]
fn compliance_day_count_respects_window() {
    let targets = ClientTargets::default();
    let summaries: Vec<DailyMacroSummary> = (1..=10)
        .map(|day| DailyMacroSummary {
            day: d(3, day),
            kcal: if day <= 6 { 2000.0 } else { 3000.0 },
            protein_g: 100.0,
            fat_g: 70.0,
            carbs_g: 250.0,
        })
        .collect();

    assert_eq!(count_compliance_days(&summaries, &targets, d(3, 1), d(3, 10)), 6);
    // A narrower window only sees its own days.
    assert_eq!(count_compliance_days(&summaries, &targets, d(3, 5), d(3, 10)), 2);
    assert_eq!(count_compliance_days(&summaries, &targets, d(4, 1), d(4, 30)), 0);
}

#[test]
fn progress_counters_are_deterministic() {
    let logs = vec![
        habit_log(d(3, 1), 1800, 420, false, 100, Some(11000)),
        habit_log(d(3, 2), 900, 380, true, 60, Some(8000)),
        habit_log(d(3, 3), 2000, 400, false, 95, Some(10000)),
    ];

    for _ in 0..2 {
        assert_eq!(count_sweet_free_days(&logs), 2);
        assert_eq!(
            count_days_at_or_above(&logs, 400.0, |log| Some(f64::from(log.vegetables_g))),
            2
        );
        assert_eq!(
            count_days_at_or_above(&logs, 10000.0, |log| log.steps.map(f64::from)),
            2
        );
    }
}

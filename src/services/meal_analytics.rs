use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::models::{
    DailyExtrasSummary, DailyMacroSummary, MealRecord, MealRow, MicronutrientMention,
    WeeklyMacroSummary,
};

/// Civil day of a UTC instant in the reporting offset.
pub fn civil_day(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// Monday of the ISO week containing `day`.
pub fn iso_week_start(day: NaiveDate) -> NaiveDate {
    day - Duration::days(day.weekday().num_days_from_monday() as i64)
}

/// UTC bounds `[start, end)` of one civil day in the reporting offset.
pub fn day_bounds_utc(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = day.and_time(NaiveTime::MIN);
    let shift = Duration::seconds(offset.local_minus_utc() as i64);
    let start = DateTime::<Utc>::from_naive_utc_and_offset(local_midnight - shift, Utc);
    (start, start + Duration::days(1))
}

#[derive(Debug, Default)]
struct MacroAccumulator {
    kcal: f64,
    protein_g: f64,
    fat_g: f64,
    carbs_g: f64,
}

impl MacroAccumulator {
    fn add(&mut self, record: &MealRecord) {
        self.kcal += record.kcal.unwrap_or(0.0);
        self.protein_g += record.protein_g.unwrap_or(0.0);
        self.fat_g += record.fat_g.unwrap_or(0.0);
        self.carbs_g += record.carbs_g.unwrap_or(0.0);
    }
}

#[derive(Debug, Default)]
struct ExtrasAccumulator {
    fats_total: Option<f64>,
    fats_saturated: Option<f64>,
    fats_mono: Option<f64>,
    fats_poly: Option<f64>,
    fats_trans: Option<f64>,
    omega6: Option<f64>,
    omega3: Option<f64>,
    fiber_total: Option<f64>,
    fiber_soluble: Option<f64>,
    fiber_insoluble: Option<f64>,
}

// Sum that keeps "no data at all" distinct from a zero sum.
fn add_opt(acc: &mut Option<f64>, value: Option<f64>) {
    if let Some(v) = value {
        *acc = Some(acc.unwrap_or(0.0) + v);
    }
}

impl ExtrasAccumulator {
    fn add(&mut self, record: &MealRecord) {
        add_opt(&mut self.fats_total, record.fats_total);
        add_opt(&mut self.fats_saturated, record.fats_saturated);
        add_opt(&mut self.fats_mono, record.fats_mono);
        add_opt(&mut self.fats_poly, record.fats_poly);
        add_opt(&mut self.fats_trans, record.fats_trans);
        add_opt(&mut self.omega6, record.omega6);
        add_opt(&mut self.omega3, record.omega3);
        add_opt(&mut self.fiber_total, record.fiber_total);
        add_opt(&mut self.fiber_soluble, record.fiber_soluble);
        add_opt(&mut self.fiber_insoluble, record.fiber_insoluble);
    }
}

/// Group records by civil day and sum macros. Output is ordered by day;
/// sums are rounded to whole units.
pub fn daily_macro_summaries(
    records: &[MealRecord],
    offset: FixedOffset,
) -> Vec<DailyMacroSummary> {
    let mut buckets: BTreeMap<NaiveDate, MacroAccumulator> = BTreeMap::new();
    for record in records {
        buckets
            .entry(civil_day(record.captured_at, offset))
            .or_default()
            .add(record);
    }

    buckets
        .into_iter()
        .map(|(day, acc)| DailyMacroSummary {
            day,
            kcal: acc.kcal.round(),
            protein_g: acc.protein_g.round(),
            fat_g: acc.fat_g.round(),
            carbs_g: acc.carbs_g.round(),
        })
        .collect()
}

/// Group records by ISO week (keyed by Monday) and sum macros.
pub fn weekly_macro_summaries(
    records: &[MealRecord],
    offset: FixedOffset,
) -> Vec<WeeklyMacroSummary> {
    let mut buckets: BTreeMap<NaiveDate, MacroAccumulator> = BTreeMap::new();
    for record in records {
        let week = iso_week_start(civil_day(record.captured_at, offset));
        buckets.entry(week).or_default().add(record);
    }

    buckets
        .into_iter()
        .map(|(week_start, acc)| WeeklyMacroSummary {
            week_start,
            kcal: acc.kcal.round(),
            protein_g: acc.protein_g.round(),
            fat_g: acc.fat_g.round(),
            carbs_g: acc.carbs_g.round(),
        })
        .collect()
}

/// Group records by civil day and sum the extended-nutrition fields. The
/// omega ratio is recomputed from the day's sums rather than averaged from
/// per-meal ratios.
pub fn daily_extras_summaries(
    records: &[MealRecord],
    offset: FixedOffset,
) -> Vec<DailyExtrasSummary> {
    let mut buckets: BTreeMap<NaiveDate, ExtrasAccumulator> = BTreeMap::new();
    for record in records {
        buckets
            .entry(civil_day(record.captured_at, offset))
            .or_default()
            .add(record);
    }

    buckets
        .into_iter()
        .map(|(day, acc)| DailyExtrasSummary {
            day,
            omega_ratio: crate::models::omega_ratio(acc.omega6, acc.omega3),
            fats_total: acc.fats_total,
            fats_saturated: acc.fats_saturated,
            fats_mono: acc.fats_mono,
            fats_poly: acc.fats_poly,
            fats_trans: acc.fats_trans,
            omega6: acc.omega6,
            omega3: acc.omega3,
            fiber_total: acc.fiber_total,
            fiber_soluble: acc.fiber_soluble,
            fiber_insoluble: acc.fiber_insoluble,
        })
        .collect()
}

/// Most frequently mentioned micronutrient entries across the records,
/// ties broken alphabetically for a stable order.
pub fn top_micronutrients(records: &[MealRecord], top_n: usize) -> Vec<MicronutrientMention> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for record in records {
        for item in &record.micronutrients {
            *counts.entry(item.as_str()).or_default() += 1;
        }
    }

    let mut mentions: Vec<MicronutrientMention> = counts
        .into_iter()
        .map(|(name_amount, count)| MicronutrientMention {
            name_amount: name_amount.to_string(),
            count,
        })
        .collect();
    mentions.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.name_amount.cmp(&b.name_amount))
    });
    mentions.truncate(top_n);
    mentions
}

/// Read side of the analytics layer: fetches meal rows and flattens them
/// into [`MealRecord`]s ordered by capture time.
#[derive(Clone)]
pub struct MealAnalyticsService {
    db: PgPool,
    reporting_offset: FixedOffset,
}

impl MealAnalyticsService {
    pub fn new(db: PgPool, config: &EngineConfig) -> Self {
        Self {
            db,
            reporting_offset: config.reporting_offset(),
        }
    }

    pub fn reporting_offset(&self) -> FixedOffset {
        self.reporting_offset
    }

    pub async fn fetch_meal_records(
        &self,
        client_id: Uuid,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<MealRecord>> {
        let mut query = String::from(
            "SELECT id, client_id, title, portion_g, kcal, protein_g, fat_g, carbs_g, \
             flags, micronutrients, extras, captured_at \
             FROM meals WHERE client_id = $1",
        );
        let mut param_count = 2;

        if date_from.is_some() {
            query.push_str(&format!(" AND captured_at >= ${}", param_count));
            param_count += 1;
        }
        if date_to.is_some() {
            query.push_str(&format!(" AND captured_at < ${}", param_count));
        }
        query.push_str(" ORDER BY captured_at");

        let mut query_builder = sqlx::query_as::<_, MealRow>(&query).bind(client_id);
        if let Some(from) = date_from {
            query_builder = query_builder.bind(from);
        }
        if let Some(to) = date_to {
            query_builder = query_builder.bind(to);
        }

        let rows = query_builder.fetch_all(&self.db).await?;
        Ok(rows.iter().map(MealRecord::from_row).collect())
    }

    /// Records captured within one civil day of the reporting offset.
    pub async fn fetch_day_records(
        &self,
        client_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<MealRecord>> {
        let (start, end) = day_bounds_utc(day, self.reporting_offset);
        self.fetch_meal_records(client_id, Some(start), Some(end))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    fn record(ts: DateTime<Utc>, kcal: f64, fiber: Option<f64>) -> MealRecord {
        MealRecord {
            captured_at: ts,
            title: None,
            kcal: Some(kcal),
            protein_g: Some(30.0),
            fat_g: Some(20.0),
            carbs_g: Some(80.0),
            fats_total: None,
            fats_saturated: None,
            fats_mono: None,
            fats_poly: None,
            fats_trans: None,
            omega6: None,
            omega3: None,
            omega_ratio: None,
            fiber_total: fiber,
            fiber_soluble: None,
            fiber_insoluble: None,
            micronutrients: Vec::new(),
        }
    }

    #[test]
    fn day_boundary_follows_reporting_offset() {
        // 22:30 UTC is 01:30 next day at UTC+3.
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 22, 30, 0).unwrap();
        assert_eq!(
            civil_day(ts, offset()),
            NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()
        );

        let (start, end) = day_bounds_utc(NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), offset());
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 21, 0, 0).unwrap());
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 2, 21, 0, 0).unwrap());
        assert!(ts >= start && ts < end);
    }

    #[test]
    fn daily_summaries_group_and_round() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let records = vec![
            record(day1, 400.4, Some(8.0)),
            record(day1 + Duration::hours(5), 600.4, None),
            record(day1 + Duration::days(2), 500.0, Some(12.0)),
        ];

        let summaries = daily_macro_summaries(&records, offset());
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].day, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(summaries[0].kcal, 1001.0);
        assert_eq!(summaries[1].kcal, 500.0);
        // No bucket is materialized for the empty day in between.
        assert_eq!(summaries[1].day, NaiveDate::from_ymd_opt(2024, 3, 3).unwrap());
    }

    #[test]
    fn extras_sums_keep_missing_as_none() {
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let records = vec![
            record(day1, 400.0, Some(8.0)),
            record(day1 + Duration::hours(3), 500.0, None),
            record(day1 + Duration::days(1), 450.0, None),
        ];

        let summaries = daily_extras_summaries(&records, offset());
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].fiber_total, Some(8.0));
        assert_eq!(summaries[1].fiber_total, None);
        assert_eq!(summaries[1].omega_ratio, None);
    }

    #[test]
    fn omega_ratio_recomputed_from_day_sums() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut first = record(ts, 400.0, None);
        first.omega6 = Some(8.0);
        first.omega3 = Some(1.0);
        let mut second = record(ts + Duration::hours(2), 300.0, None);
        second.omega6 = Some(2.0);
        second.omega3 = Some(4.0);

        let summaries = daily_extras_summaries(&[first, second], offset());
        assert_eq!(summaries[0].omega6, Some(10.0));
        assert_eq!(summaries[0].omega3, Some(5.0));
        assert_eq!(summaries[0].omega_ratio, Some(2.0));
    }

    #[test]
    fn weekly_summaries_key_on_iso_monday() {
        // Friday 2024-03-01 and Monday 2024-03-04 land in different weeks.
        let friday = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        let summaries =
            weekly_macro_summaries(&[record(friday, 500.0, None), record(monday, 700.0, None)], offset());

        assert_eq!(summaries.len(), 2);
        assert_eq!(
            summaries[0].week_start,
            NaiveDate::from_ymd_opt(2024, 2, 26).unwrap()
        );
        assert_eq!(
            summaries[1].week_start,
            NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
        );
    }

    #[test]
    fn top_micronutrients_orders_by_frequency() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap();
        let mut a = record(ts, 1.0, None);
        a.micronutrients = vec!["Vitamin C — 30 mg".into(), "Iron — 4 mg".into()];
        let mut b = record(ts, 1.0, None);
        b.micronutrients = vec!["Iron — 4 mg".into()];

        let top = top_micronutrients(&[a, b], 5);
        assert_eq!(top[0].name_amount, "Iron — 4 mg");
        assert_eq!(top[0].count, 2);
        assert_eq!(top[1].count, 1);

        assert_eq!(top_micronutrients(&[], 5), Vec::new());
    }
}

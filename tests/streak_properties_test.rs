use chrono::{Duration, NaiveDate};
use proptest::prelude::*;

use nutrios_engine::models::ComplianceDay;
use nutrios_engine::services::streaks::{
    best_streak, current_streak, fill_gaps, segments, series_from_segments,
};

proptest! {
    #[test]
    fn segments_round_trip_any_series(series in prop::collection::vec(any::<bool>(), 0..200)) {
        let segs = segments(&series);

        // Exact reconstruction, and re-segmenting is the identity.
        prop_assert_eq!(series_from_segments(&segs), series.clone());
        prop_assert_eq!(segments(&series_from_segments(&segs)), segs.clone());

        // Lengths partition the series.
        prop_assert_eq!(segs.iter().map(|s| s.len).sum::<usize>(), series.len());

        // Segments are maximal: neighbours always alternate.
        for pair in segs.windows(2) {
            prop_assert_ne!(pair[0].value, pair[1].value);
        }
    }

    #[test]
    fn streak_invariants(series in prop::collection::vec(any::<bool>(), 0..200)) {
        let segs = segments(&series);
        let current = current_streak(&series);
        let best = best_streak(&segs);

        prop_assert!(current <= series.len());
        prop_assert!(best <= series.len());
        // The trailing compliant run is itself a compliant segment.
        prop_assert!(current <= best || current == 0);
        if series.last() == Some(&false) {
            prop_assert_eq!(current, 0);
        }
    }

    #[test]
    fn gap_filling_spans_the_calendar_range(
        start_offset in 0i64..3000,
        steps in prop::collection::vec((1i64..6, any::<bool>()), 1..60),
    ) {
        let epoch = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let mut day = epoch + Duration::days(start_offset);
        let mut days = Vec::with_capacity(steps.len());
        for (gap, compliant) in &steps {
            days.push(ComplianceDay { day, compliant: *compliant });
            day += Duration::days(*gap);
        }

        let series = fill_gaps(&days);

        // Dense series covers first..=last day exactly.
        let span = (days.last().unwrap().day - days[0].day).num_days() as usize + 1;
        prop_assert_eq!(series.len(), span);

        // Present days keep their value; inserted days are non-compliant.
        for cd in &days {
            let idx = (cd.day - days[0].day).num_days() as usize;
            prop_assert_eq!(series[idx], cd.compliant);
        }
        let present: std::collections::HashSet<i64> =
            days.iter().map(|cd| (cd.day - days[0].day).num_days()).collect();
        for (idx, value) in series.iter().enumerate() {
            if !present.contains(&(idx as i64)) {
                prop_assert!(!value);
            }
        }
    }
}

use crate::models::{ComplianceDay, Segment};

/// Expand a chronologically ordered compliance sequence into a dense boolean
/// series. Calendar days strictly between two present records with no record
/// of their own are inserted as `false`: not logging counts as breaking the
/// streak.
pub fn fill_gaps(days: &[ComplianceDay]) -> Vec<bool> {
    let mut series = Vec::with_capacity(days.len());
    let mut previous: Option<&ComplianceDay> = None;

    for day in days {
        if let Some(prev) = previous {
            let delta = (day.day - prev.day).num_days();
            for _ in 1..delta.max(0) {
                series.push(false);
            }
        }
        series.push(day.compliant);
        previous = Some(day);
    }

    series
}

/// Run-length encode a boolean series into maximal same-value segments.
pub fn segments(series: &[bool]) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::new();

    for &value in series {
        match out.last_mut() {
            Some(last) if last.value == value => last.len += 1,
            _ => out.push(Segment { value, len: 1 }),
        }
    }

    out
}

/// Inverse of [`segments`]: reconstruct the exact boolean series.
pub fn series_from_segments(segments: &[Segment]) -> Vec<bool> {
    let mut series = Vec::with_capacity(segments.iter().map(|s| s.len).sum());
    for segment in segments {
        series.extend(std::iter::repeat(segment.value).take(segment.len));
    }
    series
}

/// Trailing run of compliant days; 0 when the series ends non-compliant or
/// is empty.
pub fn current_streak(series: &[bool]) -> usize {
    series.iter().rev().take_while(|&&compliant| compliant).count()
}

/// Longest compliant run anywhere in the series; 0 when there is none.
pub fn best_streak(segments: &[Segment]) -> usize {
    segments
        .iter()
        .filter(|s| s.value)
        .map(|s| s.len)
        .max()
        .unwrap_or(0)
}

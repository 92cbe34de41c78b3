//! Feature builder: joins member records with aggregated visit statistics
//! and emits one labeled feature row per member.
//!
//! Every member in the input appears in the output, zero-visit members
//! included. Each column has an explicit default so the matrix never
//! contains missing values:
//!
//! - counts and shares default to 0
//! - duration and gap statistics default to 0 (computed over completed
//!   visits only)
//! - `days_since_last_visit` for a member with no visits is the tenure
//!   itself, a sentinel meaning "never visited"
use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{Datelike, Duration, NaiveDateTime, Timelike};
use ndarray::Array2;

use crate::config::SCHEMA_VERSION;
use crate::data::{FeatureMatrix, FeatureSchema, MemberRecord, VisitRecord};

/// Feature columns, in schema order.
pub const FEATURE_COLUMNS: [&str; 21] = [
    "tenure_days",
    "total_visits",
    "visits_per_week",
    "avg_visit_minutes",
    "last_visit_minutes",
    "days_since_last_visit",
    "avg_days_between_visits",
    "std_days_between_visits",
    "visits_last_30_days",
    "visits_last_60_days",
    "visits_last_90_days",
    "pct_peak_hour_visits",
    "pct_weekend_visits",
    "visit_frequency_trend",
    "age",
    "gender",
    "zumba",
    "body_pump",
    "pilates",
    "spinning",
    "classes_enrolled",
];

/// Peak gym hours: entries between 17:00 and 19:59.
const PEAK_HOUR_START: u32 = 17;
const PEAK_HOUR_END: u32 = 20;

/// The schema the builder currently produces.
pub fn feature_schema() -> FeatureSchema {
    FeatureSchema::new(
        SCHEMA_VERSION,
        FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
    )
}

/// Deterministic gender encoding. Unseen spellings land in the "other"
/// bucket rather than erroring, so the mapping is stable between training
/// and scoring runs.
pub fn encode_gender(raw: &str) -> f64 {
    match raw.trim().to_ascii_uppercase().as_str() {
        "M" | "MALE" => 1.0,
        "F" | "FEMALE" => 2.0,
        _ => 0.0,
    }
}

/// Build the labeled feature matrix for `members` as of `reference`.
///
/// A member is labeled churned (1) when its membership-end date is present
/// and strictly before `reference`; a null or future end date means active
/// (0).
pub fn build_features(
    members: &[MemberRecord],
    visits: &[VisitRecord],
    reference: NaiveDateTime,
) -> Result<FeatureMatrix> {
    let mut by_member: HashMap<i64, Vec<&VisitRecord>> = HashMap::new();
    for visit in visits {
        by_member.entry(visit.member_id).or_default().push(visit);
    }
    for member_visits in by_member.values_mut() {
        member_visits.sort_by_key(|v| v.entry);
    }

    let mut values = Vec::with_capacity(members.len() * FEATURE_COLUMNS.len());
    let mut labels = Vec::with_capacity(members.len());
    let mut member_ids = Vec::with_capacity(members.len());

    for member in members {
        let member_visits = by_member
            .get(&member.member_id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        values.extend_from_slice(&feature_row(member, member_visits, reference));
        labels.push(label_for(member, reference));
        member_ids.push(member.member_id);
    }

    let x = Array2::from_shape_vec((members.len(), FEATURE_COLUMNS.len()), values)
        .context("failed to assemble feature matrix")?;

    log::debug!(
        "built feature matrix: {} members, {} features, {} churned",
        members.len(),
        FEATURE_COLUMNS.len(),
        labels.iter().filter(|&&l| l == 1).count()
    );

    Ok(FeatureMatrix {
        x,
        labels,
        member_ids,
        schema: feature_schema(),
    })
}

fn label_for(member: &MemberRecord, reference: NaiveDateTime) -> u8 {
    match member.membership_end {
        Some(end) if end < reference => 1,
        _ => 0,
    }
}

/// `visits` must be sorted by entry time.
fn feature_row(
    member: &MemberRecord,
    visits: &[&VisitRecord],
    reference: NaiveDateTime,
) -> [f64; 21] {
    // Registration after the reference date clamps to zero tenure.
    let tenure_days = ((reference - member.registration).num_days().max(0)) as f64;

    let total_visits = visits.len() as f64;
    let tenure_weeks = (tenure_days / 7.0).max(1.0);
    let visits_per_week = total_visits / tenure_weeks;

    // Duration statistics over completed visits only; an exit before its
    // entry is treated as incomplete rather than producing a negative
    // duration.
    let completed_minutes: Vec<f64> = visits
        .iter()
        .filter_map(|v| {
            v.exit
                .filter(|&exit| exit >= v.entry)
                .map(|exit| (exit - v.entry).num_seconds() as f64 / 60.0)
        })
        .collect();
    let avg_visit_minutes = mean(&completed_minutes);
    let last_visit_minutes = completed_minutes.last().copied().unwrap_or(0.0);

    let days_since_last_visit = match visits.last() {
        Some(last) => ((reference - last.entry).num_days().max(0)) as f64,
        // Sentinel: a member who never visited is "as stale as they are old".
        None => tenure_days,
    };

    let gaps: Vec<f64> = visits
        .windows(2)
        .map(|pair| (pair[1].entry - pair[0].entry).num_seconds() as f64 / 86_400.0)
        .collect();
    let avg_gap = mean(&gaps);
    let std_gap = std_dev(&gaps, avg_gap);

    let window_count = |days: i64| -> f64 {
        let cutoff = reference - Duration::days(days);
        visits.iter().filter(|v| v.entry >= cutoff).count() as f64
    };

    let peak_visits = visits
        .iter()
        .filter(|v| (PEAK_HOUR_START..PEAK_HOUR_END).contains(&v.entry.hour()))
        .count() as f64;
    let weekend_visits = visits
        .iter()
        .filter(|v| v.entry.weekday().num_days_from_monday() >= 5)
        .count() as f64;
    let pct_peak = if visits.is_empty() { 0.0 } else { peak_visits / total_visits };
    let pct_weekend = if visits.is_empty() { 0.0 } else { weekend_visits / total_visits };

    // Trend: visit volume in the second half of tenure vs. the first half.
    let midpoint = member.registration + Duration::days((tenure_days / 2.0) as i64);
    let first_half = visits.iter().filter(|v| v.entry < midpoint).count() as f64;
    let second_half = total_visits - first_half;
    let trend = if first_half > 0.0 {
        (second_half - first_half) / first_half
    } else {
        0.0
    };

    let flags = [member.zumba, member.body_pump, member.pilates, member.spinning];
    let classes_enrolled = flags.iter().filter(|&&f| f).count() as f64;

    [
        tenure_days,
        total_visits,
        visits_per_week,
        avg_visit_minutes,
        last_visit_minutes,
        days_since_last_visit,
        avg_gap,
        std_gap,
        window_count(30),
        window_count(60),
        window_count(90),
        pct_peak,
        pct_weekend,
        trend,
        member.age as f64,
        encode_gender(&member.gender),
        flags[0] as u8 as f64,
        flags[1] as u8 as f64,
        flags[2] as u8 as f64,
        flags[3] as u8 as f64,
        classes_enrolled,
    ]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn std_dev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

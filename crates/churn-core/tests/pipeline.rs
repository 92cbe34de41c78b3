//! End-to-end pipeline tests against synthetic member/visit CSV tables.
use std::fmt::Write as _;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use churn_core::features::FEATURE_COLUMNS;
use churn_core::pipeline::{run, PipelineConfig};
use churn_core::scorer::Population;

fn reference() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
}

/// 30 members: ids 1..=15 churned (membership ended, stale visits), ids
/// 16..=30 active with recent weekly visits.
fn write_tables(dir: &std::path::Path) -> (PathBuf, PathBuf) {
    let reference = reference();
    let mut members = String::from(
        "USER_ID,REGISTRATION_DATE,MEMBERSHIP_END_DATE,AGE,GENDER,ZUMBA,BODY_PUMP,PILATES,SPINNING\n",
    );
    let mut visits = String::from("USER_ID,ENTRY_TIME,EXIT_TIME\n");

    for id in 1..=30i64 {
        let churned = id <= 15;
        let registration = reference - Duration::days(500 - id);
        let gender = if id % 2 == 0 { "F" } else { "M" };
        let end = if churned {
            (reference - Duration::days(60)).format("%Y-%m-%dT%H:%M:%S").to_string()
        } else {
            String::new()
        };
        writeln!(
            members,
            "{id},{},{end},{},{gender},{},{},false,false",
            registration.format("%Y-%m-%dT%H:%M:%S"),
            25 + (id % 30),
            id % 3 == 0,
            id % 4 == 0,
        )
        .unwrap();

        // Churned members stopped visiting ~90 days before the reference;
        // active members keep a weekly habit.
        let visit_count = if churned { 6 } else { 20 };
        let last_gap = if churned { 90 } else { 3 };
        for v in 0..visit_count {
            let entry = reference - Duration::days(last_gap + v * 7) + Duration::hours(6);
            let exit = entry + Duration::minutes(55);
            writeln!(
                visits,
                "{id},{},{}",
                entry.format("%Y-%m-%dT%H:%M:%S"),
                exit.format("%Y-%m-%dT%H:%M:%S"),
            )
            .unwrap();
        }
    }

    let member_path = dir.join("members.csv");
    let visit_path = dir.join("visits.csv");
    std::fs::write(&member_path, members).unwrap();
    std::fs::write(&visit_path, visits).unwrap();
    (member_path, visit_path)
}

fn config(dir: &std::path::Path) -> PipelineConfig {
    let (member_table, visit_table) = write_tables(dir);
    let mut config = PipelineConfig::new(member_table, visit_table);
    config.model_path = Some(dir.join("model.json"));
    config.reference_date = Some(reference());
    config
}

#[test]
fn trains_scores_and_reuses_the_stored_model() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let first = run(&config).unwrap();
    assert!(first.retrained);
    assert!(!first.degenerate);
    assert_eq!(first.member_ingestion.rows_skipped, 0);
    assert_eq!(first.visit_ingestion.rows_skipped, 0);
    assert_eq!(first.feature_columns, FEATURE_COLUMNS.to_vec());

    // active-only population: the 15 members without an end date
    assert_eq!(first.scores.len(), 15);
    for score in &first.scores {
        assert!((0.0..=1.0).contains(&score.probability));
        assert!(score.member_id > 15);
        assert_eq!(score.features.len(), FEATURE_COLUMNS.len());
        assert!(score.features.iter().all(|v| v.is_finite()));
    }
    assert!(first
        .scores
        .windows(2)
        .all(|pair| pair[0].probability >= pair[1].probability));

    let weight_sum: f64 = first.importance.iter().map(|(_, w)| *w).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
    assert!(first.importance.iter().all(|(_, w)| *w >= 0.0));

    // second run reuses the artifact and reproduces the probabilities
    let second = run(&config).unwrap();
    assert!(!second.retrained);
    assert_eq!(second.trained_at, first.trained_at);
    let probs =
        |out: &churn_core::pipeline::PipelineOutput| -> Vec<(i64, f64)> {
            out.scores.iter().map(|s| (s.member_id, s.probability)).collect()
        };
    assert_eq!(probs(&first), probs(&second));
}

#[test]
fn scoring_everyone_keeps_one_row_per_member() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(dir.path());
    config.population = Population::All;

    let output = run(&config).unwrap();
    assert_eq!(output.scores.len(), 30);
    let mut ids: Vec<i64> = output.scores.iter().map(|s| s.member_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (1..=30).collect::<Vec<i64>>());
}

#[test]
fn single_class_input_is_flagged_but_still_scores() {
    let dir = tempfile::tempdir().unwrap();
    let reference = reference();

    let mut members = String::from(
        "USER_ID,REGISTRATION_DATE,MEMBERSHIP_END_DATE,AGE,GENDER,ZUMBA,BODY_PUMP,PILATES,SPINNING\n",
    );
    for id in 1..=12i64 {
        writeln!(
            members,
            "{id},{},,30,F,false,false,false,false",
            (reference - Duration::days(100 + id)).format("%Y-%m-%d"),
        )
        .unwrap();
    }
    let member_path = dir.path().join("members.csv");
    let visit_path = dir.path().join("visits.csv");
    std::fs::write(&member_path, members).unwrap();
    std::fs::write(&visit_path, "USER_ID,ENTRY_TIME,EXIT_TIME\n").unwrap();

    let mut config = PipelineConfig::new(member_path, visit_path);
    config.reference_date = Some(reference);

    let output = run(&config).unwrap();
    assert!(output.degenerate);
    assert_eq!(output.scores.len(), 12);
    let weight_sum: f64 = output.importance.iter().map(|(_, w)| *w).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
}

//! CSV readers for the member and visit tables.
//!
//! Row-level problems (unparsable dates, bad booleans, violated record
//! invariants, duplicate ids) are skipped and counted, never fatal; a
//! missing required header is. Column names are configurable and default
//! to the upstream export contract.
use std::collections::HashSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use serde::Serialize;

use crate::data::{MemberRecord, VisitRecord};

/// Rows seen vs. rows dropped by a read call. Surfaced to the caller so a
/// dashboard can warn about dirty input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub rows_read: usize,
    pub rows_skipped: usize,
}

/// Column names for the member table.
#[derive(Debug, Clone)]
pub struct MemberTableConfig {
    pub member_id: String,
    pub registration_date: String,
    pub membership_end_date: String,
    pub age: String,
    pub gender: String,
    pub zumba: String,
    pub body_pump: String,
    pub pilates: String,
    pub spinning: String,
}

impl Default for MemberTableConfig {
    fn default() -> Self {
        Self {
            member_id: "USER_ID".to_string(),
            registration_date: "REGISTRATION_DATE".to_string(),
            membership_end_date: "MEMBERSHIP_END_DATE".to_string(),
            age: "AGE".to_string(),
            gender: "GENDER".to_string(),
            zumba: "ZUMBA".to_string(),
            body_pump: "BODY_PUMP".to_string(),
            pilates: "PILATES".to_string(),
            spinning: "SPINNING".to_string(),
        }
    }
}

/// Column names for the visit table.
#[derive(Debug, Clone)]
pub struct VisitTableConfig {
    pub member_id: String,
    pub entry_time: String,
    pub exit_time: String,
}

impl Default for VisitTableConfig {
    fn default() -> Self {
        Self {
            member_id: "USER_ID".to_string(),
            entry_time: "ENTRY_TIME".to_string(),
            exit_time: "EXIT_TIME".to_string(),
        }
    }
}

/// Read the member table with default column names.
pub fn read_member_table<P: AsRef<Path>>(path: P) -> Result<(Vec<MemberRecord>, IngestionReport)> {
    read_member_table_with_config(path, &MemberTableConfig::default())
}

pub fn read_member_table_with_config<P: AsRef<Path>>(
    path: P,
    config: &MemberTableConfig,
) -> Result<(Vec<MemberRecord>, IngestionReport)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("failed to open member table: {}", path.as_ref().display()))?;

    let headers = reader
        .headers()
        .context("failed to read member table header row")?
        .clone();
    let id_idx = require_column(&headers, &config.member_id)?;
    let reg_idx = require_column(&headers, &config.registration_date)?;
    let end_idx = require_column(&headers, &config.membership_end_date)?;
    let age_idx = require_column(&headers, &config.age)?;
    let gender_idx = require_column(&headers, &config.gender)?;
    let class_idx = [
        require_column(&headers, &config.zumba)?,
        require_column(&headers, &config.body_pump)?,
        require_column(&headers, &config.pilates)?,
        require_column(&headers, &config.spinning)?,
    ];

    let mut members = Vec::new();
    let mut report = IngestionReport::default();
    let mut seen_ids: HashSet<i64> = HashSet::new();

    for (row, result) in reader.records().enumerate() {
        report.rows_read += 1;
        let line = row + 2; // 1-based, after the header
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                skip_row("member", line, &format!("malformed row: {err}"), &mut report);
                continue;
            }
        };

        match parse_member_row(&record, id_idx, reg_idx, end_idx, age_idx, gender_idx, &class_idx)
        {
            Ok(member) => {
                if !seen_ids.insert(member.member_id) {
                    skip_row(
                        "member",
                        line,
                        &format!("duplicate member id {}", member.member_id),
                        &mut report,
                    );
                    continue;
                }
                members.push(member);
            }
            Err(reason) => skip_row("member", line, &reason, &mut report),
        }
    }

    log::info!(
        "member table: {} rows read, {} kept, {} skipped",
        report.rows_read,
        members.len(),
        report.rows_skipped
    );
    Ok((members, report))
}

/// Read the visit table with default column names.
pub fn read_visit_table<P: AsRef<Path>>(path: P) -> Result<(Vec<VisitRecord>, IngestionReport)> {
    read_visit_table_with_config(path, &VisitTableConfig::default())
}

pub fn read_visit_table_with_config<P: AsRef<Path>>(
    path: P,
    config: &VisitTableConfig,
) -> Result<(Vec<VisitRecord>, IngestionReport)> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .with_context(|| format!("failed to open visit table: {}", path.as_ref().display()))?;

    let headers = reader
        .headers()
        .context("failed to read visit table header row")?
        .clone();
    let id_idx = require_column(&headers, &config.member_id)?;
    let entry_idx = require_column(&headers, &config.entry_time)?;
    let exit_idx = require_column(&headers, &config.exit_time)?;

    let mut visits = Vec::new();
    let mut report = IngestionReport::default();

    for (row, result) in reader.records().enumerate() {
        report.rows_read += 1;
        let line = row + 2;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                skip_row("visit", line, &format!("malformed row: {err}"), &mut report);
                continue;
            }
        };

        match parse_visit_row(&record, id_idx, entry_idx, exit_idx) {
            Ok(visit) => visits.push(visit),
            Err(reason) => skip_row("visit", line, &reason, &mut report),
        }
    }

    log::info!(
        "visit table: {} rows read, {} kept, {} skipped",
        report.rows_read,
        visits.len(),
        report.rows_skipped
    );
    Ok((visits, report))
}

fn parse_member_row(
    record: &StringRecord,
    id_idx: usize,
    reg_idx: usize,
    end_idx: usize,
    age_idx: usize,
    gender_idx: usize,
    class_idx: &[usize; 4],
) -> std::result::Result<MemberRecord, String> {
    let member_id = field(record, id_idx)?
        .parse::<i64>()
        .map_err(|_| format!("invalid member id '{}'", field(record, id_idx).unwrap_or("")))?;

    let registration = parse_required_timestamp(field(record, reg_idx)?)?;
    let membership_end = parse_optional_timestamp(record.get(end_idx).unwrap_or(""))?;
    if let Some(end) = membership_end {
        if end < registration {
            return Err(format!(
                "membership end {end} precedes registration {registration}"
            ));
        }
    }

    let age = field(record, age_idx)?
        .parse::<u32>()
        .map_err(|_| format!("invalid age '{}'", field(record, age_idx).unwrap_or("")))?;
    let gender = field(record, gender_idx)?.to_string();

    let mut flags = [false; 4];
    for (slot, &idx) in flags.iter_mut().zip(class_idx) {
        *slot = parse_bool(field(record, idx)?)
            .ok_or_else(|| format!("invalid boolean '{}'", field(record, idx).unwrap_or("")))?;
    }

    Ok(MemberRecord {
        member_id,
        registration,
        membership_end,
        age,
        gender,
        zumba: flags[0],
        body_pump: flags[1],
        pilates: flags[2],
        spinning: flags[3],
    })
}

fn parse_visit_row(
    record: &StringRecord,
    id_idx: usize,
    entry_idx: usize,
    exit_idx: usize,
) -> std::result::Result<VisitRecord, String> {
    let member_id = field(record, id_idx)?
        .parse::<i64>()
        .map_err(|_| format!("invalid member id '{}'", field(record, id_idx).unwrap_or("")))?;
    let entry = parse_required_timestamp(field(record, entry_idx)?)?;
    let exit = parse_optional_timestamp(record.get(exit_idx).unwrap_or(""))?;
    if let Some(exit_time) = exit {
        if exit_time < entry {
            return Err(format!("exit {exit_time} precedes entry {entry}"));
        }
    }
    Ok(VisitRecord {
        member_id,
        entry,
        exit,
    })
}

fn field<'a>(record: &'a StringRecord, idx: usize) -> std::result::Result<&'a str, String> {
    record
        .get(idx)
        .ok_or_else(|| format!("missing value in column {idx}"))
}

fn require_column(headers: &StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| anyhow!("missing required column '{name}'"))
}

fn skip_row(table: &str, line: usize, reason: &str, report: &mut IngestionReport) {
    report.rows_skipped += 1;
    log::warn!("skipping {table} row {line}: {reason}");
}

/// Parse a timestamp in `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS[.f]`,
/// ISO-8601 `T`-separated, or RFC 3339 (offset normalized to UTC) form.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_required_timestamp(raw: &str) -> std::result::Result<NaiveDateTime, String> {
    parse_timestamp(raw).ok_or_else(|| format!("unparsable timestamp '{raw}'"))
}

/// Empty and the usual null spellings mean "absent"; anything else must
/// parse as a timestamp.
fn parse_optional_timestamp(raw: &str) -> std::result::Result<Option<NaiveDateTime>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || matches!(trimmed.to_ascii_lowercase().as_str(), "null" | "none" | "nan" | "nat") {
        return Ok(None);
    }
    parse_required_timestamp(trimmed).map(Some)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn parses_accepted_timestamp_forms() {
        assert!(parse_timestamp("2025-03-01").is_some());
        assert!(parse_timestamp("2025-03-01 18:30:00").is_some());
        assert!(parse_timestamp("2025-03-01T18:30:00").is_some());
        assert!(parse_timestamp("2025-03-01T18:30:00.250").is_some());
        assert!(parse_timestamp("2025-03-01T18:30:00Z").is_some());
        assert!(parse_timestamp("03/01/2025").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn member_reader_skips_and_counts_bad_rows() {
        let file = write_temp(
            "USER_ID,REGISTRATION_DATE,MEMBERSHIP_END_DATE,AGE,GENDER,ZUMBA,BODY_PUMP,PILATES,SPINNING\n\
             10001,2024-01-15,,34,F,true,false,false,true\n\
             10002,not-a-date,,41,M,false,false,false,false\n\
             10003,2024-02-01,2024-01-01,29,F,true,true,false,false\n\
             10001,2024-03-01,,50,M,false,false,true,false\n\
             10004,2024-04-01,2024-06-01,58,X,maybe,false,false,false\n\
             10005,2024-05-01 09:30:00,2025-01-01T00:00:00,23,M,1,0,1,0\n",
        );
        let (members, report) = read_member_table(file.path()).unwrap();
        // kept: 10001, 10005; skipped: bad date, end<registration,
        // duplicate id, bad boolean
        assert_eq!(report.rows_read, 6);
        assert_eq!(report.rows_skipped, 4);
        let ids: Vec<i64> = members.iter().map(|m| m.member_id).collect();
        assert_eq!(ids, vec![10001, 10005]);
        assert!(members[1].membership_end.is_some());
        assert!(members[1].zumba && !members[1].body_pump);
    }

    #[test]
    fn visit_reader_handles_incomplete_and_invalid_rows() {
        let file = write_temp(
            "USER_ID,ENTRY_TIME,EXIT_TIME\n\
             10001,2025-03-01T18:00:00,2025-03-01T19:05:00\n\
             10001,2025-03-03T18:00:00,\n\
             10002,2025-03-04T18:00:00,2025-03-04T17:00:00\n\
             oops,2025-03-05T18:00:00,2025-03-05T19:00:00\n",
        );
        let (visits, report) = read_visit_table(file.path()).unwrap();
        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_skipped, 2);
        assert_eq!(visits.len(), 2);
        assert!(visits[0].exit.is_some());
        assert!(visits[1].exit.is_none());
    }

    #[test]
    fn missing_required_header_is_fatal() {
        let file = write_temp("USER_ID,ENTRY_TIME\n10001,2025-03-01T18:00:00\n");
        assert!(read_visit_table(file.path()).is_err());
    }
}

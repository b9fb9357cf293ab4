use crate::model::{AttendanceRecord, AttendanceStatus, Snapshot};
use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

/// One-decimal rounding, half away from zero.
pub fn round_off_1_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Serialize)]
pub struct RecapError {
    pub code: String,
    pub message: String,
}

impl RecapError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Months `start_month..=end_month` of `year`. An inverted range matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRange {
    pub year: i32,
    pub start_month: u32,
    pub end_month: u32,
}

impl MonthRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && self.start_month <= date.month() && date.month() <= self.end_month
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecapFilters {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub date_range: Option<MonthRange>,
}

impl RecapFilters {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        if let Some(class_id) = &self.class_id {
            if record.class_id() != class_id {
                return false;
            }
        }
        if let Some(subject_id) = &self.subject_id {
            if record.subject_id() != subject_id {
                return false;
            }
        }
        match &self.date_range {
            Some(range) => range.contains(record.date()),
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub present: usize,
    pub excused: usize,
    pub sick: usize,
    pub absent: usize,
    pub total: usize,
    pub percentage: f64,
}

impl StudentStats {
    fn tally<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a AttendanceRecord>,
    {
        let mut stats = StudentStats::default();
        for r in records {
            match r.status {
                AttendanceStatus::Present => stats.present += 1,
                AttendanceStatus::Excused => stats.excused += 1,
                AttendanceStatus::Sick => stats.sick += 1,
                AttendanceStatus::Absent => stats.absent += 1,
            }
            stats.total += 1;
        }
        stats.percentage = if stats.total > 0 {
            round_off_1_decimal(stats.present as f64 / stats.total as f64 * 100.0)
        } else {
            0.0
        };
        stats
    }

    pub fn percentage_label(&self) -> String {
        format!("{:.1}%", self.percentage)
    }
}

pub fn student_stats(
    records: &[AttendanceRecord],
    student_id: &str,
    filters: &RecapFilters,
) -> StudentStats {
    StudentStats::tally(
        records
            .iter()
            .filter(|r| r.student_id() == student_id && filters.matches(r)),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceBand {
    Good,
    Fair,
    Poor,
}

impl AttendanceBand {
    pub fn for_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            AttendanceBand::Good
        } else if percentage >= 75.0 {
            AttendanceBand::Fair
        } else {
            AttendanceBand::Poor
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecapRow {
    pub seq: usize,
    pub student_id: String,
    pub name: String,
    pub nisn: String,
    pub class_name: String,
    pub stats: StudentStats,
    pub band: AttendanceBand,
}

/// Rows for the students of `filters.class_id`, or every student when unset.
pub fn recap_rows(snapshot: &Snapshot, filters: &RecapFilters) -> Vec<RecapRow> {
    let mut students: Vec<_> = match &filters.class_id {
        Some(class_id) => snapshot
            .students
            .iter()
            .filter(|s| &s.class_id == class_id)
            .collect(),
        None => snapshot.students.iter().collect(),
    };
    students.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.id.cmp(&b.id))
    });

    students
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            let stats = student_stats(&snapshot.records, &s.id, filters);
            RecapRow {
                seq: i + 1,
                student_id: s.id.clone(),
                name: s.name.clone(),
                nisn: s.nisn.clone(),
                class_name: snapshot
                    .class(&s.class_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "-".to_string()),
                stats,
                band: AttendanceBand::for_percentage(stats.percentage),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: usize,
    pub excused: usize,
    pub sick: usize,
    pub absent: usize,
}

impl StatusCounts {
    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Excused => self.excused += 1,
            AttendanceStatus::Sick => self.sick += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    fn get(&self, status: AttendanceStatus) -> usize {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::Excused => self.excused,
            AttendanceStatus::Sick => self.sick,
            AttendanceStatus::Absent => self.absent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCounts {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub counts: StatusCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusShare {
    pub status: AttendanceStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub student_count: usize,
    pub class_count: usize,
    pub subject_count: usize,
    pub records_today: usize,
    pub last_seven_days: Vec<DailyCounts>,
    pub distribution: Vec<StatusShare>,
}

/// Days that would fall before `NaiveDate::MIN` are left out of `last_seven_days`.
pub fn dashboard(snapshot: &Snapshot, today: NaiveDate) -> DashboardSummary {
    let last_seven_days = (0..7)
        .rev()
        .filter_map(|back| today.checked_sub_signed(Duration::days(back)))
        .map(|date| {
            let mut counts = StatusCounts::default();
            for r in snapshot.records.iter().filter(|r| r.date() == date) {
                counts.add(r.status);
            }
            DailyCounts { date, counts }
        })
        .collect();

    let mut overall = StatusCounts::default();
    for r in &snapshot.records {
        overall.add(r.status);
    }
    let distribution = AttendanceStatus::ALL
        .iter()
        .map(|&status| StatusShare {
            status,
            count: overall.get(status),
        })
        .filter(|s| s.count > 0)
        .collect();

    DashboardSummary {
        student_count: snapshot.students.len(),
        class_count: snapshot.classes.len(),
        subject_count: snapshot.subjects.len(),
        records_today: snapshot.records.iter().filter(|r| r.date() == today).count(),
        last_seven_days,
        distribution,
    }
}

fn optional_id(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<Option<String>, RecapError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(RecapError::new(
                    "bad_params",
                    format!("{} must be string or null", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

fn optional_month(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Result<Option<u32>, RecapError> {
    let n = match obj.get(key) {
        None => return Ok(None),
        Some(v) if v.is_null() => return Ok(None),
        Some(v) => match (v.as_u64(), v.as_str()) {
            (Some(n), _) => n,
            (None, Some(s)) => s.trim().parse::<u64>().map_err(|_| {
                RecapError::new("bad_params", format!("{} must be a month number", key))
            })?,
            _ => {
                return Err(RecapError::new(
                    "bad_params",
                    format!("{} must be a month number", key),
                ))
            }
        },
    };
    if !(1..=12).contains(&n) {
        return Err(RecapError::new(
            "bad_params",
            format!("{} must be between 1 and 12", key),
        ));
    }
    Ok(Some(n as u32))
}

fn parse_year(v: &serde_json::Value) -> Result<Option<i32>, RecapError> {
    let bad = || RecapError::new("bad_params", "yearFilter must be a four-digit year");
    let n = if let Some(n) = v.as_i64() {
        n
    } else if let Some(s) = v.as_str() {
        let t = s.trim();
        if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
            return Ok(None);
        }
        if t.len() != 4 {
            return Err(bad());
        }
        t.parse::<i64>().map_err(|_| bad())?
    } else {
        return Err(bad());
    };
    if !(1000..=9999).contains(&n) {
        return Err(bad());
    }
    Ok(Some(n as i32))
}

/// Parses `{classId?, subjectId?, yearFilter?, startMonth?, endMonth?}`.
///
/// A date range only exists when `yearFilter` is given; missing months
/// default to the whole year. An inverted month pair is swapped here,
/// at the request boundary, so `MonthRange` itself never sees one from
/// a request.
pub fn parse_recap_filters(raw: &serde_json::Value) -> Result<RecapFilters, RecapError> {
    if raw.is_null() {
        return Ok(RecapFilters::default());
    }
    let Some(obj) = raw.as_object() else {
        return Err(RecapError::new("bad_params", "filters must be an object"));
    };

    let class_id = optional_id(obj, "classId")?;
    let subject_id = optional_id(obj, "subjectId")?;

    let year = match obj.get("yearFilter") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => parse_year(v)?,
    };

    let start = optional_month(obj, "startMonth")?;
    let end = optional_month(obj, "endMonth")?;

    let date_range = year.map(|year| {
        let mut start_month = start.unwrap_or(1);
        let mut end_month = end.unwrap_or(12);
        if start_month > end_month {
            std::mem::swap(&mut start_month, &mut end_month);
        }
        MonthRange {
            year,
            start_month,
            end_month,
        }
    });

    Ok(RecapFilters {
        class_id,
        subject_id,
        date_range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassRoom, SessionKey, Student};
    use serde_json::json;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn rec(student: &str, class: &str, subject: &str, d: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord::new(&SessionKey::new(class, subject, d), student, status)
    }

    fn sample() -> Vec<AttendanceRecord> {
        vec![
            rec("S1", "C1", "M1", date(2024, 1, 10), AttendanceStatus::Present),
            rec("S1", "C1", "M1", date(2024, 2, 15), AttendanceStatus::Absent),
            rec("S1", "C1", "M2", date(2024, 1, 20), AttendanceStatus::Present),
        ]
    }

    #[test]
    fn filter_by_class_subject_and_month() {
        let filters = RecapFilters {
            class_id: Some("C1".into()),
            subject_id: Some("M1".into()),
            date_range: Some(MonthRange {
                year: 2024,
                start_month: 1,
                end_month: 1,
            }),
        };
        let stats = student_stats(&sample(), "S1", &filters);
        assert_eq!(
            stats,
            StudentStats {
                present: 1,
                excused: 0,
                sick: 0,
                absent: 0,
                total: 1,
                percentage: 100.0,
            }
        );
    }

    #[test]
    fn no_matches_gives_zero_percentage() {
        let stats = student_stats(&sample(), "S9", &RecapFilters::default());
        assert_eq!(stats.total, 0);
        assert_eq!(stats.percentage, 0.0);
        assert!(!stats.percentage.is_nan());
    }

    #[test]
    fn counts_are_conserved_and_percentage_bounded() {
        let statuses = [
            AttendanceStatus::Present,
            AttendanceStatus::Sick,
            AttendanceStatus::Excused,
            AttendanceStatus::Absent,
            AttendanceStatus::Present,
            AttendanceStatus::Present,
        ];
        let records: Vec<_> = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| rec("S1", "C1", "M1", date(2024, 3, 1 + i as u32), *s))
            .collect();
        for n in 0..=records.len() {
            let stats = student_stats(&records[..n], "S1", &RecapFilters::default());
            assert_eq!(stats.present + stats.excused + stats.sick + stats.absent, stats.total);
            assert_eq!(stats.total, n);
            assert!((0.0..=100.0).contains(&stats.percentage));
        }
        let all = student_stats(&records, "S1", &RecapFilters::default());
        assert_eq!(all.percentage, 50.0);
    }

    #[test]
    fn percentage_rounds_to_one_decimal() {
        let records = vec![
            rec("S1", "C1", "M1", date(2024, 3, 1), AttendanceStatus::Present),
            rec("S1", "C1", "M1", date(2024, 3, 2), AttendanceStatus::Present),
            rec("S1", "C1", "M1", date(2024, 3, 3), AttendanceStatus::Sick),
        ];
        let stats = student_stats(&records, "S1", &RecapFilters::default());
        assert_eq!(stats.percentage, 66.7);
        assert_eq!(stats.percentage_label(), "66.7%");
    }

    #[test]
    fn inverted_month_range_matches_nothing() {
        let filters = RecapFilters {
            date_range: Some(MonthRange {
                year: 2024,
                start_month: 2,
                end_month: 1,
            }),
            ..Default::default()
        };
        assert_eq!(student_stats(&sample(), "S1", &filters).total, 0);
    }

    #[test]
    fn year_must_match() {
        let filters = RecapFilters {
            date_range: Some(MonthRange {
                year: 2023,
                start_month: 1,
                end_month: 12,
            }),
            ..Default::default()
        };
        assert_eq!(student_stats(&sample(), "S1", &filters).total, 0);
    }

    #[test]
    fn parse_filters_swaps_inverted_months_and_treats_all_as_absent() {
        let parsed = parse_recap_filters(&json!({
            "classId": "ALL",
            "subjectId": "",
            "yearFilter": "2024",
            "startMonth": 6,
            "endMonth": "2"
        }))
        .expect("parse filters");
        assert_eq!(parsed.class_id, None);
        assert_eq!(parsed.subject_id, None);
        assert_eq!(
            parsed.date_range,
            Some(MonthRange {
                year: 2024,
                start_month: 2,
                end_month: 6
            })
        );
    }

    #[test]
    fn parse_filters_without_year_has_no_range() {
        let parsed = parse_recap_filters(&json!({ "startMonth": 3 })).expect("parse filters");
        assert_eq!(parsed.date_range, None);
        let whole_year = parse_recap_filters(&json!({ "yearFilter": 2025 })).expect("parse");
        assert_eq!(
            whole_year.date_range,
            Some(MonthRange {
                year: 2025,
                start_month: 1,
                end_month: 12
            })
        );
    }

    #[test]
    fn parse_filters_rejects_bad_values() {
        assert!(parse_recap_filters(&json!({ "yearFilter": "24" })).is_err());
        assert!(parse_recap_filters(&json!({ "yearFilter": 2024, "startMonth": 13 })).is_err());
        assert!(parse_recap_filters(&json!({ "classId": 7 })).is_err());
        assert!(parse_recap_filters(&json!([])).is_err());
    }

    #[test]
    fn bands_follow_thresholds() {
        assert_eq!(AttendanceBand::for_percentage(95.0), AttendanceBand::Good);
        assert_eq!(AttendanceBand::for_percentage(90.0), AttendanceBand::Good);
        assert_eq!(AttendanceBand::for_percentage(75.0), AttendanceBand::Fair);
        assert_eq!(AttendanceBand::for_percentage(74.9), AttendanceBand::Poor);
    }

    #[test]
    fn rows_cover_class_roster_in_name_order() {
        let snapshot = Snapshot {
            classes: vec![ClassRoom {
                id: "C1".into(),
                name: "7A".into(),
            }],
            students: vec![
                Student {
                    id: "S2".into(),
                    nisn: "002".into(),
                    name: "Budi".into(),
                    class_id: "C1".into(),
                },
                Student {
                    id: "S1".into(),
                    nisn: "001".into(),
                    name: "Ani".into(),
                    class_id: "C1".into(),
                },
                Student {
                    id: "S3".into(),
                    nisn: "003".into(),
                    name: "Citra".into(),
                    class_id: "C2".into(),
                },
            ],
            subjects: vec![],
            records: sample(),
        };
        let rows = recap_rows(
            &snapshot,
            &RecapFilters {
                class_id: Some("C1".into()),
                ..Default::default()
            },
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Ani");
        assert_eq!(rows[0].seq, 1);
        assert_eq!(rows[0].class_name, "7A");
        assert_eq!(rows[0].stats.total, 3);
        assert_eq!(rows[0].band, AttendanceBand::Poor);
        assert_eq!(rows[1].stats.total, 0);

        let everyone = recap_rows(&snapshot, &RecapFilters::default());
        assert_eq!(everyone.len(), 3);
        assert_eq!(everyone[2].class_name, "-");
    }

    #[test]
    fn dashboard_counts_last_seven_days() {
        let today = date(2024, 1, 20);
        let snapshot = Snapshot {
            records: sample(),
            ..Default::default()
        };
        let summary = dashboard(&snapshot, today);
        assert_eq!(summary.records_today, 1);
        assert_eq!(summary.last_seven_days.len(), 7);
        assert_eq!(summary.last_seven_days[0].date, date(2024, 1, 14));
        assert_eq!(summary.last_seven_days[6].date, today);
        assert_eq!(summary.last_seven_days[6].counts.present, 1);
        assert_eq!(summary.distribution.len(), 2);
        assert_eq!(summary.distribution[0].status, AttendanceStatus::Present);
        assert_eq!(summary.distribution[0].count, 2);
    }

    #[test]
    fn dashboard_at_earliest_date_does_not_overflow() {
        let snapshot = Snapshot::default();
        let summary = dashboard(&snapshot, NaiveDate::MIN);
        assert_eq!(summary.last_seven_days.len(), 1);
        assert_eq!(summary.last_seven_days[0].date, NaiveDate::MIN);

        let near = NaiveDate::MIN + Duration::days(2);
        assert_eq!(dashboard(&snapshot, near).last_seven_days.len(), 3);
    }
}

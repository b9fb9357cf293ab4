use crate::book::NewStudent;
use crate::recap::RecapRow;
use anyhow::{anyhow, Context};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};
use std::path::Path;

const NAME_ALIASES: &[&str] = &["name", "nama", "nama lengkap", "student name"];
const NISN_ALIASES: &[&str] = &["nisn", "nomor induk", "registration number"];

pub const RECAP_SHEET_NAME: &str = "Attendance Recap";
pub const RECAP_HEADERS: [&str; 10] = [
    "No",
    "Name",
    "NISN",
    "Class",
    "Present",
    "Excused",
    "Sick",
    "Absent",
    "Total Sessions",
    "Attendance %",
];
const RECAP_COLUMN_WIDTHS: [f64; 10] = [5.0, 30.0, 15.0, 15.0, 10.0, 10.0, 10.0, 10.0, 12.0, 15.0];

#[derive(Default)]
pub struct ImportOutcome {
    pub rows: Vec<NewStudent>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SheetKind {
    Csv,
    Workbook,
}

fn sheet_kind(path: &Path) -> anyhow::Result<SheetKind> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => Ok(SheetKind::Csv),
        "xlsx" | "xlsm" | "xls" | "ods" => Ok(SheetKind::Workbook),
        other => Err(anyhow!("unsupported spreadsheet type: .{}", other)),
    }
}

fn find_column(headers: &[String], aliases: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| aliases.contains(&h.trim().to_lowercase().as_str()))
}

fn collect_rows<I>(headers: Vec<String>, rows: I) -> anyhow::Result<ImportOutcome>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let name_col = find_column(&headers, NAME_ALIASES);
    let nisn_col = find_column(&headers, NISN_ALIASES);
    // Not a roster sheet at all; callers report it as empty.
    if name_col.is_none() && nisn_col.is_none() {
        return Ok(ImportOutcome::default());
    }

    let mut outcome = ImportOutcome::default();
    for row in rows {
        let pick = |col: Option<usize>| {
            col.and_then(|c| row.get(c))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };
        let name = pick(name_col);
        let nisn = pick(nisn_col);
        if name.is_empty() || nisn.is_empty() {
            outcome.skipped += 1;
            continue;
        }
        outcome.rows.push(NewStudent { nisn, name });
    }
    Ok(outcome)
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Registration numbers typed into numeric cells come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Reads the first sheet of a workbook (or a CSV file) into student rows.
/// Rows missing a name or NISN are dropped and counted.
pub fn read_student_rows(path: &Path) -> anyhow::Result<ImportOutcome> {
    match sheet_kind(path)? {
        SheetKind::Csv => {
            let mut rdr = csv::ReaderBuilder::new()
                .flexible(true)
                .trim(csv::Trim::All)
                .from_path(path)
                .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
            let headers: Vec<String> = rdr
                .headers()
                .context("failed to read CSV header")?
                .iter()
                .map(|h| h.trim_start_matches('\u{feff}').to_string())
                .collect();
            let mut rows = Vec::new();
            for rec in rdr.records() {
                let rec = rec.context("failed to read CSV row")?;
                rows.push(rec.iter().map(|v| v.to_string()).collect());
            }
            collect_rows(headers, rows)
        }
        SheetKind::Workbook => {
            let mut workbook = open_workbook_auto(path)
                .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
            let Some(sheet) = workbook.sheet_names().first().cloned() else {
                return Err(anyhow!("workbook has no sheets"));
            };
            let range = workbook
                .worksheet_range(&sheet)
                .with_context(|| format!("failed to read sheet {}", sheet))?;
            let mut rows = range.rows().map(|r| r.iter().map(cell_text).collect::<Vec<_>>());
            let Some(headers) = rows.next() else {
                return Ok(ImportOutcome::default());
            };
            collect_rows(headers, rows)
        }
    }
}

fn recap_cells(row: &RecapRow) -> [String; 10] {
    [
        row.seq.to_string(),
        row.name.clone(),
        row.nisn.clone(),
        row.class_name.clone(),
        row.stats.present.to_string(),
        row.stats.excused.to_string(),
        row.stats.sick.to_string(),
        row.stats.absent.to_string(),
        row.stats.total.to_string(),
        row.stats.percentage_label(),
    ]
}

pub fn write_recap(path: &Path, rows: &[RecapRow]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }

    match sheet_kind(path)? {
        SheetKind::Csv => {
            let mut wtr = csv::Writer::from_path(path)
                .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
            wtr.write_record(RECAP_HEADERS)?;
            for row in rows {
                wtr.write_record(recap_cells(row))?;
            }
            wtr.flush().context("failed to flush CSV output")?;
        }
        SheetKind::Workbook => {
            let mut workbook = Workbook::new();
            let bold = Format::new().set_bold();
            let sheet = workbook.add_worksheet();
            sheet.set_name(RECAP_SHEET_NAME)?;
            for (col, (header, width)) in RECAP_HEADERS.iter().zip(RECAP_COLUMN_WIDTHS).enumerate() {
                sheet.write_string_with_format(0, col as u16, *header, &bold)?;
                sheet.set_column_width(col as u16, width)?;
            }
            for (i, row) in rows.iter().enumerate() {
                let r = (i + 1) as u32;
                sheet.write_number(r, 0, row.seq as f64)?;
                sheet.write_string(r, 1, row.name.as_str())?;
                sheet.write_string(r, 2, row.nisn.as_str())?;
                sheet.write_string(r, 3, row.class_name.as_str())?;
                sheet.write_number(r, 4, row.stats.present as f64)?;
                sheet.write_number(r, 5, row.stats.excused as f64)?;
                sheet.write_number(r, 6, row.stats.sick as f64)?;
                sheet.write_number(r, 7, row.stats.absent as f64)?;
                sheet.write_number(r, 8, row.stats.total as f64)?;
                sheet.write_string(r, 9, row.stats.percentage_label())?;
            }
            workbook
                .save(path)
                .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
        }
    }
    Ok(())
}

/// Blank roster sheet with the expected header and two sample rows.
pub fn write_import_template(path: &Path) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Students")?;
    sheet.write_string(0, 0, "NISN")?;
    sheet.write_string(0, 1, "Name")?;
    sheet.write_string(1, 0, "1234567890")?;
    sheet.write_string(1, 1, "Budi Santoso")?;
    sheet.write_string(2, 0, "0987654321")?;
    sheet.write_string(2, 1, "Ani Wijaya")?;
    sheet.set_column_width(0, 15.0)?;
    sheet.set_column_width(1, 30.0)?;
    workbook
        .save(path)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
    Ok(())
}

pub fn suggested_recap_file_name(
    class_name: Option<&str>,
    subject_name: Option<&str>,
    on: NaiveDate,
) -> String {
    let slug = |s: &str| s.split_whitespace().collect::<Vec<_>>().join("_");
    format!(
        "attendance_recap_{}_{}_{}.xlsx",
        slug(class_name.unwrap_or("all classes")),
        slug(subject_name.unwrap_or("all subjects")),
        on.format("%Y-%m-%d")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recap::{AttendanceBand, StudentStats};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(prefix: &str) -> std::path::PathBuf {
        let p = std::env::temp_dir().join(format!(
            "{}-{}",
            prefix,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&p).expect("create temp dir");
        p
    }

    #[test]
    fn csv_import_uses_aliases_and_drops_incomplete_rows() {
        let dir = temp_dir("rollbook-transfer-csv");
        let path = dir.join("roster.csv");
        std::fs::write(
            &path,
            "Nomor Induk,Nama\n001,Ani\n,Tanpa Nomor\n003,\n004,Dewi\n",
        )
        .expect("write csv");

        let outcome = read_student_rows(&path).expect("read csv");
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.rows[0].nisn, "001");
        assert_eq!(outcome.rows[1].name, "Dewi");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn header_without_known_columns_reads_nothing() {
        let dir = temp_dir("rollbook-transfer-header");
        let path = dir.join("bad.csv");
        std::fs::write(&path, "foo,bar\n1,2\n").expect("write csv");
        let outcome = read_student_rows(&path).expect("read csv");
        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.skipped, 0);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn template_reads_back_as_two_students() {
        let dir = temp_dir("rollbook-transfer-template");
        let path = dir.join("template.xlsx");
        write_import_template(&path).expect("write template");
        let outcome = read_student_rows(&path).expect("read template");
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].nisn, "1234567890");
        assert_eq!(outcome.rows[1].name, "Ani Wijaya");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn numeric_cells_render_without_decimal_point() {
        assert_eq!(cell_text(&Data::Float(1234567890.0)), "1234567890");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::Empty), "");
    }

    #[test]
    fn recap_csv_has_one_line_per_row() {
        let dir = temp_dir("rollbook-transfer-recap");
        let path = dir.join("recap.csv");
        let rows = vec![RecapRow {
            seq: 1,
            student_id: "S1".into(),
            name: "Ani".into(),
            nisn: "001".into(),
            class_name: "7A".into(),
            stats: StudentStats {
                present: 2,
                excused: 0,
                sick: 1,
                absent: 0,
                total: 3,
                percentage: 66.7,
            },
            band: AttendanceBand::Poor,
        }];
        write_recap(&path, &rows).expect("write recap");
        let text = std::fs::read_to_string(&path).expect("read recap");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("No,Name,NISN,Class"));
        assert_eq!(lines[1], "1,Ani,001,7A,2,0,1,0,3,66.7%");
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn file_name_replaces_whitespace() {
        let on = NaiveDate::from_ymd_opt(2024, 5, 2).expect("date");
        assert_eq!(
            suggested_recap_file_name(Some("Kelas 7 A"), None, on),
            "attendance_recap_Kelas_7_A_all_subjects_2024-05-02.xlsx"
        );
    }
}

//! Output formatting and CSV export.
//!
//! Tables are written to a buffer first so the same bytes can be stored
//! plain or gzip-compressed.

use anyhow::{Context, Result};
use csv::Writer;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyzers::toll::Overlay;
use crate::analyzers::types::{MonthlySeries, WeeklySeries};
use crate::analyzers::utility::round_to;
use crate::calendar::month_name;
use crate::stats::StatisticsSummary;

/// Logs a value using Rust's debug pretty-print format.
pub fn print_pretty<T: Debug>(value: &T) {
    debug!("{:#?}", value);
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Rounds to a whole number and groups thousands with spaces,
/// e.g. `1234567.4` becomes `"1 234 567"`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }

    if rounded < 0.0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Formats `raw` with [`format_number`] when it parses as a number and
/// returns it unchanged otherwise.
pub fn format_text(raw: &str) -> String {
    match raw.trim().parse::<f64>() {
        Ok(value) => format_number(value),
        Err(_) => raw.to_string(),
    }
}

/// One month across every compared year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearRow {
    pub month: u32,
    pub label: String,
    /// One value per entry of [`YearTable::years`], rounded to whole vehicles.
    pub values: Vec<f64>,
}

/// Monthly volumes with one column per year.
#[derive(Debug, Clone, PartialEq)]
pub struct YearTable {
    pub years: Vec<i32>,
    pub rows: Vec<YearRow>,
}

impl YearTable {
    /// Builds the table, keeping only `months` when given.
    pub fn new(series: &BTreeMap<i32, MonthlySeries>, months: Option<&[u32]>) -> Self {
        let years: Vec<i32> = series.keys().copied().collect();
        let rows = (1..=12u32)
            .filter(|m| months.is_none_or(|sel| sel.contains(m)))
            .filter_map(|month| {
                let label = month_name(month)?.to_string();
                let values = series
                    .values()
                    .map(|s| round_to(s.volume(month).unwrap_or(0.0), 0))
                    .collect();
                Some(YearRow {
                    month,
                    label,
                    values,
                })
            })
            .collect();

        Self { years, rows }
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty() || self.rows.is_empty()
    }

    /// Human-readable lines: a header, then one line per month.
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        let header: Vec<String> = self.years.iter().map(|y| format!("{y:>12}")).collect();
        lines.push(format!("{:<10}{}", "Month", header.join("")));
        for row in &self.rows {
            let cells: Vec<String> = row
                .values
                .iter()
                .map(|v| format!("{:>12}", format_number(*v)))
                .collect();
            lines.push(format!("{:<10}{}", row.label, cells.join("")));
        }
        lines
    }

    fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::from_writer(Vec::new());

        let mut header = vec!["month".to_string()];
        header.extend(self.years.iter().map(|y| y.to_string()));
        writer.write_record(&header)?;

        for row in &self.rows {
            let mut record = vec![row.label.clone()];
            record.extend(row.values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }

        finish(writer)
    }
}

/// Writes the year comparison table as CSV and returns the path written.
pub fn write_year_table(path: impl AsRef<Path>, table: &YearTable, gzip: bool) -> Result<PathBuf> {
    store(path.as_ref(), table.to_csv()?, gzip)
}

/// Writes a statistics summary as `statistic,value` rows.
///
/// Undefined values are written as empty cells.
pub fn write_statistics(
    path: impl AsRef<Path>,
    summary: &StatisticsSummary,
    gzip: bool,
) -> Result<PathBuf> {
    let d = &summary.description;
    let a = &summary.additional;
    let rows: [(&str, Option<String>); 12] = [
        ("count", Some(d.count.to_string())),
        ("mean", Some(d.mean.to_string())),
        ("std", d.std.map(|v| v.to_string())),
        ("min", Some(d.min.to_string())),
        ("25%", Some(d.q25.to_string())),
        ("50%", Some(d.median.to_string())),
        ("75%", Some(d.q75.to_string())),
        ("max", Some(d.max.to_string())),
        ("peak", Some(format!("{} ({})", a.peak.value, a.peak.label))),
        ("lowest", Some(format!("{} ({})", a.lowest.value, a.lowest.label))),
        ("range", Some(a.range.to_string())),
        (
            "coefficient_of_variation",
            a.coefficient_of_variation.map(|v| v.to_string()),
        ),
    ];

    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(["statistic", "value"])?;
    for (name, value) in rows {
        writer.write_record([name, value.as_deref().unwrap_or("")])?;
    }

    store(path.as_ref(), finish(writer)?, gzip)
}

/// Writes one row per week.
pub fn write_weekly(path: impl AsRef<Path>, series: &WeeklySeries, gzip: bool) -> Result<PathBuf> {
    let mut writer = Writer::from_writer(Vec::new());
    for entry in &series.entries {
        writer.serialize(entry)?;
    }
    store(path.as_ref(), finish(writer)?, gzip)
}

/// Writes the twelve months of a toll overlay.
pub fn write_overlay(path: impl AsRef<Path>, overlay: &Overlay, gzip: bool) -> Result<PathBuf> {
    let mut writer = Writer::from_writer(Vec::new());
    for month in &overlay.months {
        writer.serialize(month)?;
    }
    store(path.as_ref(), finish(writer)?, gzip)
}

fn finish(writer: Writer<Vec<u8>>) -> Result<Vec<u8>> {
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("failed to flush CSV buffer: {}", e.error()))
}

/// Writes `bytes` to `path`, gzip-compressed with a `.gz` suffix when asked.
fn store(path: &Path, bytes: Vec<u8>, gzip: bool) -> Result<PathBuf> {
    let (target, body) = if gzip {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&bytes)?;
        let compressed = encoder.finish()?;

        let mut name = path.as_os_str().to_owned();
        name.push(".gz");
        (PathBuf::from(name), compressed)
    } else {
        (path.to_path_buf(), bytes)
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(&target, &body)
        .with_context(|| format!("failed to write {}", target.display()))?;

    debug!(path = %target.display(), bytes = body.len(), gzip, "CSV written");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::toll::{TollDataset, overlay};
    use crate::analyzers::types::WeeklyEntry;
    use crate::stats::{Labeled, summarize};
    use chrono::NaiveDate;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;

    fn series(year: i32, january: f64) -> MonthlySeries {
        let mut volumes = [0.0; 12];
        volumes[0] = january;
        volumes[1] = 2000.0;
        MonthlySeries {
            year,
            volumes,
            confidence: None,
            sensors: vec!["A".into()],
        }
    }

    fn table() -> YearTable {
        let by_year = BTreeMap::from([(2023, series(2023, 1234.6)), (2022, series(2022, 999.4))]);
        YearTable::new(&by_year, None)
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(1000.0), "1 000");
        assert_eq!(format_number(1234567.4), "1 234 567");
        assert_eq!(format_number(-12345.0), "-12 345");
        assert_eq!(format_number(999.5), "1 000");
    }

    #[test]
    fn test_format_text_passes_through_words() {
        assert_eq!(format_text("25000"), "25 000");
        assert_eq!(format_text("January"), "January");
    }

    #[test]
    fn test_year_table_orders_columns_and_rounds() {
        let t = table();

        assert_eq!(t.years, vec![2022, 2023]);
        assert_eq!(t.rows.len(), 12);
        assert_eq!(t.rows[0].label, "January");
        assert_eq!(t.rows[0].values, vec![999.0, 1235.0]);
    }

    #[test]
    fn test_year_table_month_filter() {
        let by_year = BTreeMap::from([(2023, series(2023, 10.0))]);
        let t = YearTable::new(&by_year, Some(&[2, 1]));

        assert_eq!(t.rows.iter().map(|r| r.month).collect::<Vec<_>>(), vec![1, 2]);
        assert!(t.lines()[2].contains("2 000"));
    }

    #[test]
    fn test_write_year_table_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_year_table(dir.path().join("years.csv"), &table(), false).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "month,2022,2023");
        assert_eq!(lines[1], "January,999,1235");
        assert_eq!(lines.len(), 13);
    }

    #[test]
    fn test_gzip_output_gets_suffix_and_decompresses() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_year_table(dir.path().join("years.csv"), &table(), true).unwrap();

        assert_eq!(path.file_name().unwrap(), "years.csv.gz");
        let mut decoded = String::new();
        GzDecoder::new(fs::File::open(&path).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert!(decoded.starts_with("month,2022,2023"));
    }

    #[test]
    fn test_write_statistics_leaves_undefined_empty() {
        let dir = tempfile::tempdir().unwrap();
        let summary = summarize(&[Labeled::new("January", 5.0)]).unwrap();

        let path = write_statistics(dir.path().join("stats.csv"), &summary, false).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("std,\n"));
        assert!(content.contains("peak,5 (January)"));
    }

    #[test]
    fn test_write_weekly_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let weekly = WeeklySeries {
            year: 2023,
            entries: vec![WeeklyEntry {
                week: 1,
                label: "Uke 1".into(),
                start: NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(),
                end: NaiveDate::from_ymd_opt(2023, 1, 8).unwrap(),
                volume: 250.0,
                sensors: 2,
            }],
        };
        let weekly_path = write_weekly(dir.path().join("out/weeks.csv"), &weekly, false).unwrap();
        let content = fs::read_to_string(weekly_path).unwrap();
        assert!(content.starts_with("week,label,start,end,volume,sensors"));
        assert!(content.contains("1,Uke 1,2023-01-02,2023-01-08,250.0,2"));

        let ds = TollDataset::from_reader("crossing,year,month,total,exempt\nX,2021,1,100,10\n".as_bytes()).unwrap();
        let o = overlay("X", 2021, &ds).unwrap();
        let overlay_path = write_overlay(dir.path().join("toll.csv"), &o, false).unwrap();
        let content = fs::read_to_string(overlay_path).unwrap();
        assert_eq!(content.lines().count(), 13);
        assert!(content.contains("1,100,10,90,10.0,,"));
    }

    #[test]
    fn test_print_helpers_do_not_panic() {
        print_pretty(&table());
        print_json(&BTreeMap::from([("a", 1)])).unwrap();
    }
}

use crate::analyzers::types::{ConfidenceBands, DailyRecord, MonthlyRecord, MonthlySeries};
use crate::analyzers::utility::mean;
use crate::calendar::validate_month;
use crate::error::Result;
use crate::stats::Labeled;
use std::collections::BTreeMap;
use tracing::warn;

/// Sums the monthly average daily volume of every sensor in a crossing.
///
/// Sensors are visited in id order. A sensor without a value for a month
/// adds nothing to it, so a month nobody reported for stays at 0.0 rather
/// than becoming missing.
pub fn aggregate_monthly(records: &BTreeMap<String, Vec<MonthlyRecord>>) -> [f64; 12] {
    let mut sums = [0.0; 12];

    for (point_id, months) in records {
        for entry in months {
            let Some(slot) = month_index(entry.month) else {
                warn!(point_id = %point_id, month = entry.month, "Ignoring out-of-range month");
                continue;
            };
            if let Some(volume) = entry.average_volume {
                sums[slot] += volume;
            }
        }
    }

    sums
}

/// Sums lower and upper confidence bounds per month.
///
/// A sensor/month contributes only when both of its bounds are present.
pub fn aggregate_confidence(records: &BTreeMap<String, Vec<MonthlyRecord>>) -> ConfidenceBands {
    let mut lower = [0.0; 12];
    let mut upper = [0.0; 12];

    for months in records.values() {
        for entry in months {
            let Some(slot) = month_index(entry.month) else {
                continue;
            };
            if let (Some(lo), Some(hi)) = (entry.confidence_lower, entry.confidence_upper) {
                lower[slot] += lo;
                upper[slot] += hi;
            }
        }
    }

    ConfidenceBands { lower, upper }
}

/// Builds the [`MonthlySeries`] of a crossing from its per-sensor records.
pub fn monthly_series(
    year: i32,
    records: &BTreeMap<String, Vec<MonthlyRecord>>,
    with_confidence: bool,
) -> MonthlySeries {
    MonthlySeries {
        year,
        volumes: aggregate_monthly(records),
        confidence: with_confidence.then(|| aggregate_confidence(records)),
        sensors: records.keys().cloned().collect(),
    }
}

/// Average daily volume of one sensor over the days of a week.
///
/// Days without a volume or with zero coverage are ignored. Returns `None`
/// when no valid day remains, which excludes the sensor from the week.
pub fn sensor_week_average(days: &[DailyRecord]) -> Option<f64> {
    let volumes: Vec<f64> = days
        .iter()
        .filter(|d| d.is_valid())
        .filter_map(|d| d.volume)
        .collect();

    if volumes.is_empty() {
        None
    } else {
        Some(mean(&volumes))
    }
}

/// Sums per-sensor week averages into one value per week.
///
/// A week that is present with no sensors yields 0.0.
pub fn aggregate_weekly(per_week: &BTreeMap<u32, BTreeMap<String, f64>>) -> BTreeMap<u32, f64> {
    per_week
        .iter()
        .map(|(week, sensors)| (*week, sensors.values().sum()))
        .collect()
}

/// Restricts a monthly series to the chosen months, in calendar order.
pub fn filter_months(series: &MonthlySeries, months: &[u32]) -> Result<Vec<Labeled>> {
    for month in months {
        validate_month(*month)?;
    }
    Ok(series.labeled(Some(months)))
}

fn month_index(month: u32) -> Option<usize> {
    (1..=12).contains(&month).then(|| month as usize - 1)
}

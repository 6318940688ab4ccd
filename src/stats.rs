//! Descriptive statistics, growth rates and seasonal averages over
//! aggregated series.
//!
//! Every function here is pure. Values that are mathematically undefined
//! (a coefficient of variation over a zero mean, growth from zero) are
//! reported as `None` instead of NaN or an error.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::analyzers::types::MonthlySeries;
use crate::analyzers::utility::{mean, percentile, round_to, sample_stddev};

/// A value with the label it is displayed under (month name, week label).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Labeled {
    pub label: String,
    pub value: f64,
}

impl Labeled {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Count, mean, spread and quartiles of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; undefined for a single value.
    pub std: Option<f64>,
    pub min: f64,
    pub q25: f64,
    pub median: f64,
    pub q75: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdditionalStatistics {
    pub peak: Labeled,
    pub lowest: Labeled,
    pub range: f64,
    /// Standard deviation as a percentage of the mean.
    pub coefficient_of_variation: Option<f64>,
}

/// Everything reported about one series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub description: Description,
    pub additional: AdditionalStatistics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthRate {
    pub from_year: i32,
    pub to_year: i32,
    /// Percent change rounded to one decimal; `None` when the base is zero.
    pub percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalAverages {
    pub winter: f64,
    pub spring: f64,
    pub summer: f64,
    pub autumn: f64,
}

/// Standard descriptive statistics. Returns `None` for an empty series.
pub fn describe(values: &[f64]) -> Option<Description> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let avg = mean(values);
    Some(Description {
        count: values.len(),
        mean: avg,
        std: sample_stddev(values, avg),
        min: sorted[0],
        q25: percentile(&sorted, 0.25)?,
        median: percentile(&sorted, 0.5)?,
        q75: percentile(&sorted, 0.75)?,
        max: sorted[sorted.len() - 1],
    })
}

/// Peak and lowest entries, range and coefficient of variation.
///
/// Ties resolve to the first entry in series order. Returns `None` for an
/// empty series.
pub fn additional_statistics(series: &[Labeled]) -> Option<AdditionalStatistics> {
    let first = series.first()?;
    let mut peak = first;
    let mut lowest = first;

    for entry in &series[1..] {
        if entry.value > peak.value {
            peak = entry;
        }
        if entry.value < lowest.value {
            lowest = entry;
        }
    }

    let values: Vec<f64> = series.iter().map(|e| e.value).collect();
    let avg = mean(&values);
    let coefficient_of_variation = match sample_stddev(&values, avg) {
        Some(sd) if avg != 0.0 => Some(sd / avg * 100.0),
        _ => None,
    };

    Some(AdditionalStatistics {
        peak: peak.clone(),
        lowest: lowest.clone(),
        range: peak.value - lowest.value,
        coefficient_of_variation,
    })
}

/// Both statistics blocks for a labeled series.
pub fn summarize(series: &[Labeled]) -> Option<StatisticsSummary> {
    let values: Vec<f64> = series.iter().map(|e| e.value).collect();
    Some(StatisticsSummary {
        description: describe(&values)?,
        additional: additional_statistics(series)?,
    })
}

/// Year-over-year change for each adjacent pair of years, ascending.
pub fn growth_rates(by_year: &BTreeMap<i32, f64>) -> Vec<GrowthRate> {
    let years: Vec<(&i32, &f64)> = by_year.iter().collect();

    years
        .windows(2)
        .map(|pair| {
            let (&from_year, &previous) = pair[0];
            let (&to_year, &current) = pair[1];
            let percent = if previous == 0.0 {
                warn!(from_year, to_year, "Growth from a zero base is undefined");
                None
            } else {
                Some(round_to((current - previous) / previous * 100.0, 1))
            };
            GrowthRate {
                from_year,
                to_year,
                percent,
            }
        })
        .collect()
}

/// Mean of each season's three months, per year.
///
/// Winter is December, January and February of the same year. Years
/// without exactly twelve monthly values are skipped.
pub fn seasonal_averages<V: AsRef<[f64]>>(by_year: &BTreeMap<i32, V>) -> BTreeMap<i32, SeasonalAverages> {
    let mut result = BTreeMap::new();

    for (year, values) in by_year {
        let m = values.as_ref();
        if m.len() != 12 {
            warn!(year, months = m.len(), "Skipping year without twelve months");
            continue;
        }
        result.insert(
            *year,
            SeasonalAverages {
                winter: mean(&[m[11], m[0], m[1]]),
                spring: mean(&m[2..5]),
                summer: mean(&m[5..8]),
                autumn: mean(&m[8..11]),
            },
        );
    }

    result
}

/// Sum of the monthly values of each year, the input to [`growth_rates`].
pub fn yearly_totals(series: &BTreeMap<i32, MonthlySeries>) -> BTreeMap<i32, f64> {
    series.iter().map(|(year, s)| (*year, s.total())).collect()
}

/// Monthly volumes of each year, the input to [`seasonal_averages`].
pub fn yearly_months(series: &BTreeMap<i32, MonthlySeries>) -> BTreeMap<i32, [f64; 12]> {
    series.iter().map(|(year, s)| (*year, s.volumes)).collect()
}

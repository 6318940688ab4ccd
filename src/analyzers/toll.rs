//! Toll-gate passings and exemptions, compared against fetched traffic.
//!
//! The toll operator publishes monthly gate totals and the share of
//! passings that were exempt from payment. That dataset is static and
//! loaded from CSV with the columns `crossing,year,month,total,exempt`.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::analyzers::types::MonthlySeries;
use crate::analyzers::utility::{mean, round_to};
use crate::calendar::days_in_month;

/// Gate passings of one crossing in one month.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TollExemptionRecord {
    pub crossing: String,
    pub year: i32,
    pub month: u32,
    pub total: u64,
    pub exempt: u64,
}

/// Validated collection of [`TollExemptionRecord`]s.
#[derive(Debug, Clone, Default)]
pub struct TollDataset {
    records: Vec<TollExemptionRecord>,
}

impl TollDataset {
    /// Builds a dataset, rejecting rows with an invalid month or more
    /// exemptions than passings.
    pub fn from_records(records: Vec<TollExemptionRecord>) -> Result<Self> {
        for (i, r) in records.iter().enumerate() {
            if !(1..=12).contains(&r.month) {
                anyhow::bail!(
                    "row {}: month {} for {} {} is outside 1..=12",
                    i + 1,
                    r.month,
                    r.crossing,
                    r.year
                );
            }
            if r.exempt > r.total {
                anyhow::bail!(
                    "row {}: {} exempt passings exceed {} total for {} {}-{:02}",
                    i + 1,
                    r.exempt,
                    r.total,
                    r.crossing,
                    r.year,
                    r.month
                );
            }
        }
        Ok(Self { records })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut records = Vec::new();

        for result in rdr.deserialize() {
            let record: TollExemptionRecord = result?;
            records.push(record);
        }

        Self::from_records(records)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open toll dataset {}", path.display()))?;
        let dataset = Self::from_reader(file)
            .with_context(|| format!("failed to read toll dataset {}", path.display()))?;
        debug!(path = %path.display(), rows = dataset.records.len(), "Toll dataset loaded");
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn rows<'a>(&'a self, crossing: &'a str, year: i32) -> impl Iterator<Item = &'a TollExemptionRecord> + 'a {
        let crossing = crossing.to_lowercase();
        self.records
            .iter()
            .filter(move |r| r.year == year && r.crossing.to_lowercase() == crossing)
    }

    pub fn covers(&self, crossing: &str, year: i32) -> bool {
        self.rows(crossing, year).next().is_some()
    }
}

/// One month of gate data next to the fetched average daily traffic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyComparison {
    pub month: u32,
    pub total: u64,
    pub exempt: u64,
    pub paying: u64,
    /// Exempt share of passings in percent, two decimals; `None` without passings.
    pub exemption_share_pct: Option<f64>,
    /// Fetched average daily traffic, once attached with [`Overlay::with_adt`].
    pub adt: Option<f64>,
    /// Gate passings divided by ADT times days in the month.
    pub gate_to_adt_ratio: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayTotals {
    pub total: u64,
    pub exempt: u64,
    pub paying: u64,
    /// Mean of the monthly exemption shares that are defined.
    pub average_exemption_rate: Option<f64>,
}

/// Toll data of one crossing and year, month by month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub crossing: String,
    pub year: i32,
    pub months: Vec<MonthlyComparison>,
    pub totals: OverlayTotals,
}

impl Overlay {
    /// Attaches a fetched ADT series for cross-validation.
    pub fn with_adt(mut self, series: &MonthlySeries) -> Self {
        for m in &mut self.months {
            let adt = series.volume(m.month);
            m.adt = adt;
            m.gate_to_adt_ratio = match (adt, days_in_month(self.year, m.month)) {
                (Some(adt), Some(days)) if adt > 0.0 => {
                    Some(round_to(m.total as f64 / (adt * days as f64), 2))
                }
                _ => None,
            };
        }
        self
    }
}

/// Builds the twelve-month overlay for `crossing` in `year`.
///
/// Returns `None` when the dataset has nothing for that pair. That is not
/// the same as zero exemptions and must not be displayed as such. Months
/// missing from an otherwise covered year show zero passings and no share.
pub fn overlay(crossing: &str, year: i32, dataset: &TollDataset) -> Option<Overlay> {
    if !dataset.covers(crossing, year) {
        return None;
    }

    let mut totals = [0u64; 12];
    let mut exempts = [0u64; 12];
    for r in dataset.rows(crossing, year) {
        let slot = r.month as usize - 1;
        totals[slot] += r.total;
        exempts[slot] += r.exempt;
    }

    let months: Vec<MonthlyComparison> = (0..12)
        .map(|i| MonthlyComparison {
            month: i as u32 + 1,
            total: totals[i],
            exempt: exempts[i],
            paying: totals[i] - exempts[i],
            exemption_share_pct: (totals[i] > 0)
                .then(|| round_to(exempts[i] as f64 / totals[i] as f64 * 100.0, 2)),
            adt: None,
            gate_to_adt_ratio: None,
        })
        .collect();

    let shares: Vec<f64> = months.iter().filter_map(|m| m.exemption_share_pct).collect();
    let total: u64 = totals.iter().sum();
    let exempt: u64 = exempts.iter().sum();

    Some(Overlay {
        crossing: crossing.to_string(),
        year,
        months,
        totals: OverlayTotals {
            total,
            exempt,
            paying: total - exempt,
            average_exemption_rate: (!shares.is_empty()).then(|| round_to(mean(&shares), 2)),
        },
    })
}

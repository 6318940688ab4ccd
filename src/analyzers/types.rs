//! Data types used by the aggregation pipeline.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::calendar::month_name;
use crate::error::TrafficError;
use crate::stats::Labeled;

/// One month of average daily traffic reported for a single sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyRecord {
    pub month: u32,
    pub average_volume: Option<f64>,
    pub confidence_lower: Option<f64>,
    pub confidence_upper: Option<f64>,
    pub coverage_pct: Option<f64>,
}

impl MonthlyRecord {
    pub fn new(month: u32, average_volume: Option<f64>) -> Self {
        Self {
            month,
            average_volume,
            confidence_lower: None,
            confidence_upper: None,
            coverage_pct: None,
        }
    }

    pub fn with_confidence(mut self, lower: Option<f64>, upper: Option<f64>) -> Self {
        self.confidence_lower = lower;
        self.confidence_upper = upper;
        self
    }
}

/// One day of traffic reported for a single sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyRecord {
    pub from: DateTime<FixedOffset>,
    pub to: DateTime<FixedOffset>,
    pub volume: Option<f64>,
    pub coverage_pct: Option<f64>,
}

impl DailyRecord {
    /// A day counts when it has a volume and its coverage is not zero.
    pub fn is_valid(&self) -> bool {
        self.volume.is_some() && self.coverage_pct != Some(0.0)
    }
}

/// Summed lower and upper confidence bounds, indexed by month - 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfidenceBands {
    pub lower: [f64; 12],
    pub upper: [f64; 12],
}

/// Monthly totals for one logical crossing in one year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySeries {
    pub year: i32,
    /// Summed average daily volume, indexed by month - 1.
    pub volumes: [f64; 12],
    pub confidence: Option<ConfidenceBands>,
    /// Sensors that contributed, in id order.
    pub sensors: Vec<String>,
}

impl MonthlySeries {
    pub fn volume(&self, month: u32) -> Option<f64> {
        self.volumes.get((month as usize).checked_sub(1)?).copied()
    }

    /// Sum of the twelve monthly values.
    pub fn total(&self) -> f64 {
        self.volumes.iter().sum()
    }

    /// Month-name labeled values, restricted to `months` when given.
    pub fn labeled(&self, months: Option<&[u32]>) -> Vec<Labeled> {
        (1..=12u32)
            .filter(|m| months.is_none_or(|sel| sel.contains(m)))
            .filter_map(|m| {
                Some(Labeled::new(month_name(m)?, self.volume(m)?))
            })
            .collect()
    }
}

/// Summed weekly average for one logical crossing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyEntry {
    pub week: u32,
    pub label: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub volume: f64,
    pub sensors: usize,
}

/// Weekly totals for one logical crossing, ordered by week number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklySeries {
    pub year: i32,
    pub entries: Vec<WeeklyEntry>,
}

impl WeeklySeries {
    pub fn labeled(&self) -> Vec<Labeled> {
        self.entries
            .iter()
            .map(|e| Labeled::new(&e.label, e.volume))
            .collect()
    }
}

/// Why a sensor contributed nothing to a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum IssueKind {
    NoData,
    Failed(TrafficError),
}

/// A sensor (optionally for one week) left out of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct PointIssue {
    pub point_id: String,
    pub year: i32,
    pub week: Option<u32>,
    pub kind: IssueKind,
}

impl std::fmt::Display for PointIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let period = match self.week {
            Some(week) => format!("{} week {}", self.year, week),
            None => self.year.to_string(),
        };
        match &self.kind {
            IssueKind::NoData => write!(f, "No data for point {} in {}", self.point_id, period),
            IssueKind::Failed(e) => write!(f, "Point {} in {}: {}", self.point_id, period, e),
        }
    }
}

/// Outcome of a fan-out batch: the aggregated value, if any sensor
/// contributed, and the sensors that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: Option<T>,
    pub issues: Vec<PointIssue>,
}

impl<T> Fetched<T> {
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

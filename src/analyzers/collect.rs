//! Fan-out fetching of every sensor of a crossing, followed by aggregation.
//!
//! Each batch spawns one task per sensor (and per week for weekly data),
//! bounded by a semaphore, and waits for all of them before combining.
//! A sensor that fails or has no data is reported as a [`PointIssue`] and
//! left out; the batch only comes back empty when no sensor contributed.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, warn};

use crate::analyzers::aggregate::{aggregate_weekly, monthly_series, sensor_week_average};
use crate::analyzers::types::{
    Fetched, IssueKind, MonthlyRecord, MonthlySeries, PointIssue, WeeklyEntry, WeeklySeries,
};
use crate::calendar::{resolve_weeks, validate_week, validate_year, week_label, WeekRange};
use crate::config::DEFAULT_CONCURRENCY;
use crate::error::{Result, TrafficError};
use crate::fetch::{HttpClient, TrafficApi};
use crate::parser::{parse_daily, parse_monthly};
use crate::query::{daily_query, monthly_query, week_window};

/// One query for one sensor.
struct Job {
    point_id: String,
    week: Option<WeekRange>,
    query: String,
}

pub struct Collector<C> {
    api: TrafficApi<C>,
    max_concurrency: usize,
    with_confidence: bool,
    bypass_cache: bool,
}

impl<C: HttpClient + 'static> Collector<C> {
    pub fn new(api: TrafficApi<C>) -> Self {
        Self {
            api,
            max_concurrency: DEFAULT_CONCURRENCY,
            with_confidence: false,
            bypass_cache: false,
        }
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Also sum confidence bounds into monthly series.
    pub fn with_confidence(mut self, enabled: bool) -> Self {
        self.with_confidence = enabled;
        self
    }

    /// Always query the API instead of reusing cached responses.
    pub fn with_cache_bypass(mut self, enabled: bool) -> Self {
        self.bypass_cache = enabled;
        self
    }

    pub fn api(&self) -> &TrafficApi<C> {
        &self.api
    }

    /// Drops all cached responses so the next batch goes to the network.
    pub fn clear_cache(&self) {
        self.api.clear_cache();
    }

    /// Summed monthly average daily traffic of `point_ids` during `year`.
    ///
    /// # Errors
    ///
    /// Only [`TrafficError::OutOfRangeRequest`] for a year before the
    /// earliest supported one; sensor failures end up in `issues`.
    #[tracing::instrument(skip(self), fields(sensors = point_ids.len()))]
    pub async fn fetch_monthly(&self, point_ids: &[String], year: i32) -> Result<Fetched<MonthlySeries>> {
        validate_year(year)?;

        let jobs = point_ids
            .iter()
            .map(|id| Job {
                point_id: id.clone(),
                week: None,
                query: monthly_query(id, year),
            })
            .collect();

        let mut per_sensor: BTreeMap<String, Vec<MonthlyRecord>> = BTreeMap::new();
        let mut issues = Vec::new();

        for (job, outcome) in self.run(jobs).await {
            match outcome.and_then(|data| parse_monthly(&data)) {
                Ok(Some(records)) => {
                    per_sensor.insert(job.point_id, records);
                }
                Ok(None) => {
                    warn!(point_id = %job.point_id, year, "No monthly data for point");
                    issues.push(issue(job.point_id, year, None, IssueKind::NoData));
                }
                Err(e) => {
                    warn!(point_id = %job.point_id, year, error = %e, "Skipping point");
                    issues.push(issue(job.point_id, year, None, IssueKind::Failed(e)));
                }
            }
        }

        if per_sensor.is_empty() {
            warn!(year, "No sensor returned monthly data");
            return Ok(Fetched { value: None, issues });
        }

        info!(year, contributing = per_sensor.len(), "Monthly data aggregated");
        Ok(Fetched {
            value: Some(monthly_series(year, &per_sensor, self.with_confidence)),
            issues,
        })
    }

    /// Monthly series for several years, keyed and ordered by year.
    ///
    /// Every year is validated before the first request is made. Years
    /// without any data are absent from the map.
    #[tracing::instrument(skip(self), fields(sensors = point_ids.len()))]
    pub async fn fetch_years(
        &self,
        point_ids: &[String],
        years: &[i32],
    ) -> Result<Fetched<BTreeMap<i32, MonthlySeries>>> {
        for year in years {
            validate_year(*year)?;
        }

        let mut years = years.to_vec();
        years.sort_unstable();
        years.dedup();

        let mut series = BTreeMap::new();
        let mut issues = Vec::new();
        for year in years {
            let fetched = self.fetch_monthly(point_ids, year).await?;
            issues.extend(fetched.issues);
            if let Some(s) = fetched.value {
                series.insert(year, s);
            }
        }

        Ok(Fetched {
            value: (!series.is_empty()).then_some(series),
            issues,
        })
    }

    /// Summed weekly average daily traffic of `point_ids`.
    ///
    /// Weeks that do not start inside `year` are skipped. Only weeks where
    /// at least one sensor had a valid day appear in the result.
    ///
    /// # Errors
    ///
    /// [`TrafficError::OutOfRangeRequest`] for an unsupported year or a week
    /// number outside 1..=53.
    #[tracing::instrument(skip(self), fields(sensors = point_ids.len()))]
    pub async fn fetch_weekly(
        &self,
        point_ids: &[String],
        year: i32,
        weeks: &[u32],
    ) -> Result<Fetched<WeeklySeries>> {
        validate_year(year)?;
        for week in weeks {
            validate_week(*week)?;
        }

        let ranges = resolve_weeks(year, weeks);
        if ranges.len() < weeks.len() {
            debug!(
                requested = weeks.len(),
                resolved = ranges.len(),
                "Some weeks fall outside the year"
            );
        }

        let mut jobs = Vec::new();
        for range in &ranges {
            let Some((from, to)) = week_window(range) else {
                continue;
            };
            for id in point_ids {
                jobs.push(Job {
                    point_id: id.clone(),
                    week: Some(*range),
                    query: daily_query(id, from, to),
                });
            }
        }

        let mut per_week: BTreeMap<u32, BTreeMap<String, f64>> = BTreeMap::new();
        let mut issues = Vec::new();

        for (job, outcome) in self.run(jobs).await {
            let Some(range) = job.week else {
                continue;
            };
            let average = outcome
                .and_then(|data| parse_daily(&data))
                .map(|days| days.and_then(|d| sensor_week_average(&d)));

            match average {
                Ok(Some(avg)) => {
                    per_week
                        .entry(range.week)
                        .or_default()
                        .insert(job.point_id, avg);
                }
                Ok(None) => {
                    warn!(point_id = %job.point_id, week = range.week, "No valid days for point");
                    issues.push(issue(job.point_id, year, Some(range.week), IssueKind::NoData));
                }
                Err(e) => {
                    warn!(point_id = %job.point_id, week = range.week, error = %e, "Skipping point");
                    issues.push(issue(job.point_id, year, Some(range.week), IssueKind::Failed(e)));
                }
            }
        }

        let sensors_per_week: BTreeMap<u32, usize> =
            per_week.iter().map(|(w, s)| (*w, s.len())).collect();
        let entries: Vec<WeeklyEntry> = aggregate_weekly(&per_week)
            .into_iter()
            .filter_map(|(week, volume)| {
                let range = ranges.iter().find(|r| r.week == week)?;
                Some(WeeklyEntry {
                    week,
                    label: week_label(week),
                    start: range.start,
                    end: range.end,
                    volume,
                    sensors: sensors_per_week.get(&week).copied().unwrap_or(0),
                })
            })
            .collect();

        if entries.is_empty() {
            warn!(year, "No sensor returned weekly data");
            return Ok(Fetched { value: None, issues });
        }

        info!(year, weeks = entries.len(), "Weekly data aggregated");
        Ok(Fetched {
            value: Some(WeeklySeries { year, entries }),
            issues,
        })
    }

    /// Runs every job on the worker pool and returns the outcomes in job
    /// order once all of them have finished.
    async fn run(&self, jobs: Vec<Job>) -> Vec<(Job, Result<Arc<Value>>)> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = Vec::with_capacity(jobs.len());

        for job in &jobs {
            let sem = semaphore.clone();
            let api = self.api.clone();
            let query = job.query.clone();
            let fresh = self.bypass_cache;

            let span = tracing::info_span!(
                "fetch_point",
                point_id = %job.point_id,
                week = job.week.map(|w| w.week),
            );

            tasks.push(tokio::spawn(
                async move {
                    let _permit = sem
                        .acquire_owned()
                        .await
                        .map_err(|e| TrafficError::transport(0, e))?;
                    if fresh {
                        api.fetch_fresh(&query).await
                    } else {
                        api.fetch(&query).await
                    }
                }
                .instrument(span),
            ));
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (job, task) in jobs.into_iter().zip(tasks) {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(point_id = %job.point_id, error = %e, "Fetch task panicked");
                    Err(TrafficError::transport(0, e))
                }
            };
            outcomes.push((job, outcome));
        }
        outcomes
    }
}

fn issue(point_id: String, year: i32, week: Option<u32>, kind: IssueKind) -> PointIssue {
    PointIssue {
        point_id,
        year,
        week,
        kind,
    }
}

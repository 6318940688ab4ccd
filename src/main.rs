//! CLI entry point for the traffic volume tool.
//!
//! Provides subcommands for comparing years, months and weeks of traffic
//! at a logical crossing, and for overlaying toll-exemption figures.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};
use traffic_volume::{
    analyzers::{
        aggregate::filter_months,
        collect::Collector,
        toll::{TollDataset, overlay},
        types::PointIssue,
    },
    cache::QueryCache,
    calendar::parse_number_list,
    config::{CrossingCatalog, LogicalCrossing, Settings},
    fetch::{Backoff, BasicClient, RetryPolicy, TrafficApi},
    output::{
        YearTable, format_number, print_json, print_pretty, write_overlay, write_statistics,
        write_weekly, write_year_table,
    },
    stats::{Labeled, growth_rates, seasonal_averages, summarize, yearly_months, yearly_totals},
};

#[derive(Parser)]
#[command(name = "traffic_volume")]
#[command(about = "Traffic volumes at road crossings from the Norwegian traffic-data API", long_about = None)]
struct Cli {
    /// JSON file replacing the built-in crossing table
    #[arg(long, global = true)]
    crossings: Option<String>,

    /// Ignore cached responses and query the API for every request
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known crossings and their sensors
    Crossings,
    /// Compare monthly average daily traffic across years
    Years {
        /// Crossing name, e.g. "Ryfylketunnelen"
        crossing: String,

        /// Comma separated years, e.g. "2022,2023,2024"
        #[arg(short, long)]
        years: String,

        /// Also sum confidence intervals
        #[arg(long, default_value_t = false)]
        confidence: bool,

        /// CSV file to write the year table to
        #[arg(short, long)]
        output: Option<String>,

        /// Gzip compress the CSV output
        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Compare selected months of one year
    Months {
        crossing: String,

        #[arg(short, long)]
        year: i32,

        /// Comma separated month numbers, e.g. "6,7,8"
        #[arg(short, long)]
        months: String,

        /// CSV file to write the month table to
        #[arg(short, long)]
        output: Option<String>,

        /// CSV file to write the statistics to
        #[arg(long)]
        stats: Option<String>,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Weekly average daily traffic
    Weeks {
        crossing: String,

        #[arg(short, long)]
        year: i32,

        /// Comma separated week numbers, e.g. "1,2,3"
        #[arg(short, long)]
        weeks: String,

        /// CSV file to write the weekly series to
        #[arg(short, long)]
        output: Option<String>,

        /// CSV file to write the statistics to
        #[arg(long)]
        stats: Option<String>,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
    /// Overlay toll-exemption figures for one crossing and year
    Toll {
        crossing: String,

        #[arg(short, long)]
        year: i32,

        /// CSV with columns crossing,year,month,total,exempt
        #[arg(short, long)]
        dataset: String,

        /// Fetch monthly ADT and compare it with gate passings
        #[arg(long, default_value_t = false)]
        with_adt: bool,

        /// CSV file to write the overlay to
        #[arg(short, long)]
        output: Option<String>,

        #[arg(long, default_value_t = false)]
        gzip: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/traffic_volume.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("traffic_volume.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env();
    print_pretty(&settings);

    let catalog = match &cli.crossings {
        Some(path) => CrossingCatalog::load(path)?,
        None => CrossingCatalog::default(),
    };

    match cli.command {
        Commands::Crossings => {
            for crossing in catalog.iter() {
                info!(
                    crossing = %crossing.name,
                    sensors = %crossing.point_ids.join(", "),
                    "Crossing"
                );
            }
        }
        Commands::Years {
            crossing,
            years,
            confidence,
            output,
            gzip,
        } => {
            let crossing = lookup(&catalog, &crossing)?;
            let collector = build_collector(&settings, confidence, cli.no_cache)?;
            compare_years(&collector, crossing, &years, output.as_deref(), gzip).await?;
        }
        Commands::Months {
            crossing,
            year,
            months,
            output,
            stats,
            gzip,
        } => {
            let crossing = lookup(&catalog, &crossing)?;
            let collector = build_collector(&settings, false, cli.no_cache)?;
            let exports = Exports {
                table: output.as_deref(),
                stats: stats.as_deref(),
                gzip,
            };
            compare_months(&collector, crossing, year, &months, exports).await?;
        }
        Commands::Weeks {
            crossing,
            year,
            weeks,
            output,
            stats,
            gzip,
        } => {
            let crossing = lookup(&catalog, &crossing)?;
            let collector = build_collector(&settings, false, cli.no_cache)?;
            let exports = Exports {
                table: output.as_deref(),
                stats: stats.as_deref(),
                gzip,
            };
            weekly(&collector, crossing, year, &weeks, exports).await?;
        }
        Commands::Toll {
            crossing,
            year,
            dataset,
            with_adt,
            output,
            gzip,
        } => {
            let crossing = lookup(&catalog, &crossing)?;
            let dataset = TollDataset::load(&dataset)?;
            let collector = if with_adt {
                Some(build_collector(&settings, false, cli.no_cache)?)
            } else {
                None
            };
            toll(collector.as_ref(), crossing, year, &dataset, output.as_deref(), gzip).await?;
        }
    }

    Ok(())
}

/// Where a command writes its CSV files, if anywhere.
struct Exports<'a> {
    table: Option<&'a str>,
    stats: Option<&'a str>,
    gzip: bool,
}

fn lookup<'a>(catalog: &'a CrossingCatalog, name: &str) -> Result<&'a LogicalCrossing> {
    catalog.get(name).with_context(|| {
        let known: Vec<&str> = catalog.iter().map(|c| c.name.as_str()).collect();
        format!("unknown crossing '{name}', expected one of: {}", known.join(", "))
    })
}

/// Wires the HTTP client, retry policy and cache from `settings`.
fn build_collector(settings: &Settings, with_confidence: bool, no_cache: bool) -> Result<Collector<BasicClient>> {
    let client = BasicClient::new(settings.timeout)?;
    let retry = RetryPolicy::new(settings.max_attempts, Duration::from_secs(1), Backoff::Exponential);
    let api = TrafficApi::new(
        client,
        settings.api_url.clone(),
        retry,
        QueryCache::new(settings.cache_ttl),
    );

    Ok(Collector::new(api)
        .with_concurrency(settings.max_concurrency)
        .with_confidence(with_confidence)
        .with_cache_bypass(no_cache))
}

fn report_issues(issues: &[PointIssue]) {
    for issue in issues {
        warn!(point_id = %issue.point_id, "{issue}");
    }
}

fn log_statistics(title: &str, series: &[Labeled]) {
    let Some(summary) = summarize(series) else {
        return;
    };
    let d = &summary.description;
    let a = &summary.additional;
    info!(
        series = title,
        count = d.count,
        mean = %format_number(d.mean),
        std = ?d.std.map(format_number),
        min = %format_number(d.min),
        median = %format_number(d.median),
        max = %format_number(d.max),
        "Descriptive statistics"
    );
    info!(
        series = title,
        peak = %a.peak.label,
        peak_value = %format_number(a.peak.value),
        lowest = %a.lowest.label,
        lowest_value = %format_number(a.lowest.value),
        range = %format_number(a.range),
        cv_pct = ?a.coefficient_of_variation.map(|cv| format!("{cv:.1}")),
        "Additional statistics"
    );
}

#[tracing::instrument(skip(collector, crossing), fields(crossing = %crossing.name))]
async fn compare_years(
    collector: &Collector<BasicClient>,
    crossing: &LogicalCrossing,
    years: &str,
    output: Option<&str>,
    gzip: bool,
) -> Result<()> {
    let years: Vec<i32> = parse_number_list(years)?;
    let fetched = collector.fetch_years(&crossing.point_ids, &years).await?;
    report_issues(&fetched.issues);

    let Some(series) = fetched.value else {
        warn!("No data available for the selected years");
        return Ok(());
    };

    let table = YearTable::new(&series, None);
    for line in table.lines() {
        info!("{line}");
    }

    for (year, s) in &series {
        log_statistics(&year.to_string(), &s.labeled(None));
    }

    for rate in growth_rates(&yearly_totals(&series)) {
        match rate.percent {
            Some(pct) => info!(from = rate.from_year, to = rate.to_year, "Growth {pct:+.1}%"),
            None => warn!(from = rate.from_year, to = rate.to_year, "Growth undefined"),
        }
    }

    for (year, seasons) in seasonal_averages(&yearly_months(&series)) {
        info!(
            year,
            winter = %format_number(seasons.winter),
            spring = %format_number(seasons.spring),
            summer = %format_number(seasons.summer),
            autumn = %format_number(seasons.autumn),
            "Seasonal averages"
        );
    }

    if let Some(path) = output {
        let written = write_year_table(path, &table, gzip)?;
        info!(path = %written.display(), "Year table written");
    }
    Ok(())
}

#[tracing::instrument(skip(collector, crossing, exports), fields(crossing = %crossing.name))]
async fn compare_months(
    collector: &Collector<BasicClient>,
    crossing: &LogicalCrossing,
    year: i32,
    months: &str,
    exports: Exports<'_>,
) -> Result<()> {
    let months: Vec<u32> = parse_number_list(months)?;
    let fetched = collector.fetch_monthly(&crossing.point_ids, year).await?;
    report_issues(&fetched.issues);

    let Some(series) = fetched.value else {
        warn!(year, "No data available");
        return Ok(());
    };

    let selected = filter_months(&series, &months)?;
    for entry in &selected {
        info!(month = %entry.label, volume = %format_number(entry.value), "Monthly ADT");
    }
    log_statistics(&year.to_string(), &selected);

    if let Some(path) = exports.table {
        let table = YearTable::new(&BTreeMap::from([(year, series)]), Some(months.as_slice()));
        let written = write_year_table(path, &table, exports.gzip)?;
        info!(path = %written.display(), "Month table written");
    }
    if let (Some(path), Some(summary)) = (exports.stats, summarize(&selected)) {
        let written = write_statistics(path, &summary, exports.gzip)?;
        info!(path = %written.display(), "Statistics written");
    }
    Ok(())
}

#[tracing::instrument(skip(collector, crossing, exports), fields(crossing = %crossing.name))]
async fn weekly(
    collector: &Collector<BasicClient>,
    crossing: &LogicalCrossing,
    year: i32,
    weeks: &str,
    exports: Exports<'_>,
) -> Result<()> {
    let weeks: Vec<u32> = parse_number_list(weeks)?;
    let fetched = collector.fetch_weekly(&crossing.point_ids, year, &weeks).await?;
    report_issues(&fetched.issues);

    let Some(series) = fetched.value else {
        warn!(year, "No weekly data available");
        return Ok(());
    };

    for entry in &series.entries {
        info!(
            week = %entry.label,
            start = %entry.start,
            end = %entry.end,
            sensors = entry.sensors,
            volume = %format_number(entry.volume),
            "Weekly ADT"
        );
    }
    let labeled = series.labeled();
    log_statistics(&year.to_string(), &labeled);

    if let Some(path) = exports.table {
        let written = write_weekly(path, &series, exports.gzip)?;
        info!(path = %written.display(), "Weekly series written");
    }
    if let (Some(path), Some(summary)) = (exports.stats, summarize(&labeled)) {
        let written = write_statistics(path, &summary, exports.gzip)?;
        info!(path = %written.display(), "Statistics written");
    }
    Ok(())
}

#[tracing::instrument(skip(collector, crossing, dataset), fields(crossing = %crossing.name))]
async fn toll(
    collector: Option<&Collector<BasicClient>>,
    crossing: &LogicalCrossing,
    year: i32,
    dataset: &TollDataset,
    output: Option<&str>,
    gzip: bool,
) -> Result<()> {
    let Some(mut result) = overlay(&crossing.name, year, dataset) else {
        warn!(year, "No toll exemption data for this crossing and year");
        return Ok(());
    };

    if let Some(collector) = collector {
        let fetched = collector.fetch_monthly(&crossing.point_ids, year).await?;
        report_issues(&fetched.issues);
        if let Some(series) = fetched.value {
            result = result.with_adt(&series);
        }
    }

    for m in &result.months {
        info!(
            month = m.month,
            total = %format_number(m.total as f64),
            exempt = %format_number(m.exempt as f64),
            paying = %format_number(m.paying as f64),
            exemption_share_pct = ?m.exemption_share_pct,
            gate_to_adt_ratio = ?m.gate_to_adt_ratio,
            "Toll month"
        );
    }
    print_json(&result.totals)?;

    if let Some(path) = output {
        let written = write_overlay(path, &result, gzip)?;
        info!(path = %written.display(), "Overlay written");
    }
    Ok(())
}
